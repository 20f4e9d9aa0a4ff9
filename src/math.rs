///! Double precision 3D vector

use std::ops::{Add, BitXor, Div, Index, IndexMut, Mul, Neg, Rem, Sub};

/// 3D vector, `^` is dot product and `%` is cross product
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vec3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Componentwise operator with vector and scalar right-hand side
macro_rules! impl_vec3d_operator {
    ($op_name: ident, $op_fn_name: ident, $op: tt) => {
        impl $op_name<Vec3d> for Vec3d {
            type Output = Vec3d;

            fn $op_fn_name(self, rhs: Vec3d) -> Vec3d {
                Vec3d::new(self.x $op rhs.x, self.y $op rhs.y, self.z $op rhs.z)
            }
        }

        impl $op_name<f64> for Vec3d {
            type Output = Vec3d;

            fn $op_fn_name(self, rhs: f64) -> Vec3d {
                Vec3d::new(self.x $op rhs, self.y $op rhs, self.z $op rhs)
            }
        }
    };
}

impl_vec3d_operator!(Add, add, +);
impl_vec3d_operator!(Sub, sub, -);
impl_vec3d_operator!(Mul, mul, *);
impl_vec3d_operator!(Div, div, /);

impl Neg for Vec3d {
    type Output = Vec3d;

    fn neg(self) -> Vec3d {
        Vec3d::new(-self.x, -self.y, -self.z)
    }
}

impl BitXor for Vec3d {
    type Output = f64;

    fn bitxor(self, rhs: Vec3d) -> f64 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }
}

impl Rem for Vec3d {
    type Output = Vec3d;

    fn rem(self, rhs: Vec3d) -> Vec3d {
        Vec3d::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }
}

/// Axis access, 0 is X, 1 is Y and 2 is Z
impl Index<usize> for Vec3d {
    type Output = f64;

    fn index(&self, axis: usize) -> &f64 {
        match axis {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("vector axis {axis} out of range"),
        }
    }
}

impl IndexMut<usize> for Vec3d {
    fn index_mut(&mut self, axis: usize) -> &mut f64 {
        match axis {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            _ => panic!("vector axis {axis} out of range"),
        }
    }
}

impl Vec3d {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Unit vector along some axis
    pub fn axis(axis: usize, sign: f64) -> Self {
        let mut v = Self::zero();
        v[axis] = sign;
        v
    }

    pub fn length(&self) -> f64 {
        (*self ^ *self).sqrt()
    }

    /// Normalize vector if it's long enough
    pub fn checked_normalized(&self) -> Option<Self> {
        let len2 = *self ^ *self;

        if len2 > f64::EPSILON {
            Some(*self / len2.sqrt())
        } else {
            None
        }
    }

    /// Normalize vector and return it with its original length
    pub fn normalized_with_length(&self) -> (Self, f64) {
        let len = self.length();

        if len == 0.0 {
            (*self, 0.0)
        } else {
            (*self / len, len)
        }
    }

    /// Per-component minimum
    pub fn min(self, rhs: Self) -> Self {
        Self::new(self.x.min(rhs.x), self.y.min(rhs.y), self.z.min(rhs.z))
    }

    /// Per-component maximum
    pub fn max(self, rhs: Self) -> Self {
        Self::new(self.x.max(rhs.x), self.y.max(rhs.y), self.z.max(rhs.z))
    }

    /// Per-component absolute value
    pub fn abs(self) -> Self {
        Self::new(self.x.abs(), self.y.abs(), self.z.abs())
    }

    /// Check if all vector components are close to `rhs` ones
    pub fn equal_epsilon(self, rhs: Self, epsilon: f64) -> bool {
        (self.x - rhs.x).abs() <= epsilon
            && (self.y - rhs.y).abs() <= epsilon
            && (self.z - rhs.z).abs() <= epsilon
    }
}

#[macro_export]
macro_rules! vec3d {
    ($x: expr, $y: expr, $z: expr $(,)?) => {
        $crate::math::Vec3d::new($x, $y, $z)
    };
}


// math.rs
