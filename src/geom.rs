///! Basic geometric primitives

use crate::math::Vec3d;

/// Plane represetnation structure
///
/// ## Equation
/// Standard plane equation is Ax + By + Cz + D = 0. In this case,
/// * A = normal.x
/// * B = normal.y
/// * C = normal.z
/// * D = -distance
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Plane {
    /// plane normal
    pub normal: Vec3d,

    /// number to multiply normal to to get basic point
    pub distance: f64,
}

/// Relation of plane and point
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PointRelation {
    /// Point it located behind plane
    Back,

    /// Point is located on plane
    OnPlane,

    /// Point is located in front of plane
    Front,
}

impl Plane {
    /// Build plane from normal and distance
    pub const fn new(normal: Vec3d, distance: f64) -> Self {
        Self { normal, distance }
    }

    /// Build plane from three points. Normal is `(p0 - p1) x (p2 - p1)`.
    pub fn from_points(p0: Vec3d, p1: Vec3d, p2: Vec3d) -> Option<Self> {
        let normal = ((p0 - p1) % (p2 - p1)).checked_normalized()?;

        Some(Self { normal, distance: p0 ^ normal })
    }

    /// Make plane that contains equal point set, but has counter-directional normal
    pub fn negate_direction(self) -> Self {
        Self { normal: -self.normal, distance: -self.distance }
    }

    /// Signed distance from plane to point
    pub fn distance_to(&self, point: Vec3d) -> f64 {
        (point ^ self.normal) - self.distance
    }

    /// Get relation of point and plane
    pub fn get_point_relation(&self, point: Vec3d, epsilon: f64) -> PointRelation {
        let metrics = self.distance_to(point);

        if metrics > epsilon {
            PointRelation::Front
        } else if metrics < -epsilon {
            PointRelation::Back
        } else {
            PointRelation::OnPlane
        }
    }
}

/// Bounding box
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundBox {
    /// minimal vector
    min: Vec3d,

    /// maximal vector
    max: Vec3d,
}

impl Default for BoundBox {
    fn default() -> Self {
        Self::zero()
    }
}

impl BoundBox {
    /// Build boundbox from min/max vectors
    pub const fn from_minmax(min: Vec3d, max: Vec3d) -> Self {
        Self { min, max }
    }

    /// 'Empty' bounding box
    pub const fn zero() -> Self {
        Self {
            min: Vec3d::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Vec3d::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// Get boundbox maximal fitting coordinates
    pub fn max(&self) -> Vec3d {
        self.max
    }

    /// Get boundbox minimal fitting coordinates
    pub fn min(&self) -> Vec3d {
        self.min
    }

    /// Get boundbox dimensions
    pub fn size(&self) -> Vec3d {
        self.max - self.min
    }

    /// Get boundbox center
    pub fn center(&self) -> Vec3d {
        (self.min + self.max) * 0.5
    }

    /// Check if boundbox contains no points at all
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Add point to boundbox
    pub fn add_point(&mut self, point: Vec3d) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Extend boundbox by some (positive) amount on every side
    pub fn extend(self, delta: f64) -> Self {
        Self {
            min: self.min - delta,
            max: self.max + delta,
        }
    }

    /// Get minimal boundbox that contains all points from both of `self` and `rhs`
    pub fn total(&self, rhs: &BoundBox) -> Self {
        Self {
            min: self.min.min(rhs.min),
            max: self.max.max(rhs.max),
        }
    }

    /// Calculate common boundbox for some point set.
    /// Note: Point set must be finite (if you want to get result, of course).
    pub fn for_points(iter: impl IntoIterator<Item = Vec3d>) -> Self {
        let mut result = Self::zero();

        for point in iter {
            result.add_point(point);
        }

        result
    }

    /// Check if boxes are separated on any axis, touching counts as separated
    pub fn is_disjoint(&self, another: &BoundBox) -> bool {
        (0..3).any(|axis| self.min[axis] >= another.max[axis] || self.max[axis] <= another.min[axis])
    }
}


// geom.rs
