///! Canonical plane table module

use crate::{error::{CompileError, Result}, geom::Plane, math::Vec3d};

/// Normal components closer than this are equal
pub const NORMAL_EPSILON: f64 = 0.00001;

/// Plane distances closer than this are equal
pub const DIST_EPSILON: f64 = 0.01;

/// Count of plane hash buckets
pub const PLANE_HASHES: usize = 1024;

/// Index of plane in plane table. Plane `n ^ 1` is plane `n` with negated direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaneNum(pub u32);

impl PlaneNum {
    /// Plane with negated direction
    pub fn opposite(self) -> Self {
        Self(self.0 ^ 1)
    }

    /// Even (positive-facing for axial planes) plane of the pair
    pub fn positive(self) -> Self {
        Self(self.0 & !1)
    }

    /// Plane index in table
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for PlaneNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Plane type by normal
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PlaneType {
    /// Normal is exactly +-X
    X,

    /// Normal is exactly +-Y
    Y,

    /// Normal is exactly +-Z
    Z,

    /// X is the major normal axis
    AnyX,

    /// Y is the major normal axis
    AnyY,

    /// Z is the major normal axis
    AnyZ,
}

impl PlaneType {
    /// Get plane type for some normal
    pub fn for_normal(normal: Vec3d) -> Self {
        if normal.x == 1.0 || normal.x == -1.0 {
            return Self::X;
        }
        if normal.y == 1.0 || normal.y == -1.0 {
            return Self::Y;
        }
        if normal.z == 1.0 || normal.z == -1.0 {
            return Self::Z;
        }

        let abs = normal.abs();

        if abs.x >= abs.y && abs.x >= abs.z {
            Self::AnyX
        } else if abs.y >= abs.x && abs.y >= abs.z {
            Self::AnyY
        } else {
            Self::AnyZ
        }
    }

    /// Axis of axial plane
    pub fn axis(self) -> Option<usize> {
        match self {
            Self::X => Some(0),
            Self::Y => Some(1),
            Self::Z => Some(2),
            _ => None,
        }
    }

    /// Check if plane is axis-aligned
    pub fn is_axial(self) -> bool {
        self.axis().is_some()
    }
}

/// Plane table entry
#[derive(Copy, Clone, Debug)]
pub struct MapPlane {
    /// Plane itself
    pub plane: Plane,

    /// Plane type
    pub ty: PlaneType,
}

/// Snap near-axial normal to the exact axis
pub fn snap_vector(normal: Vec3d) -> Vec3d {
    for axis in 0..3 {
        if (normal[axis] - 1.0).abs() < NORMAL_EPSILON {
            return Vec3d::axis(axis, 1.0);
        }
        if (normal[axis] + 1.0).abs() < NORMAL_EPSILON {
            return Vec3d::axis(axis, -1.0);
        }
    }

    normal
}

/// Snap normal and near-integral distance
pub fn snap_plane(normal: Vec3d, distance: f64) -> (Vec3d, f64) {
    let rounded = (distance + 0.5).floor();
    let distance = if (distance - rounded).abs() < DIST_EPSILON { rounded } else { distance };

    (snap_vector(normal), distance)
}

/// Check if table plane matches normal and distance
pub fn plane_equal(plane: &Plane, normal: Vec3d, distance: f64) -> bool {
    (plane.normal.x - normal.x).abs() < NORMAL_EPSILON
        && (plane.normal.y - normal.y).abs() < NORMAL_EPSILON
        && (plane.normal.z - normal.z).abs() < NORMAL_EPSILON
        && (plane.distance - distance).abs() < DIST_EPSILON
}

fn plane_hash(distance: f64) -> usize {
    (distance.abs() as usize / 8) & (PLANE_HASHES - 1)
}

/// Deduplicated plane table
pub struct PlaneRegistry {
    /// Planes, stored in pairs
    planes: Vec<MapPlane>,

    /// Plane indices by distance bucket
    hash: Vec<Vec<PlaneNum>>,

    /// Maximal table size
    capacity: usize,
}

impl PlaneRegistry {
    /// Create empty plane table
    pub fn new(capacity: usize) -> Self {
        Self {
            planes: Vec::new(),
            hash: vec![Vec::new(); PLANE_HASHES],
            capacity,
        }
    }

    /// Count of planes in table
    pub fn len(&self) -> usize {
        self.planes.len()
    }

    /// Check if table is empty
    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// Get plane by number
    pub fn get(&self, num: PlaneNum) -> &MapPlane {
        &self.planes[num.index()]
    }

    /// Get plane geometry by number
    pub fn plane(&self, num: PlaneNum) -> Plane {
        self.planes[num.index()].plane
    }

    /// Iterate all table planes
    pub fn iter(&self) -> impl Iterator<Item = (PlaneNum, &MapPlane)> {
        self.planes.iter().enumerate().map(|(i, plane)| (PlaneNum(i as u32), plane))
    }

    fn add_to_hash(&mut self, num: PlaneNum) {
        let bucket = plane_hash(self.planes[num.index()].plane.distance);
        self.hash[bucket].push(num);
    }

    /// Search plane in table without snapping or creation
    fn search(&self, normal: Vec3d, distance: f64) -> Option<PlaneNum> {
        let hash = plane_hash(distance);

        // search the border buckets as well
        for offset in [PLANE_HASHES - 1, 0, 1] {
            let bucket = &self.hash[(hash + offset) & (PLANE_HASHES - 1)];

            for num in bucket.iter().rev() {
                if plane_equal(&self.planes[num.index()].plane, normal, distance) {
                    return Some(*num);
                }
            }
        }

        None
    }

    fn create_plane(&mut self, normal: Vec3d, distance: f64) -> Result<PlaneNum> {
        if normal.length() < 0.5 {
            return Err(CompileError::BadNormal(normal));
        }
        if self.planes.len() + 2 > self.capacity {
            return Err(CompileError::PlaneTableFull(self.capacity));
        }

        let ty = PlaneType::for_normal(normal);
        let plane = Plane::new(normal, distance);
        let mut pair = [
            MapPlane { plane, ty },
            MapPlane { plane: plane.negate_direction(), ty },
        ];

        // axial planes are always facing positive first
        let flipped = ty.is_axial() && (normal.x < 0.0 || normal.y < 0.0 || normal.z < 0.0);
        if flipped {
            pair.swap(0, 1);
        }

        let first = PlaneNum(self.planes.len() as u32);
        self.planes.extend(pair);
        self.add_to_hash(first);
        self.add_to_hash(first.opposite());

        Ok(if flipped { first.opposite() } else { first })
    }

    /// Find plane in table, create new plane pair if there's no such plane
    pub fn find_plane(&mut self, normal: Vec3d, distance: f64) -> Result<PlaneNum> {
        let (normal, distance) = snap_plane(normal, distance);

        match self.search(normal, distance) {
            Some(num) => Ok(num),
            None => self.create_plane(normal, distance),
        }
    }

    /// Find plane defined by three points
    pub fn plane_from_points(&mut self, p0: Vec3d, p1: Vec3d, p2: Vec3d) -> Result<Option<PlaneNum>> {
        match Plane::from_points(p0, p1, p2) {
            Some(plane) => self.find_plane(plane.normal, plane.distance).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3d;

    #[test]
    fn pairs_are_negations() {
        let mut registry = PlaneRegistry::new(1024);
        let num = registry.find_plane(vec3d!(0.6, 0.8, 0.0), 10.0).unwrap();

        let plane = registry.plane(num);
        let opposite = registry.plane(num.opposite());

        assert_eq!(opposite.normal, -plane.normal);
        assert_eq!(opposite.distance, -plane.distance);
        assert_eq!(registry.get(num).ty, PlaneType::AnyY);
    }

    #[test]
    fn axial_planes_face_positive_first() {
        let mut registry = PlaneRegistry::new(1024);
        let num = registry.find_plane(vec3d!(0.0, 0.0, -1.0), 64.0).unwrap();

        assert_eq!(num.0, 1);
        assert_eq!(registry.plane(num.positive()).normal, vec3d!(0.0, 0.0, 1.0));
        assert_eq!(registry.plane(num.positive()).distance, -64.0);
    }

    #[test]
    fn dedup_is_order_independent() {
        let planes = [
            (vec3d!(1.0, 0.0, 0.0), 7.999),
            (vec3d!(0.0, 1.0 - 0.000001, 0.0), 64.0),
            (vec3d!(0.6, 0.8, 0.0), 15.5),
            (vec3d!(1.0, 0.0, 0.0), 8.004),
            (vec3d!(0.0, 1.0, 0.0), 63.995),
            (vec3d!(-0.6, -0.8, 0.0), -15.5),
        ];

        let mut forward = PlaneRegistry::new(1024);
        let forward_nums = planes
            .iter()
            .map(|(n, d)| forward.find_plane(*n, *d).unwrap())
            .collect::<Vec<_>>();

        let mut backward = PlaneRegistry::new(1024);
        let mut backward_nums = planes
            .iter()
            .rev()
            .map(|(n, d)| backward.find_plane(*n, *d).unwrap())
            .collect::<Vec<_>>();
        backward_nums.reverse();

        assert_eq!(forward.len(), 6);
        assert_eq!(backward.len(), 6);
        assert_eq!(forward_nums[0], forward_nums[3]);
        assert_eq!(forward_nums[1], forward_nums[4]);
        assert_eq!(forward_nums[2], forward_nums[5].opposite());

        for (a, b) in forward_nums.iter().zip(backward_nums.iter()) {
            let (pa, pb) = (forward.plane(*a), backward.plane(*b));
            assert!(pa.normal.equal_epsilon(pb.normal, NORMAL_EPSILON));
            assert!((pa.distance - pb.distance).abs() < DIST_EPSILON);
        }
    }

    #[test]
    fn bad_normal_and_capacity_are_fatal() {
        let mut registry = PlaneRegistry::new(2);

        assert!(matches!(registry.find_plane(vec3d!(0.1, 0.0, 0.0), 0.0), Err(CompileError::BadNormal(_))));
        registry.find_plane(vec3d!(1.0, 0.0, 0.0), 0.0).unwrap();
        assert!(matches!(registry.find_plane(vec3d!(0.0, 1.0, 0.0), 0.0), Err(CompileError::PlaneTableFull(2))));
    }
}

// plane.rs
