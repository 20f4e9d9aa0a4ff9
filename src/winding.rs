///! Convex polygon (winding) implementation module

use crate::{error::{CompileError, Result}, geom::{BoundBox, Plane, PointRelation}, math::Vec3d};

/// Maximal number of points single winding may hold
pub const MAX_POINTS_ON_WINDING: usize = 64;

/// Half-size of the quad built for a whole plane
pub const MAX_WORLD_DIST: f64 = 11586.0;

/// Edges shorter than this are crunched by vertex snapping
pub const EDGE_LENGTH: f64 = 0.2;

/// Windings with coordinates outside of this range still hold a base plane winding point
pub const HUGE_COORDINATE: f64 = 8000.0;

/// Consecutive points closer than this are considered the same point
const POINT_EPSILON: f64 = f32::EPSILON as f64;

/// Convex planar polygon. Point order is clockwise if looked at from the front of the polygon plane.
#[derive(Clone, Debug, PartialEq)]
pub struct Winding {
    /// Polygon points
    pub points: Vec<Vec3d>,
}

/// Result of winding splitting
#[derive(Clone, Debug, Default)]
pub struct SplitWindings {
    /// Part in front of the plane
    pub front: Option<Winding>,

    /// Part behind the plane
    pub back: Option<Winding>,
}

/// Signed distances of winding points to some plane
struct PointClassification {
    /// Signed point distances
    distances: Vec<f64>,

    /// Point relations
    relations: Vec<PointRelation>,

    /// Count of points in front of plane
    front: usize,

    /// Count of points behind plane
    back: usize,
}

impl Winding {
    /// Build winding from point list
    pub fn new(points: Vec<Vec3d>) -> Self {
        Self { points }
    }

    /// Build an oversized quad lying on the plane
    pub fn for_plane(plane: &Plane) -> Self {
        let normal = plane.normal;
        let abs = normal.abs();

        // find the major axis
        let major = if abs.x >= abs.y && abs.x >= abs.z {
            0
        } else if abs.y >= abs.z {
            1
        } else {
            2
        };

        let right = match major {
            0 | 1 => Vec3d::new(-normal.y, normal.x, 0.0),
            _ => Vec3d::new(0.0, -normal.z, normal.y),
        } * MAX_WORLD_DIST;

        let up = normal % right;
        let org = normal * plane.distance;

        Self {
            points: vec![
                org - right + up,
                org + right + up,
                org + right - up,
                org - right - up,
            ],
        }
    }

    fn classify(&self, plane: &Plane, epsilon: f64) -> PointClassification {
        let mut result = PointClassification {
            distances: Vec::with_capacity(self.points.len()),
            relations: Vec::with_capacity(self.points.len()),
            front: 0,
            back: 0,
        };

        for point in &self.points {
            let distance = plane.distance_to(*point);
            let relation = plane.get_point_relation(*point, epsilon);

            match relation {
                PointRelation::Front => result.front += 1,
                PointRelation::Back => result.back += 1,
                PointRelation::OnPlane => {}
            }

            result.distances.push(distance);
            result.relations.push(relation);
        }

        result
    }

    /// Calculate crossing point of the `i`-th winding edge with the plane
    fn edge_intersection(&self, plane: &Plane, classification: &PointClassification, i: usize) -> Vec3d {
        let j = (i + 1) % self.points.len();
        let (p1, p2) = (self.points[i], self.points[j]);
        let (d1, d2) = (classification.distances[i], classification.distances[j]);
        let t = d1 / (d1 - d2);

        let mut mid = Vec3d::zero();

        // axial components are set exactly to avoid round off
        for axis in 0..3 {
            mid[axis] = if plane.normal[axis] == 1.0 {
                plane.distance
            } else if plane.normal[axis] == -1.0 {
                -plane.distance
            } else {
                p1[axis] + t * (p2[axis] - p1[axis])
            };
        }

        mid
    }

    /// Split winding by plane. Points within `epsilon` of the plane go to both parts.
    pub fn split(&self, plane: &Plane, epsilon: f64) -> Result<SplitWindings> {
        let classification = self.classify(plane, epsilon);

        if classification.front == 0 {
            return Ok(SplitWindings { front: None, back: Some(self.clone()) });
        }
        if classification.back == 0 {
            return Ok(SplitWindings { front: Some(self.clone()), back: None });
        }

        let max_points = self.points.len() + 4;
        let mut front = Vec::with_capacity(max_points);
        let mut back = Vec::with_capacity(max_points);

        for (i, point) in self.points.iter().copied().enumerate() {
            let relation = classification.relations[i];

            match relation {
                PointRelation::OnPlane => {
                    front.push(point);
                    back.push(point);
                    continue;
                }
                PointRelation::Front => front.push(point),
                PointRelation::Back => back.push(point),
            }

            let next_relation = classification.relations[(i + 1) % self.points.len()];
            if next_relation == PointRelation::OnPlane || next_relation == relation {
                continue;
            }

            let mid = self.edge_intersection(plane, &classification, i);
            front.push(mid);
            back.push(mid);

            if front.len() >= max_points || back.len() >= max_points {
                return Err(CompileError::WindingOverflow(max_points));
            }
        }

        if front.len() > MAX_POINTS_ON_WINDING || back.len() > MAX_POINTS_ON_WINDING {
            return Err(CompileError::WindingOverflow(MAX_POINTS_ON_WINDING));
        }

        Ok(SplitWindings {
            front: Winding::new(front).fixed(),
            back: Winding::new(back).fixed(),
        })
    }

    /// Keep only part of the winding in front of the plane.
    /// Winding that has no points behind the plane is kept as-is.
    pub fn chop(self, plane: &Plane, epsilon: f64) -> Result<Option<Self>> {
        let classification = self.classify(plane, epsilon);

        if classification.front == 0 {
            return Ok(None);
        }
        if classification.back == 0 {
            return Ok(Some(self));
        }

        let max_points = self.points.len() + 4;
        let mut result = Vec::with_capacity(max_points);

        for (i, point) in self.points.iter().copied().enumerate() {
            let relation = classification.relations[i];

            match relation {
                PointRelation::OnPlane => {
                    result.push(point);
                    continue;
                }
                PointRelation::Front => result.push(point),
                PointRelation::Back => {}
            }

            let next_relation = classification.relations[(i + 1) % self.points.len()];
            if next_relation == PointRelation::OnPlane || next_relation == relation {
                continue;
            }

            result.push(self.edge_intersection(plane, &classification, i));

            if result.len() >= max_points {
                return Err(CompileError::WindingOverflow(max_points));
            }
        }

        if result.len() > MAX_POINTS_ON_WINDING {
            return Err(CompileError::WindingOverflow(MAX_POINTS_ON_WINDING));
        }

        Ok(Winding::new(result).fixed())
    }

    /// Remove consecutive duplicate points, `None` if less than 3 points remain
    pub fn fixed(mut self) -> Option<Self> {
        let mut i = 0;

        while i < self.points.len() && self.points.len() > 1 {
            let next = (i + 1) % self.points.len();

            if self.points[i].equal_epsilon(self.points[next], POINT_EPSILON) {
                self.points.remove(next);
            } else {
                i += 1;
            }
        }

        if self.points.len() < 3 {
            None
        } else {
            Some(self)
        }
    }

    /// Winding with reversed point order, lying on the opposite plane
    pub fn reversed(&self) -> Self {
        Self { points: self.points.iter().rev().copied().collect() }
    }

    /// Polygon area
    pub fn area(&self) -> f64 {
        let Some(&first) = self.points.first() else {
            return 0.0;
        };

        self.points
            .windows(2)
            .skip(1)
            .map(|edge| ((edge[0] - first) % (edge[1] - first)).length() * 0.5)
            .sum()
    }

    /// Average of winding points
    pub fn center(&self) -> Vec3d {
        let sum = self.points.iter().fold(Vec3d::zero(), |sum, point| sum + *point);

        sum / self.points.len().max(1) as f64
    }

    /// Winding boundbox
    pub fn bounds(&self) -> BoundBox {
        BoundBox::for_points(self.points.iter().copied())
    }

    /// Plane winding lies on
    pub fn plane(&self) -> Plane {
        let (a, b, c) = (self.points[0], self.points[1], self.points[2]);
        let normal = ((c - a) % (b - a)).normalized_with_length().0;

        Plane { normal, distance: a ^ normal }
    }

    /// Check if winding would be crunched out of existence by vertex snapping
    pub fn is_tiny(&self) -> bool {
        let len = self.points.len();
        let mut edges = 0;

        for i in 0..len {
            let delta = self.points[(i + 1) % len] - self.points[i];

            if delta.length() > EDGE_LENGTH {
                edges += 1;
                if edges == 3 {
                    return false;
                }
            }
        }

        true
    }

    /// Check if winding still holds some point of the base plane winding
    pub fn is_huge(&self) -> bool {
        self.points
            .iter()
            .any(|p| (0..3).any(|axis| p[axis] < -HUGE_COORDINATE || p[axis] > HUGE_COORDINATE))
    }

    /// Maximal signed distances of winding points in front of and behind the plane
    pub fn plane_extents(&self, plane: &Plane) -> (f64, f64) {
        self.points.iter().fold((0.0f64, 0.0f64), |(front, back), point| {
            let d = plane.distance_to(*point);
            (front.max(d), back.min(d))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec3d;

    fn square(size: f64) -> Winding {
        Winding::new(vec![
            vec3d!(-size, size, 0.0),
            vec3d!(size, size, 0.0),
            vec3d!(size, -size, 0.0),
            vec3d!(-size, -size, 0.0),
        ])
    }

    #[test]
    fn plane_winding_faces_plane_normal() {
        let plane = Plane::new(vec3d!(0.0, 0.6, 0.8), 12.0);
        let winding = Winding::for_plane(&plane);
        let winding_plane = winding.plane();

        assert!((winding_plane.normal ^ plane.normal) > 0.999);
        assert!((winding_plane.distance - plane.distance).abs() < 0.01);
    }

    #[test]
    fn split_preserves_area() {
        let winding = square(32.0);

        for plane in [
            Plane::new(vec3d!(1.0, 0.0, 0.0), 5.0),
            Plane::new(vec3d!(0.6, 0.8, 0.0), -3.0),
            Plane::new(vec3d!(-0.8, 0.6, 0.0), 20.0),
        ] {
            let split = winding.split(&plane, 0.1).unwrap();
            let front = split.front.unwrap();
            let back = split.back.unwrap();

            assert!((front.area() + back.area() - winding.area()).abs() < 1e-6);
            assert!(front.points.iter().all(|p| plane.distance_to(*p) > -0.1));
            assert!(back.points.iter().all(|p| plane.distance_to(*p) < 0.1));
        }
    }

    #[test]
    fn split_keeps_on_points_on_both_sides() {
        let winding = square(16.0);
        let split = winding.split(&Plane::new(vec3d!(1.0, 0.0, 0.0), 16.0), 0.1).unwrap();

        assert!(split.front.is_none());
        assert_eq!(split.back.unwrap(), winding);
    }

    #[test]
    fn chop_keeps_front_or_whole() {
        let winding = square(16.0);

        let chopped = winding.clone().chop(&Plane::new(vec3d!(0.0, 1.0, 0.0), 0.0), 0.0).unwrap().unwrap();
        assert!((chopped.area() - winding.area() / 2.0).abs() < 1e-6);

        let whole = winding.clone().chop(&Plane::new(vec3d!(0.0, 1.0, 0.0), -100.0), 0.0).unwrap();
        assert_eq!(whole, Some(winding.clone()));

        let none = winding.chop(&Plane::new(vec3d!(0.0, 1.0, 0.0), 100.0), 0.0).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn fixed_drops_duplicates() {
        let winding = Winding::new(vec![
            vec3d!(0.0, 0.0, 0.0),
            vec3d!(0.0, 0.0, 0.0),
            vec3d!(1.0, 0.0, 0.0),
            vec3d!(1.0, 1.0, 0.0),
        ]);

        assert_eq!(winding.fixed().unwrap().points.len(), 3);

        let degenerate = Winding::new(vec![vec3d!(1.0, 0.0, 0.0), vec3d!(1.0, 0.0, 0.0), vec3d!(0.0, 0.0, 0.0)]);
        assert!(degenerate.fixed().is_none());
    }

    #[test]
    fn tiny_and_huge() {
        assert!(square(0.05).is_tiny());
        assert!(!square(1.0).is_tiny());
        assert!(Winding::for_plane(&Plane::new(vec3d!(0.0, 0.0, 1.0), 0.0)).is_huge());
        assert!(!square(100.0).is_huge());
    }
}

// winding.rs
