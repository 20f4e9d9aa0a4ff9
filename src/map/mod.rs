///! Compiler input map declaration module

use std::collections::HashMap;
use crate::{contents::{Contents, SurfaceFlags}, geom::BoundBox, math::Vec3d};

/// Map to brush table conversion
pub mod load;

/// Single brush side, defined by three points on its plane
#[derive(Clone, Debug)]
pub struct BrushSideDesc {
    /// Plane points, normal is `(p0 - p1) x (p2 - p1)` and points out of the brush
    pub points: [Vec3d; 3],

    /// Side contents, empty contents are treated as solid
    pub contents: Contents,

    /// Side surface flags
    pub surface: SurfaceFlags,
}

/// Map brush
#[derive(Clone, Debug, Default)]
pub struct BrushDesc {
    /// Brush side set
    pub sides: Vec<BrushSideDesc>,
}

impl BrushDesc {
    /// Build axial box brush with same contents and surface on every side
    pub fn from_bounds(bounds: BoundBox, contents: Contents, surface: SurfaceFlags) -> Self {
        let (min, max) = (bounds.min(), bounds.max());
        let mut sides = Vec::with_capacity(6);

        for axis in 0..3 {
            let u = Vec3d::axis((axis + 1) % 3, 1.0);
            let v = Vec3d::axis((axis + 2) % 3, 1.0);

            // u x v is the positive axis direction
            let mut base = min;
            base[axis] = max[axis];
            sides.push(BrushSideDesc { points: [base + u, base, base + v], contents, surface });

            sides.push(BrushSideDesc { points: [min + v, min, min + u], contents, surface });
        }

        Self { sides }
    }
}

/// Map entity
#[derive(Clone, Debug, Default)]
pub struct Entity {
    /// Entity brushes
    pub brushes: Vec<BrushDesc>,

    /// Entity properties
    pub properties: HashMap<String, String>,
}

impl Entity {
    /// Create entity with some class name
    pub fn new(classname: &str) -> Self {
        Self::default().with_property("classname", classname)
    }

    /// Add property to entity
    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    /// Add brush to entity
    pub fn with_brush(mut self, brush: BrushDesc) -> Self {
        self.brushes.push(brush);
        self
    }

    /// Entity class name, empty if there's no one
    pub fn classname(&self) -> &str {
        self.properties.get("classname").map(String::as_str).unwrap_or("")
    }
}

/// Parse whitespace-separated vector
pub fn parse_vector(value: &str) -> Option<Vec3d> {
    let flt_arr = value
        .split_whitespace()
        .map(|str| str.parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .ok()
        ?;

    Some(Vec3d::new(
        *flt_arr.first()?,
        *flt_arr.get(1)?,
        *flt_arr.get(2)?,
    ))
}

/// Map main structure
#[derive(Clone, Debug, Default)]
pub struct Map {
    /// Entity set, the first one is the world
    pub entities: Vec<Entity>,
}


// mod.rs
