#![allow(dead_code)]

///! Shared map builders of integration tests

use simplelog::{Config, LevelFilter, TestLogger};
use weird_bspc::{
    contents::{Contents, SurfaceFlags},
    geom::BoundBox,
    map::{BrushDesc, Entity, Map},
    math::Vec3d,
    vec3d,
    CompiledMap,
};

/// Wall thickness of generated rooms
pub const WALL: f64 = 16.0;

/// Install test logger, repeated calls are ignored
pub fn init_logger() {
    _ = TestLogger::init(LevelFilter::Debug, Config::default());
}

/// Axial solid brush
pub fn solid_box(min: Vec3d, max: Vec3d) -> BrushDesc {
    BrushDesc::from_bounds(BoundBox::from_minmax(min, max), Contents::SOLID, SurfaceFlags::empty())
}

/// Six walls enclosing the `min`..`max` box from inside
pub fn hollow_box(min: Vec3d, max: Vec3d) -> Vec<BrushDesc> {
    let mut walls = Vec::with_capacity(6);

    for axis in 0..3 {
        let mut low = max;
        low[axis] = min[axis] + WALL;
        walls.push(solid_box(min, low));

        let mut high = min;
        high[axis] = max[axis] - WALL;
        walls.push(solid_box(high, max));
    }

    walls
}

/// World entity holding the brushes
pub fn world(brushes: impl IntoIterator<Item = BrushDesc>) -> Entity {
    brushes.into_iter().fold(Entity::new("worldspawn"), Entity::with_brush)
}

/// Point entity
pub fn light(origin: Vec3d) -> Entity {
    Entity::new("light").with_property("origin", &format!("{} {} {}", origin.x, origin.y, origin.z))
}

/// Single closed room of `[-128, 128]` extent, lit at the center
pub fn single_room() -> Map {
    let size = vec3d!(128.0, 128.0, 128.0);

    Map {
        entities: vec![
            world(hollow_box(vec3d!(0.0, 0.0, 0.0) - size, size)),
            light(vec3d!(8.0, 8.0, 8.0)),
        ],
    }
}

/// Pair of lit rooms along the x axis separated by a wall, `hole` cuts 64x64 opening in the wall
pub fn two_rooms(hole: bool) -> Map {
    let (min, max) = (vec3d!(-256.0, -128.0, -128.0), vec3d!(256.0, 128.0, 128.0));
    let (inner_min, inner_max) = (min + vec3d!(WALL, WALL, WALL), max - vec3d!(WALL, WALL, WALL));

    let mut brushes = hollow_box(min, max);

    if hole {
        brushes.extend([
            solid_box(vec3d!(-8.0, inner_min.y, inner_min.z), vec3d!(8.0, -32.0, inner_max.z)),
            solid_box(vec3d!(-8.0, 32.0, inner_min.z), vec3d!(8.0, inner_max.y, inner_max.z)),
            solid_box(vec3d!(-8.0, -32.0, inner_min.z), vec3d!(8.0, 32.0, -32.0)),
            solid_box(vec3d!(-8.0, -32.0, 32.0), vec3d!(8.0, 32.0, inner_max.z)),
        ]);
    } else {
        brushes.push(solid_box(vec3d!(-8.0, inner_min.y, inner_min.z), vec3d!(8.0, inner_max.y, inner_max.z)));
    }

    Map {
        entities: vec![
            world(brushes),
            light(vec3d!(-128.0, 8.0, 8.0)),
            light(vec3d!(128.0, 8.0, 8.0)),
        ],
    }
}

/// Cluster of the leaf containing the point
pub fn cluster_at(compiled: &CompiledMap, point: Vec3d) -> Option<u32> {
    let tree = &compiled.world().tree;
    tree.node(tree.leaf_for_point(&compiled.session.planes, point)).cluster
}

// mod.rs
