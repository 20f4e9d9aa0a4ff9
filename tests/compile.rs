mod common;

use common::*;
use weird_bspc::{
    compile_map,
    map::{Entity, Map},
    math::Vec3d,
    prtfile::{PortalFile, PORTAL_FILE_MAGIC},
    vec3d,
    BspConfig,
    CompileError,
    NodeId,
};

#[test]
fn sealed_room_has_portal_file() {
    init_logger();

    let compiled = compile_map(&single_room(), BspConfig::default()).unwrap();
    assert!(!compiled.leaked());
    assert_eq!(compiled.models.len(), 1);

    let file = compiled.portal_file.as_ref().unwrap();
    assert!(file.cluster_count > 0);
    assert!(file.to_text().starts_with(PORTAL_FILE_MAGIC));

    // inside is numbered, walls are not
    assert!(cluster_at(&compiled, vec3d!(8.0, 8.0, 8.0)).is_some());
    assert!(cluster_at(&compiled, vec3d!(120.0, 8.0, 8.0)).is_none());

    for portal in &file.portals {
        assert!(portal.clusters.iter().all(|&cluster| (cluster as usize) < file.cluster_count));
        assert!(portal.winding.points.len() >= 3);
    }
}

#[test]
fn grid_points_land_in_one_leaf() {
    init_logger();

    let compiled = compile_map(&single_room(), BspConfig::default()).unwrap();
    let tree = &compiled.world().tree;
    let planes = &compiled.session.planes;
    let leafs = tree.leafs();

    // offsets keep points off the axial split planes, so leaf boxes are the leaf volumes
    let coords = (0..16).map(|i| -127.5 + 17.0 * i as f64).collect::<Vec<_>>();

    let contains = |leaf: NodeId, point: Vec3d| {
        let bounds = tree.node(leaf).bounds;
        (0..3).all(|axis| point[axis] >= bounds.min()[axis] - 1e-3 && point[axis] <= bounds.max()[axis] + 1e-3)
    };

    for &x in &coords {
        for &y in &coords {
            for &z in &coords {
                let point = vec3d!(x, y, z);
                let leaf = tree.leaf_for_point(planes, point);

                assert!(tree.node(leaf).is_leaf());
                assert!(contains(leaf, point), "{:?} is outside of its leaf", point);
                assert_eq!(leafs.iter().filter(|&&other| contains(other, point)).count(), 1, "{:?}", point);
            }
        }
    }
}

#[test]
fn gap_leaks() {
    init_logger();

    let mut map = single_room();
    map.entities[0].brushes.pop();

    let compiled = compile_map(&map, BspConfig::default()).unwrap();
    assert!(compiled.leaked());
    assert!(compiled.portal_file.is_none());

    let leak = compiled.world().leak.as_ref().unwrap();
    assert!(!leak.points.is_empty());
    assert_eq!(leak.entity, Some(1));
    assert_eq!(leak.points.last(), Some(&vec3d!(8.0, 8.0, 8.0)));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("room.lin");
    assert!(compiled.save_leak_file(&path).unwrap());

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), leak.points.len());

    let leak_test = BspConfig { leak_test: true, ..Default::default() };
    assert!(matches!(compile_map(&map, leak_test), Err(CompileError::Leaked(_))));
}

#[test]
fn empty_world_fails() {
    init_logger();

    let map = Map { entities: vec![Entity::new("worldspawn")] };
    assert!(matches!(compile_map(&map, BspConfig::default()), Err(CompileError::EmptyWorld)));
}

#[test]
fn submodels_are_compiled() {
    init_logger();

    let mut map = single_room();
    map.entities.push(
        Entity::new("func_door").with_brush(solid_box(vec3d!(-32.0, -32.0, -112.0), vec3d!(32.0, 32.0, -48.0))),
    );

    let compiled = compile_map(&map, BspConfig { no_opt: true, ..Default::default() }).unwrap();
    assert_eq!(compiled.models.len(), 2);

    let door = &compiled.models[1];
    assert_eq!(door.entity, 2);
    assert!(door.leak.is_none() && door.areas.is_none());

    // door brush is not a part of the world
    assert!(cluster_at(&compiled, vec3d!(0.0, 0.0, -80.0)).is_some());

    let planes = &compiled.session.planes;
    let inside = door.tree.leaf_for_point(planes, vec3d!(0.0, 0.0, -80.0));
    assert!(door.tree.node(inside).is_solid());

    let outside = door.tree.leaf_for_point(planes, vec3d!(0.0, 0.0, 64.0));
    assert!(!door.tree.node(outside).is_solid());
}

#[test]
fn portal_file_saves_and_loads() {
    init_logger();

    let compiled = compile_map(&two_rooms(true), BspConfig::default()).unwrap();
    let file = compiled.portal_file.as_ref().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rooms.prt");
    file.save(&path).unwrap();

    let loaded = PortalFile::load(&path).unwrap();
    assert_eq!(loaded, PortalFile::parse(&file.to_text()).unwrap());
    assert_eq!(loaded.cluster_count, file.cluster_count);
    assert_eq!(loaded.portals.len(), file.portals.len());

    for (loaded, portal) in loaded.portals.iter().zip(&file.portals) {
        assert_eq!(loaded.clusters, portal.clusters);
        for (a, b) in loaded.winding.points.iter().zip(&portal.winding.points) {
            assert!(a.equal_epsilon(*b, 0.01));
        }
    }
}

#[test]
fn compilation_is_repeatable() {
    init_logger();

    let first = compile_map(&two_rooms(true), BspConfig::default()).unwrap();
    let second = compile_map(&two_rooms(true), BspConfig { parallel: false, ..Default::default() }).unwrap();

    assert_eq!(
        first.portal_file.as_ref().map(PortalFile::to_text),
        second.portal_file.as_ref().map(PortalFile::to_text),
    );
}

// compile.rs
