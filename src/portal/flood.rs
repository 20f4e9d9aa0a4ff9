///! Entity flooding, outside filling, areas and visible sides module

use std::{collections::{BTreeMap, HashMap, VecDeque}, io::Write, ops::Range};
use crate::{
    bsp::Tree,
    contents::Contents,
    error::Result,
    map::load::EntityInfo,
    math::Vec3d,
    portal::{portal_entity_flood, PortalSide},
    session::CompileSession,
    MapBrushId,
    NodeId,
    PortalId,
};

/// Placement offsets tried for player starts
const PLAYER_START_NUDGES: [f64; 3] = [-16.0, 0.0, 16.0];

/// Entity flood outcome
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FloodResult {
    /// Some entity was placed and the outside wasn't reached
    Sealed,

    /// No entity is located in open space
    NoEntities,

    /// Outside node is reachable from some entity
    Leaked,
}

/// Outside filling statistics
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FillStats {
    /// Unreachable leafs that became solid
    pub filled: usize,

    /// Leafs that were solid before
    pub solid: usize,

    /// Reachable leafs
    pub inside: usize,
}

/// Flood the tree from a single leaf, nodes store their portal distance from it
fn flood_portals(tree: &mut Tree, start: NodeId) -> Result<()> {
    tree.node_mut(start).occupied = 1;

    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        let distance = tree.node(node).occupied;

        for index in 0..tree.node(node).portals.len() {
            let id = tree.node(node).portals[index];
            let other = tree.portal_neighbour(id, node);

            if tree.node(other).occupied != 0 || !portal_entity_flood(tree, tree.portal(id))? {
                continue;
            }

            tree.node_mut(other).occupied = distance + 1;
            queue.push_back(other);
        }
    }

    Ok(())
}

/// Place entity into the tree and flood from it, `false` if the entity is inside of a solid
pub fn place_occupant(session: &CompileSession, tree: &mut Tree, origin: Vec3d, entity: usize) -> Result<bool> {
    let leaf = tree.leaf_for_point(&session.planes, origin);

    if tree.node(leaf).is_solid() {
        return Ok(false);
    }

    tree.node_mut(leaf).occupant = Some(entity);
    flood_portals(tree, leaf)?;

    Ok(true)
}

/// Flood the tree from every entity that has an origin
pub fn flood_entities(session: &CompileSession, tree: &mut Tree) -> Result<FloodResult> {
    log::trace!("--- flood_entities ---");

    let outside = tree.outside;
    tree.node_mut(outside).occupied = 0;

    let mut inside = false;
    for (index, entity) in session.entities.iter().enumerate().skip(1) {
        if entity.origin == Vec3d::zero() {
            continue;
        }

        let origin = entity.origin + Vec3d::new(0.0, 0.0, 1.0);

        let placed = if entity.classname == "info_player_start" {
            let mut placed = false;

            'search: for dx in PLAYER_START_NUDGES {
                for dy in PLAYER_START_NUDGES {
                    if place_occupant(session, tree, origin + Vec3d::new(dx, dy, 0.0), index)? {
                        placed = true;
                        break 'search;
                    }
                }
            }

            placed
        } else {
            place_occupant(session, tree, origin, index)?
        };

        if placed {
            inside = true;
        } else {
            log::debug!("entity {} ({}) is in solid", index, entity.classname);
        }
    }

    Ok(if !inside {
        log::info!("no entities in open, no filling");
        FloodResult::NoEntities
    } else if tree.node(outside).occupied != 0 {
        log::info!("entity reached from outside, no filling");
        FloodResult::Leaked
    } else {
        FloodResult::Sealed
    })
} // flood_entities

/// Fill all leafs not reachable by entities
pub fn fill_outside(tree: &mut Tree) -> FillStats {
    log::trace!("--- fill_outside ---");

    let mut stats = FillStats::default();

    for leaf in tree.leafs() {
        let node = tree.node_mut(leaf);

        if node.occupied != 0 {
            stats.inside += 1;
        } else if node.is_solid() {
            stats.solid += 1;
        } else {
            node.contents = Contents::SOLID;
            stats.filled += 1;
        }
    }

    log::trace!("{:5} solid leafs", stats.solid);
    log::trace!("{:5} leafs filled", stats.filled);
    log::trace!("{:5} inside leafs", stats.inside);

    stats
}

/// Shortest path from the outside to some entity
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LeakPath {
    /// Path points, starting at the outside
    pub points: Vec<Vec3d>,

    /// Entity leak reaches
    pub entity: Option<usize>,
}

impl LeakPath {
    /// Trace leak from the outside node of flooded tree
    pub fn find(session: &CompileSession, tree: &Tree) -> Self {
        let mut points = Vec::new();
        let mut node = tree.outside;

        while tree.node(node).occupied > 1 {
            let mut best: Option<(PortalId, NodeId, u32)> = None;

            for &id in &tree.node(node).portals {
                let other = tree.portal_neighbour(id, node);
                let occupied = tree.node(other).occupied;

                if occupied != 0 && best.is_none_or(|(_, _, best_occupied)| occupied < best_occupied) {
                    best = Some((id, other, occupied));
                }
            }

            let Some((id, next, occupied)) = best else {
                break;
            };
            if occupied >= tree.node(node).occupied {
                break;
            }

            points.push(tree.portal(id).winding.center());
            node = next;
        }

        let entity = tree.node(node).occupant;
        if let Some(entity) = entity {
            points.push(session.entities[entity].origin);
            log::warn!("leak reaches entity {} ({})", entity, session.entities[entity].classname);
        }

        Self { points, entity }
    }

    /// Write path as a point-per-line text
    pub fn write(&self, out: &mut impl Write) -> std::io::Result<()> {
        for point in &self.points {
            writeln!(out, "{:.6} {:.6} {:.6}", point.x, point.y, point.z)?;
        }
        Ok(())
    }
}

/// Area portal reference from some area
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AreaPortal {
    /// Area portal number
    pub portal_num: u32,

    /// Area on the other side, `None` if portal touches the one area only
    pub other_area: Option<u32>,
}

/// Flooded areas
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AreaMap {
    /// Count of areas, area numbers start from 1
    pub count: u32,

    /// Areas touched by each area portal entity
    pub portal_areas: BTreeMap<usize, [Option<u32>; 2]>,
}

impl AreaMap {
    /// Area portals bounding each area, the first list is for area 1
    pub fn area_portals(&self, entities: &[EntityInfo]) -> Vec<Vec<AreaPortal>> {
        (1..=self.count)
            .map(|area| {
                entities
                    .iter()
                    .enumerate()
                    .filter_map(|(index, entity)| {
                        let portal_num = entity.area_portal_num?;
                        let [first, second] = self.portal_areas.get(&index).copied().unwrap_or([None, None]);

                        if first == Some(area) {
                            Some(AreaPortal { portal_num, other_area: second })
                        } else if second == Some(area) {
                            Some(AreaPortal { portal_num, other_area: first })
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .collect()
    }
}

/// Entity owning the area portal leaf brushes
fn area_portal_entity(session: &CompileSession, tree: &Tree, leaf: NodeId) -> Option<usize> {
    let original = tree.node(leaf).brushes.first()?.original?;
    Some(session.map_brush(original).entity)
}

/// Flood single area, area portal leafs are flooded into but never out of
fn flood_area(session: &CompileSession, tree: &mut Tree, areas: &mut AreaMap, start: NodeId) -> Result<()> {
    let area = areas.count;
    let mut stack = vec![start];

    while let Some(node) = stack.pop() {
        if tree.node(node).contents == Contents::AREA_PORTAL {
            let Some(entity) = area_portal_entity(session, tree, node) else {
                log::warn!("area portal leaf {} without brushes", node.into_index());
                continue;
            };

            let touched = areas.portal_areas.entry(entity).or_insert([None, None]);
            if touched.contains(&Some(area)) {
                continue;
            }

            match touched {
                [_, Some(_)] => log::warn!("areaportal entity {} touches > 2 areas", entity),
                [Some(_), second] => *second = Some(area),
                [first, None] => *first = Some(area),
            }
            continue;
        }

        if tree.node(node).area.is_some() {
            continue;
        }
        tree.node_mut(node).area = Some(area);

        for &id in &tree.node(node).portals {
            if portal_entity_flood(tree, tree.portal(id))? {
                stack.push(tree.portal_neighbour(id, node));
            }
        }
    }

    Ok(())
} // flood_area

/// Group entity-reachable leafs into areas separated by area portals
pub fn flood_areas(session: &CompileSession, tree: &mut Tree) -> Result<AreaMap> {
    log::trace!("--- flood_areas ---");

    let mut areas = AreaMap::default();
    let leafs = tree.leafs();

    for &leaf in &leafs {
        let node = tree.node(leaf);

        if node.area.is_some()
            || node.contents.contains(Contents::SOLID)
            || node.occupied == 0
            || node.contents == Contents::AREA_PORTAL
        {
            continue;
        }

        areas.count += 1;
        flood_area(session, tree, &mut areas, leaf)?;
    }

    // area portal leafs belong to the first area they touch
    for &leaf in &leafs {
        if tree.node(leaf).contents != Contents::AREA_PORTAL || tree.node(leaf).area.is_some() {
            continue;
        }
        let Some(entity) = area_portal_entity(session, tree, leaf) else {
            continue;
        };

        let [first, second] = areas.portal_areas.get(&entity).copied().unwrap_or([None, None]);
        tree.node_mut(leaf).area = first;

        if second.is_none() {
            log::warn!("areaportal entity {} doesn't touch two areas", entity);
        }
    }

    log::trace!("{:5} areas", areas.count);
    Ok(areas)
} // flood_areas

/// Find map brush side that covers the portal
pub fn find_portal_side(session: &CompileSession, tree: &Tree, id: PortalId) -> Option<PortalSide> {
    let portal = tree.portal(id);
    let [n0, n1] = portal.nodes.map(|node| tree.node(node));

    let vis_contents = (n0.contents ^ n1.contents).visible();
    if vis_contents.is_empty() {
        return None;
    }

    let split = tree.node(portal.on_node?).split?;
    let plane = session.planes.plane(split.plane);
    let mut best: Option<PortalSide> = None;
    let mut best_dot = 0.0;

    let originals = [n0, n1].into_iter().flat_map(|node| node.brushes.iter().filter_map(|brush| brush.original));

    for original in originals {
        let brush = session.map_brush(original);
        if !brush.contents.intersects(vis_contents) {
            continue;
        }

        for (index, side) in brush.sides.iter().enumerate() {
            if side.bevel || side.on_node {
                continue;
            }

            let positive = side.plane.positive();
            if positive == split.plane {
                return Some(PortalSide { brush: original, side: index });
            }

            let dot = plane.normal ^ session.planes.plane(positive).normal;
            if dot > best_dot {
                best_dot = dot;
                best = Some(PortalSide { brush: original, side: index });
            }
        }
    }

    if best.is_none() {
        log::warn!("side not found for portal {}", id.into_index());
    }

    best
} // find_portal_side

/// Mark map brush sides that are seen through some portal of non-empty leafs
pub fn mark_visible_sides(session: &mut CompileSession, tree: &mut Tree, brushes: Range<usize>) {
    log::trace!("--- mark_visible_sides ---");

    for brush in &mut session.map_brushes[brushes] {
        for side in &mut brush.sides {
            side.visible = false;
        }
    }

    let mut visible = HashMap::<MapBrushId, Vec<usize>>::new();

    for leaf in tree.leafs() {
        if tree.node(leaf).contents.is_empty() {
            continue;
        }

        for index in 0..tree.node(leaf).portals.len() {
            let id = tree.node(leaf).portals[index];
            if tree.portal(id).on_node.is_none() {
                continue;
            }

            if !tree.portal(id).side_found {
                let side = find_portal_side(session, tree, id);
                let portal = tree.portal_mut(id);
                portal.side_found = true;
                portal.side = side;
            }

            if let Some(side) = tree.portal(id).side {
                visible.entry(side.brush).or_default().push(side.side);
            }
        }
    }

    for (brush, sides) in visible {
        let brush = &mut session.map_brushes[brush.into_index()];
        for side in sides {
            brush.sides[side].visible = true;
        }
    }
} // mark_visible_sides

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        brush::ClipBox,
        bsp::builder::brush_bsp,
        config::BspConfig,
        contents::SurfaceFlags,
        csg::{chop_brushes, make_bsp_brush_list},
        geom::BoundBox,
        map::{BrushDesc, Entity, Map},
        portal::make_tree_portals,
        vec3d,
    };

    fn solid_box(min: Vec3d, max: Vec3d) -> BrushDesc {
        BrushDesc::from_bounds(BoundBox::from_minmax(min, max), Contents::SOLID, SurfaceFlags::empty())
    }

    /// Hollow box of 16 unit thick walls, `gap` removes the +x wall
    fn room(gap: bool) -> Entity {
        let (min, max) = (vec3d!(-128.0, -128.0, -128.0), vec3d!(128.0, 128.0, 128.0));
        let mut world = Entity::new("worldspawn")
            .with_brush(solid_box(vec3d!(min.x, min.y, min.z), vec3d!(max.x, max.y, min.z + 16.0)))
            .with_brush(solid_box(vec3d!(min.x, min.y, max.z - 16.0), vec3d!(max.x, max.y, max.z)))
            .with_brush(solid_box(vec3d!(min.x, min.y, min.z), vec3d!(max.x, min.y + 16.0, max.z)))
            .with_brush(solid_box(vec3d!(min.x, max.y - 16.0, min.z), vec3d!(max.x, max.y, max.z)))
            .with_brush(solid_box(vec3d!(min.x, min.y, min.z), vec3d!(min.x + 16.0, max.y, max.z)));

        if !gap {
            world = world.with_brush(solid_box(vec3d!(max.x - 16.0, min.y, min.z), vec3d!(max.x, max.y, max.z)));
        }
        world
    }

    fn flooded(entities: Vec<Entity>) -> (CompileSession, Tree, FloodResult) {
        let mut session = CompileSession::new(&Map { entities }, BspConfig::default()).unwrap();
        let clip = ClipBox::new(
            &mut session.planes,
            BoundBox::from_minmax(vec3d!(-4096.0, -4096.0, -4096.0), vec3d!(4096.0, 4096.0, 4096.0)),
        )
        .unwrap();

        let world = session.entities[0].brushes.clone();
        let list = make_bsp_brush_list(&session, world, &clip).unwrap();
        let list = chop_brushes(&session, list).unwrap();
        let (nodes, bounds) = brush_bsp(&session, list, &clip).unwrap();

        let mut tree = Tree::from_nodes(nodes, bounds);
        make_tree_portals(&session, &mut tree).unwrap();
        let result = flood_entities(&session, &mut tree).unwrap();

        (session, tree, result)
    }

    fn player() -> Entity {
        Entity::new("info_player_start").with_property("origin", "0 0 0")
    }

    fn light(origin: &str) -> Entity {
        Entity::new("light").with_property("origin", origin)
    }

    #[test]
    fn sealed_room_is_filled() {
        let (session, mut tree, result) = flooded(vec![room(false), light("8 8 8")]);
        assert_eq!(result, FloodResult::Sealed);

        let center = tree.leaf_for_point(&session.planes, vec3d!(8.0, 8.0, 9.0));
        assert_eq!(tree.node(center).occupied, 1);
        assert_eq!(tree.node(center).occupant, Some(1));
        assert_eq!(tree.node(tree.outside).occupied, 0);

        let stats = fill_outside(&mut tree);
        assert!(stats.filled > 0);
        assert!(stats.inside > 0);

        let outer = tree.leaf_for_point(&session.planes, vec3d!(200.0, 0.0, 0.0));
        assert!(tree.node(outer).is_solid());
        assert!(!tree.node(center).is_solid());
    }

    #[test]
    fn zero_origins_and_solids_are_skipped() {
        let (_, _, result) = flooded(vec![room(false), player()]);
        assert_eq!(result, FloodResult::NoEntities);

        let (_, _, result) = flooded(vec![room(false), light("-120 0 0")]);
        assert_eq!(result, FloodResult::NoEntities);
    }

    #[test]
    fn player_start_is_nudged() {
        // the origin itself is inside of a wall, nudging moves it out
        let (_, _, result) = flooded(vec![room(false), Entity::new("info_player_start").with_property("origin", "116 8 8")]);
        assert_eq!(result, FloodResult::Sealed);
    }

    #[test]
    fn leak_is_traced_to_entity() {
        let (session, tree, result) = flooded(vec![room(true), light("8 8 8")]);
        assert_eq!(result, FloodResult::Leaked);

        let path = LeakPath::find(&session, &tree);
        assert_eq!(path.entity, Some(1));
        assert!(path.points.len() >= 2);
        assert_eq!(path.points.last().copied(), Some(vec3d!(8.0, 8.0, 8.0)));

        let mut text = Vec::new();
        path.write(&mut text).unwrap();
        let text = String::from_utf8(text).unwrap();
        assert_eq!(text.lines().count(), path.points.len());
        assert_eq!(text.lines().last(), Some("8.000000 8.000000 8.000000"));
    }

    #[test]
    fn area_portal_separates_areas() {
        let divider = BrushDesc::from_bounds(
            BoundBox::from_minmax(vec3d!(-4.0, -112.0, -112.0), vec3d!(4.0, 112.0, 112.0)),
            Contents::empty(),
            SurfaceFlags::empty(),
        );

        let (session, mut tree, result) = flooded(vec![
            room(false),
            Entity::new("func_areaportal").with_brush(divider),
            light("-64 0 0"),
            light("64 0 0"),
        ]);
        assert_eq!(result, FloodResult::Sealed);
        fill_outside(&mut tree);

        let areas = flood_areas(&session, &mut tree).unwrap();
        assert_eq!(areas.count, 2);
        assert_eq!(areas.portal_areas.get(&1), Some(&[Some(1), Some(2)]));

        let left = tree.leaf_for_point(&session.planes, vec3d!(-64.0, 0.0, 1.0));
        let right = tree.leaf_for_point(&session.planes, vec3d!(64.0, 0.0, 1.0));
        let portal = tree.leaf_for_point(&session.planes, vec3d!(0.0, 0.0, 1.0));
        assert_ne!(tree.node(left).area, tree.node(right).area);
        assert_eq!(tree.node(portal).area, Some(1));

        let lists = areas.area_portals(&session.entities);
        assert_eq!(lists, vec![
            vec![AreaPortal { portal_num: 1, other_area: Some(2) }],
            vec![AreaPortal { portal_num: 1, other_area: Some(1) }],
        ]);
    }

    #[test]
    fn room_sides_become_visible() {
        let (mut session, mut tree, _) = flooded(vec![room(false), light("8 8 8")]);
        fill_outside(&mut tree);

        let range = session.entities[0].brushes.clone();
        mark_visible_sides(&mut session, &mut tree, range);

        // each wall shows exactly its inner face
        for brush in &session.map_brushes {
            let visible = brush.sides.iter().filter(|side| side.visible).count();
            assert_eq!(visible, 1);
        }
    }
}

// flood.rs
