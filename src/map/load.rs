///! Map brush table building module

use std::{collections::HashMap, ops::Range};
use crate::{
    brush::{chop_by_sides, MapBrush, Side, MAX_WORLD_WIDTH},
    config::BspConfig,
    contents::{Contents, SurfaceFlags},
    error::{CompileError, Result},
    geom::BoundBox,
    map::{parse_vector, BrushDesc, Map},
    math::Vec3d,
    plane::{plane_equal, snap_vector, PlaneRegistry},
};

/// Entity, as seen by the later compilation stages
#[derive(Clone, Debug)]
pub struct EntityInfo {
    /// Entity class name
    pub classname: String,

    /// Entity properties, updated with values computed during loading
    pub properties: HashMap<String, String>,

    /// Entity origin, zero if the entity has no one
    pub origin: Vec3d,

    /// Range of entity brushes in map brush table
    pub brushes: Range<usize>,

    /// Area portal number, only for area portal entities
    pub area_portal_num: Option<u32>,
}

/// Loading statistics
#[derive(Copy, Clone, Debug, Default)]
pub struct LoadStats {
    /// Clip brush count
    pub clip_brushes: usize,

    /// Count of axial bevels added
    pub box_bevels: usize,

    /// Count of edge bevels added
    pub edge_bevels: usize,

    /// Count of area portals
    pub area_portals: u32,
}

/// Map, converted to brush table
pub struct LoadedMap {
    /// Map brushes, grouped by owning entity
    pub brushes: Vec<MapBrush>,

    /// Entities
    pub entities: Vec<EntityInfo>,

    /// Bounds of world brushes
    pub bounds: BoundBox,

    /// Loading statistics
    pub stats: LoadStats,
}

/// Brush loading result
enum LoadedBrush {
    /// Regular brush
    Kept(MapBrush),

    /// Origin brush with its bounds
    Origin(BoundBox),

    /// Brush removed by configuration or degeneracy
    Dropped,
}

/// Calculate side contents from the declared ones
fn side_contents(contents: Contents, surface: SurfaceFlags, config: &BspConfig) -> Contents {
    let mut contents = contents;

    // translucent and clip sides are detail
    if surface.intersects(SurfaceFlags::TRANSLUCENT) {
        contents |= Contents::DETAIL;
    }
    if contents.intersects(Contents::CLIP) {
        contents |= Contents::DETAIL;
    }
    if config.full_detail {
        contents.remove(Contents::DETAIL);
    }
    if !contents.intersects(Contents::VISIBLE | Contents::CLIP) {
        contents |= Contents::SOLID;
    }

    // hints and skips have no contents
    if surface.intersects(SurfaceFlags::HINT | SurfaceFlags::SKIP) {
        contents = Contents::empty();
    }

    contents
}

/// Get contents of the whole brush
fn brush_contents(brush: &MapBrush) -> Contents {
    let mut contents = brush.sides[0].contents;
    let mut translucent = SurfaceFlags::empty();

    for side in &brush.sides {
        translucent |= side.surface & SurfaceFlags::TRANSLUCENT;

        if side.contents != contents {
            log::debug!("entity {}, brush {}: mixed face contents", brush.entity, brush.brush_num);
            break;
        }
    }

    // translucent brushes are windows
    if !translucent.is_empty() {
        contents |= Contents::TRANSLUCENT;
        if contents.contains(Contents::SOLID) {
            contents.remove(Contents::SOLID);
            contents |= Contents::WINDOW;
        }
    }

    contents
}

/// Build side windings and brush bounds, sides with a winding are visible
fn make_brush_windings(brush: &mut MapBrush, planes: &PlaneRegistry) -> Result<()> {
    brush.bounds = BoundBox::zero();

    for i in 0..brush.sides.len() {
        if brush.sides[i].bevel {
            continue;
        }

        let clippers = brush
            .sides
            .iter()
            .enumerate()
            .filter(|(j, side)| *j != i && !side.bevel)
            .map(|(_, side)| side.plane);
        let winding = chop_by_sides(planes, brush.sides[i].plane, clippers)?;

        let side = &mut brush.sides[i];
        side.visible = winding.is_some();
        if let Some(winding) = &winding {
            for point in &winding.points {
                brush.bounds.add_point(*point);
            }
        }
        side.winding = winding;
    }

    let (min, max) = (brush.bounds.min(), brush.bounds.max());
    if min.x < -MAX_WORLD_WIDTH || max.x > MAX_WORLD_WIDTH {
        log::debug!("entity {}, brush {}: bounds out of range", brush.entity, brush.brush_num);
    }
    if min.x > MAX_WORLD_WIDTH || max.x < -MAX_WORLD_WIDTH {
        log::debug!("entity {}, brush {}: no visible sides on brush", brush.entity, brush.brush_num);
    }

    Ok(())
}

/// Add planes required to expand the brush against axial boxes
fn add_brush_bevels(brush: &mut MapBrush, planes: &mut PlaneRegistry, stats: &mut LoadStats) -> Result<()> {
    let (first_contents, first_surface) = (brush.sides[0].contents, brush.sides[0].surface);
    let bevel = |plane| Side { bevel: true, ..Side::new(plane, first_contents, first_surface) };

    // axial planes, in canonical order
    for axis in 0..3 {
        for (dir_index, dir) in [-1.0, 1.0].into_iter().enumerate() {
            let order = axis * 2 + dir_index;

            let present = brush
                .sides
                .iter()
                .position(|side| planes.plane(side.plane).normal[axis] == dir);

            let index = match present {
                Some(index) => index,
                None => {
                    let distance = if dir > 0.0 { brush.bounds.max()[axis] } else { -brush.bounds.min()[axis] };
                    let plane = planes.find_plane(Vec3d::axis(axis, dir), distance)?;

                    brush.sides.push(bevel(plane));
                    stats.box_bevels += 1;
                    brush.sides.len() - 1
                }
            };

            if index != order {
                brush.sides.swap(order, index);
            }
        }
    }

    if brush.sides.len() == 6 {
        return Ok(());
    }

    // non-axial edges
    let mut i = 6;
    while i < brush.sides.len() {
        let Some(winding) = brush.sides[i].winding.clone() else {
            i += 1;
            continue;
        };

        let count = winding.points.len();
        for j in 0..count {
            let (edge, length) = (winding.points[j] - winding.points[(j + 1) % count]).normalized_with_length();
            if length < 0.5 {
                continue;
            }

            let edge = snap_vector(edge);
            if (0..3).any(|axis| edge[axis] == 1.0 || edge[axis] == -1.0) {
                continue;
            }

            // try the six possible slanted axials from this edge
            for axis in 0..3 {
                for dir in [-1.0, 1.0] {
                    let (normal, length) = (edge % Vec3d::axis(axis, dir)).normalized_with_length();
                    if length < 0.5 {
                        continue;
                    }
                    let distance = winding.points[j] ^ normal;

                    // all the points of all the sides must be behind the bevel
                    let is_outer = brush.sides.iter().all(|side| {
                        let side_plane = planes.plane(side.plane);
                        if plane_equal(&side_plane, normal, distance) {
                            return false;
                        }

                        let Some(other) = &side.winding else {
                            return true;
                        };

                        let mut min_back = 0.0f64;
                        for point in &other.points {
                            let d = (*point ^ normal) - distance;
                            if d > 0.1 {
                                return false;
                            }
                            min_back = min_back.min(d);
                        }

                        // winding on the bevel plane
                        min_back <= -0.1
                    });

                    if !is_outer {
                        continue;
                    }

                    let plane = planes.find_plane(normal, distance)?;
                    brush.sides.push(bevel(plane));
                    stats.edge_bevels += 1;
                }
            }
        }

        i += 1;
    }

    Ok(())
} // add_brush_bevels

/// Convert brush description into map brush
fn load_brush(
    entity: usize,
    brush_num: usize,
    desc: &BrushDesc,
    config: &BspConfig,
    planes: &mut PlaneRegistry,
    stats: &mut LoadStats,
) -> Result<LoadedBrush> {
    let mut brush = MapBrush {
        entity,
        brush_num,
        contents: Contents::empty(),
        sides: Vec::with_capacity(desc.sides.len() + 6),
        bounds: BoundBox::zero(),
    };

    for side_desc in &desc.sides {
        let contents = side_contents(side_desc.contents, side_desc.surface, config);
        let [p0, p1, p2] = side_desc.points;

        let Some(plane) = planes.plane_from_points(p0, p1, p2)? else {
            log::debug!("entity {}, brush {}: plane with no normal", entity, brush_num);
            continue;
        };

        if brush.sides.iter().any(|side| side.plane == plane) {
            log::debug!("entity {}, brush {}: duplicate plane", entity, brush_num);
            continue;
        }
        if brush.sides.iter().any(|side| side.plane == plane.opposite()) {
            log::debug!("entity {}, brush {}: mirrored plane", entity, brush_num);
            continue;
        }

        brush.sides.push(Side::new(plane, contents, side_desc.surface));
    }

    if brush.sides.is_empty() {
        log::warn!("entity {}, brush {}: no valid sides", entity, brush_num);
        return Ok(LoadedBrush::Dropped);
    }

    brush.contents = brush_contents(&brush);

    if config.no_detail && brush.contents.contains(Contents::DETAIL) {
        return Ok(LoadedBrush::Dropped);
    }
    if config.no_water && brush.contents.intersects(Contents::LIQUID) {
        return Ok(LoadedBrush::Dropped);
    }

    make_brush_windings(&mut brush, planes)?;

    // invisible brushes are never splitters
    if brush.contents.intersects(Contents::CLIP) {
        stats.clip_brushes += 1;
        for side in &mut brush.sides {
            side.on_node = true;
        }
    }

    if brush.contents.contains(Contents::ORIGIN) {
        if entity == 0 {
            return Err(CompileError::OriginBrushInWorld(brush_num));
        }
        return Ok(LoadedBrush::Origin(brush.bounds));
    }

    add_brush_bevels(&mut brush, planes, stats)?;

    Ok(LoadedBrush::Kept(brush))
} // load_brush

/// Move brushes to the origin of their entity
fn offset_brushes(brushes: &mut [MapBrush], origin: Vec3d, planes: &mut PlaneRegistry) -> Result<()> {
    for brush in brushes {
        for side in &mut brush.sides {
            let plane = planes.plane(side.plane);
            side.plane = planes.find_plane(plane.normal, plane.distance - (plane.normal ^ origin))?;
        }
        make_brush_windings(brush, planes)?;
    }

    Ok(())
}

/// Build brush and entity tables
pub fn load_map(map: &Map, config: &BspConfig, planes: &mut PlaneRegistry) -> Result<LoadedMap> {
    let mut stats = LoadStats::default();
    let mut world_brushes = Vec::new();
    let mut model_brushes = Vec::with_capacity(map.entities.len());
    let mut entities = Vec::with_capacity(map.entities.len());

    for (entity_index, entity) in map.entities.iter().enumerate() {
        let mut properties = entity.properties.clone();
        let mut brushes = Vec::with_capacity(entity.brushes.len());

        for (brush_num, desc) in entity.brushes.iter().enumerate() {
            match load_brush(entity_index, brush_num, desc, config, planes, &mut stats)? {
                LoadedBrush::Kept(brush) => brushes.push(brush),
                LoadedBrush::Origin(bounds) => {
                    let center = bounds.center();
                    let origin = format!("{} {} {}", center.x as i32, center.y as i32, center.z as i32);
                    properties.insert("origin".to_string(), origin);
                }
                LoadedBrush::Dropped => {}
            }
        }

        let origin = properties.get("origin").and_then(|origin| parse_vector(origin)).unwrap_or(Vec3d::zero());
        if origin != Vec3d::zero() {
            offset_brushes(&mut brushes, origin, planes)?;
        }

        let classname = entity.classname().to_string();
        let mut area_portal_num = None;

        match classname.as_str() {
            // group entities are for editor convenience only
            "func_group" => {
                world_brushes.append(&mut brushes);
            }
            "func_areaportal" => {
                if brushes.len() != 1 {
                    return Err(CompileError::BadAreaPortal(entity_index));
                }

                stats.area_portals += 1;
                area_portal_num = Some(stats.area_portals);
                properties.insert("areaportal".to_string(), stats.area_portals.to_string());

                for brush in &mut brushes {
                    brush.contents = Contents::AREA_PORTAL;
                }
                world_brushes.append(&mut brushes);
            }
            _ if entity_index == 0 => world_brushes.append(&mut brushes),
            _ => {}
        }

        model_brushes.push(brushes);
        entities.push(EntityInfo {
            classname,
            properties,
            origin,
            brushes: 0..0,
            area_portal_num,
        });
    }

    // world brushes first, then every other entity in order
    let mut all_brushes = world_brushes;
    if let Some(world) = entities.first_mut() {
        world.brushes = 0..all_brushes.len();
    }
    for (entity, mut brushes) in entities.iter_mut().zip(model_brushes).skip(1) {
        let start = all_brushes.len();
        all_brushes.append(&mut brushes);
        entity.brushes = start..all_brushes.len();
    }

    let bounds = entities
        .first()
        .map(|world| {
            BoundBox::for_points(
                all_brushes[world.brushes.clone()]
                    .iter()
                    .filter(|brush| brush.bounds.min().x <= MAX_WORLD_WIDTH)
                    .flat_map(|brush| [brush.bounds.min(), brush.bounds.max()]),
            )
        })
        .unwrap_or(BoundBox::zero());

    log::debug!("{:5} brushes", all_brushes.len());
    log::debug!("{:5} clip brushes", stats.clip_brushes);
    log::debug!("{:5} box bevels", stats.box_bevels);
    log::debug!("{:5} edge bevels", stats.edge_bevels);
    log::debug!("{:5} entities", entities.len());
    log::debug!("{:5} planes", planes.len());
    log::debug!("{:5} area portals", stats.area_portals);
    log::debug!("size: {:?} to {:?}", bounds.min(), bounds.max());

    Ok(LoadedMap { brushes: all_brushes, entities, bounds, stats })
} // load_map


// load.rs
