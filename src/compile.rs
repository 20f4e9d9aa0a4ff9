///! Compilation pipeline module

use std::{ops::Range, path::Path};
use crate::{
    brush::{ClipBox, MAX_WORLD_WIDTH},
    bsp::{blocks::build_world_tree, builder::brush_bsp, Tree},
    config::{BspConfig, VisConfig},
    csg::{chop_brushes, make_bsp_brush_list},
    error::{CompileError, Result},
    geom::BoundBox,
    map::Map,
    math::Vec3d,
    portal::{
        flood::{fill_outside, flood_areas, flood_entities, mark_visible_sides, AreaMap, FloodResult, LeakPath},
        make_tree_portals,
    },
    prtfile::PortalFile,
    session::CompileSession,
    vis::{compute_vis, lump::VisLump, VisData},
};

/// Single compiled brush entity
pub struct CompiledModel {
    /// Index of the entity
    pub entity: usize,

    /// Model tree with its portals
    pub tree: Tree,

    /// Leak report, world only
    pub leak: Option<LeakPath>,

    /// Areas, world only
    pub areas: Option<AreaMap>,
}

/// Compilation result
pub struct CompiledMap {
    /// Session with the shared plane table and map brushes
    pub session: CompileSession,

    /// Models, the world one goes first
    pub models: Vec<CompiledModel>,

    /// World portal file, missing if the world leaks
    pub portal_file: Option<PortalFile>,
}

impl CompiledMap {
    /// World model
    pub fn world(&self) -> &CompiledModel {
        &self.models[0]
    }

    /// Check if the world leaks
    pub fn leaked(&self) -> bool {
        self.world().leak.is_some()
    }

    /// Write leak path (if any) to the file. Returns true if the file was written.
    pub fn save_leak_file(&self, path: &Path) -> Result<bool> {
        let Some(leak) = &self.world().leak else {
            return Ok(false);
        };

        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        leak.write(&mut file)?;
        Ok(true)
    }

    /// Calculate visibility of the world, nothing is calculated for leaking maps
    pub fn compile_vis(&self, config: &VisConfig) -> Result<Option<(VisData, VisLump)>> {
        self.portal_file.as_ref().map(|file| compile_vis(file, config)).transpose()
    }
}

/// Build world tree. The tree is built once more using visible sides of the first pass unless optimization is disabled or the map leaks.
fn process_world_model(session: &mut CompileSession) -> Result<CompiledModel> {
    log::info!("--- world model ---");

    let brushes = match session.entities.first() {
        Some(world) if !session.map_bounds.is_empty() => world.brushes.clone(),
        _ => return Err(CompileError::EmptyWorld),
    };

    let mut optimize = false;

    let (mut tree, leak) = loop {
        session.reset_counters();

        let mut tree = build_world_tree(session, brushes.clone())?;
        make_tree_portals(session, &mut tree)?;

        let leak = match flood_entities(session, &mut tree)? {
            FloodResult::Sealed => {
                let stats = fill_outside(&mut tree);
                log::debug!(
                    "{:5} solid leafs, {:5} leafs filled, {:5} inside leafs",
                    stats.solid,
                    stats.filled,
                    stats.inside,
                );
                None
            }
            FloodResult::NoEntities => {
                log::warn!("no entities in empty space");
                Some(LeakPath::default())
            }
            FloodResult::Leaked => Some(LeakPath::find(session, &tree)),
        };

        if let Some(leak) = &leak {
            log::warn!("**** leaked ****");
            if session.config.leak_test {
                return Err(CompileError::Leaked(leak.points.len()));
            }
        }

        mark_visible_sides(session, &mut tree, brushes.clone());

        if session.config.no_opt || leak.is_some() || optimize {
            break (tree, leak);
        }
        optimize = true;
    };

    let areas = flood_areas(session, &mut tree)?;

    let counters = session.counters();
    log::info!("{:5} nodes, {:5} brushes, {:5} portals", counters.nodes, counters.brushes, counters.portals);

    Ok(CompiledModel { entity: 0, tree, leak, areas: Some(areas) })
} // process_world_model

/// Build tree of a brush entity
fn process_submodel(session: &mut CompileSession, entity: usize, brushes: Range<usize>) -> Result<CompiledModel> {
    log::info!("--- model {} ---", entity);
    session.reset_counters();

    let bounds = BoundBox::from_minmax(
        Vec3d::new(-MAX_WORLD_WIDTH, -MAX_WORLD_WIDTH, -MAX_WORLD_WIDTH),
        Vec3d::new(MAX_WORLD_WIDTH, MAX_WORLD_WIDTH, MAX_WORLD_WIDTH),
    );
    let clip = ClipBox::new(&mut session.planes, bounds)?;

    let mut list = make_bsp_brush_list(session, brushes.clone(), &clip)?;
    if !session.config.no_csg {
        list = chop_brushes(session, list)?;
    }

    let (nodes, mut bounds) = brush_bsp(session, list, &clip)?;
    if bounds.is_empty() {
        log::warn!("model {} has no brush fragments", entity);
        bounds = BoundBox::from_minmax(Vec3d::new(-1.0, -1.0, -1.0), Vec3d::new(1.0, 1.0, 1.0));
    }
    let mut tree = Tree::from_nodes(nodes, bounds);

    make_tree_portals(session, &mut tree)?;
    mark_visible_sides(session, &mut tree, brushes);

    Ok(CompiledModel { entity, tree, leak: None, areas: None })
} // process_submodel

/// Compile map into model trees and the world portal file
pub fn compile_map(map: &Map, config: BspConfig) -> Result<CompiledMap> {
    let mut session = CompileSession::new(map, config)?;

    log::info!("{:5} entities", session.entities.len());
    log::info!("{:5} map brushes", session.map_brushes.len());
    log::info!("{:5} planes", session.planes.len());

    let mut models = vec![process_world_model(&mut session)?];

    let world = &mut models[0];
    let portal_file = match world.leak {
        Some(_) => None,
        None => Some(PortalFile::build(&session, &mut world.tree)?),
    };

    let submodels = session
        .entities
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, entity)| !entity.brushes.is_empty())
        .map(|(index, entity)| (index, entity.brushes.clone()))
        .collect::<Vec<_>>();

    for (entity, brushes) in submodels {
        models.push(process_submodel(&mut session, entity, brushes)?);
    }

    Ok(CompiledMap { session, models, portal_file })
} // compile_map

/// Calculate visibility of the portal file and pack it into the lump
pub fn compile_vis(file: &PortalFile, config: &VisConfig) -> Result<(VisData, VisLump)> {
    let data = compute_vis(file, config)?;
    let lump = VisLump::build(&data, config.max_vis_bytes)?;

    Ok((data, lump))
}

// compile.rs
