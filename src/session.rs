///! Compilation session module

use crate::{
    brush::MapBrush,
    config::BspConfig,
    error::{CompileError, Result},
    geom::BoundBox,
    map::{load::{load_map, EntityInfo}, Map},
    plane::PlaneRegistry,
    MapBrushId,
};

/// Per-model object counters
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    /// Tree nodes (and leafs) allocated
    pub nodes: usize,

    /// Brush fragments allocated
    pub brushes: usize,

    /// Portals allocated
    pub portals: usize,
}

/// State shared by all compilation stages
pub struct CompileSession {
    /// Options
    pub config: BspConfig,

    /// Plane table
    pub planes: PlaneRegistry,

    /// Map brushes, world ones first
    pub map_brushes: Vec<MapBrush>,

    /// Entities
    pub entities: Vec<EntityInfo>,

    /// World brush bounds
    pub map_bounds: BoundBox,

    /// Capacity counters, touched from block workers
    counters: parking_lot::Mutex<Counters>,
}

impl CompileSession {
    /// Load map into new session
    pub fn new(map: &Map, config: BspConfig) -> Result<Self> {
        let mut planes = PlaneRegistry::new(config.max_planes);
        let loaded = load_map(map, &config, &mut planes)?;

        Ok(Self {
            config,
            planes,
            map_brushes: loaded.brushes,
            entities: loaded.entities,
            map_bounds: loaded.bounds,
            counters: parking_lot::Mutex::new(Counters::default()),
        })
    }

    /// Get map brush by id
    pub fn map_brush(&self, id: MapBrushId) -> &MapBrush {
        &self.map_brushes[id.into_index()]
    }

    /// Snapshot of current counters
    pub fn counters(&self) -> Counters {
        *self.counters.lock()
    }

    /// Reset counters before the next model or pass
    pub fn reset_counters(&self) {
        *self.counters.lock() = Counters::default();
    }

    /// Register new nodes
    pub fn count_nodes(&self, count: usize) -> Result<()> {
        let mut counters = self.counters.lock();
        counters.nodes += count;

        if counters.nodes > self.config.max_nodes {
            return Err(CompileError::NodeLimit(self.config.max_nodes));
        }
        Ok(())
    }

    /// Register new brush fragments
    pub fn count_brushes(&self, count: usize) -> Result<()> {
        let mut counters = self.counters.lock();
        counters.brushes += count;

        if counters.brushes > self.config.max_brushes {
            return Err(CompileError::BrushLimit(self.config.max_brushes));
        }
        Ok(())
    }

    /// Register new portals
    pub fn count_portals(&self, count: usize) -> Result<()> {
        let mut counters = self.counters.lock();
        counters.portals += count;

        if counters.portals > self.config.max_portals {
            return Err(CompileError::PortalLimit(self.config.max_portals));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{contents::{Contents, SurfaceFlags}, map::{BrushDesc, Entity}, vec3d};

    #[test]
    fn counters_are_limited() {
        let map = Map {
            entities: vec![Entity::new("worldspawn").with_brush(BrushDesc::from_bounds(
                BoundBox::from_minmax(vec3d!(0.0, 0.0, 0.0), vec3d!(16.0, 16.0, 16.0)),
                Contents::SOLID,
                SurfaceFlags::empty(),
            ))],
        };
        let session = CompileSession::new(&map, BspConfig { max_nodes: 4, ..Default::default() }).unwrap();

        assert_eq!(session.map_brushes.len(), 1);
        assert_eq!(session.map_brush(MapBrushId::from_index(0)).sides.len(), 6);

        session.count_nodes(3).unwrap();
        assert!(matches!(session.count_nodes(2), Err(CompileError::NodeLimit(4))));

        session.reset_counters();
        assert_eq!(session.counters(), Counters::default());
        session.count_nodes(4).unwrap();
    }
}

// session.rs
