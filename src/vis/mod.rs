///! Cluster visibility calculation module

use crate::{
    config::VisConfig,
    error::{CompileError, PortalFileError, Result},
    geom::Plane,
    math::Vec3d,
    prtfile::PortalFile,
    winding::Winding,
};

/// Portal flow
pub mod flow;

/// Compressed visibility lump
pub mod lump;

/// Maximal count of portals a single cluster may have
pub const MAX_PORTALS_ON_LEAF: usize = 128;

/// Fixed-size bit vector
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Bits(Vec<u8>);

impl Bits {
    /// Build zeroed vector for `count` bits
    pub fn new(count: usize) -> Self {
        Self(vec![0; (count + 7) >> 3])
    }

    /// Build vector from raw bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get bit
    pub fn get(&self, index: usize) -> bool {
        self.0.get(index >> 3).is_some_and(|byte| byte & (1 << (index & 7)) != 0)
    }

    /// Set bit
    pub fn set(&mut self, index: usize) {
        self.0[index >> 3] |= 1 << (index & 7);
    }

    /// Count of set bits
    pub fn count(&self) -> usize {
        self.0.iter().map(|byte| byte.count_ones() as usize).sum()
    }

    /// Set all bits that are set in `other`
    pub fn union_with(&mut self, other: &Bits) {
        for (dst, src) in self.0.iter_mut().zip(&other.0) {
            *dst |= *src;
        }
    }

    /// Iterate indices of set bits
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(index, byte)| {
            (0..8).filter(move |bit| byte & (1 << bit) != 0).map(move |bit| (index << 3) + bit)
        })
    }
}

/// One side of file portal
#[derive(Clone, Debug)]
pub struct VisPortal {
    /// Portal plane, faces into the cluster the portal leads to
    pub plane: Plane,

    /// Cluster the portal leads to
    pub leaf: usize,

    /// Portal polygon
    pub winding: Winding,

    /// Bounding sphere center
    pub origin: Vec3d,

    /// Bounding sphere radius
    pub radius: f64,
}

impl VisPortal {
    fn new(plane: Plane, leaf: usize, winding: Winding) -> Self {
        let origin = winding.center();
        let radius = winding
            .points
            .iter()
            .map(|point| (*point - origin).length())
            .fold(0.0, f64::max);

        Self { plane, leaf, winding, origin, radius }
    }
}

/// Cluster with its portals
#[derive(Clone, Debug, Default)]
pub struct VisLeaf {
    /// Portals leading out of the cluster
    pub portals: Vec<usize>,
}

/// Portal graph vis works on
#[derive(Clone, Debug, Default)]
pub struct VisMap {
    /// Portals, every file portal yields a forward one and a backward one right after it
    pub portals: Vec<VisPortal>,

    /// Clusters
    pub leafs: Vec<VisLeaf>,
}

impl VisMap {
    /// Build portal graph from portal file. Fails on portals with out of range clusters or less than 3 points.
    pub fn new(file: &PortalFile) -> Result<Self> {
        let mut leafs = vec![VisLeaf::default(); file.cluster_count];
        let mut portals = Vec::with_capacity(file.portals.len() * 2);

        for (index, portal) in file.portals.iter().enumerate() {
            let [front, back] = portal.clusters.map(|cluster| cluster as usize);
            let w = &portal.winding;

            if let Some(&cluster) = portal.clusters.iter().find(|&&cluster| cluster as usize >= file.cluster_count) {
                return Err(PortalFileError::BadCluster {
                    portal: index,
                    cluster: cluster as i64,
                    cluster_count: file.cluster_count,
                }
                .into());
            }
            if w.points.len() < 3 {
                return Err(PortalFileError::BadPointCount { portal: index, count: w.points.len() as i64 }.into());
            }

            let Some(plane) = Plane::from_points(w.points[0], w.points[1], w.points[2]) else {
                log::warn!("portal {} has degenerate winding", index);
                continue;
            };

            // forward portal looks from the front cluster into the back one
            for (owner, portal) in [
                (front, VisPortal::new(plane.negate_direction(), back, w.clone())),
                (back, VisPortal::new(plane, front, w.reversed())),
            ] {
                let leaf = &mut leafs[owner];
                if leaf.portals.len() == MAX_PORTALS_ON_LEAF {
                    return Err(CompileError::LeafPortalLimit(owner));
                }

                leaf.portals.push(portals.len());
                portals.push(portal);
            }
        }

        Ok(Self { portals, leafs })
    }

    /// Count of clusters
    pub fn cluster_count(&self) -> usize {
        self.leafs.len()
    }
}

/// Potentially visible and hearable sets of all clusters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VisData {
    /// Count of clusters
    pub cluster_count: usize,

    /// Potentially visible set rows
    pub pvs: Vec<Bits>,

    /// Potentially hearable set rows
    pub phs: Vec<Bits>,
}

impl VisData {
    /// Length of a single uncompressed row
    pub fn row_bytes(&self) -> usize {
        (self.cluster_count + 7) >> 3
    }

    /// Check if cluster `to` is potentially visible from `from`
    pub fn can_see(&self, from: usize, to: usize) -> bool {
        self.pvs.get(from).is_some_and(|row| row.get(to))
    }

    /// Check if cluster `to` is potentially hearable from `from`
    pub fn can_hear(&self, from: usize, to: usize) -> bool {
        self.phs.get(from).is_some_and(|row| row.get(to))
    }
}

/// Merge portal visibility of the cluster into the cluster row
pub fn cluster_merge(map: &VisMap, vis: &[Option<Bits>], cluster: usize) -> Result<Bits> {
    let mut portal_vector = Bits::new(map.portals.len());

    for &portal in &map.leafs[cluster].portals {
        let portal_vis = vis
            .get(portal)
            .and_then(Option::as_ref)
            .ok_or(CompileError::PortalNotDone(portal))?;

        portal_vector.union_with(portal_vis);
        portal_vector.set(portal);
    }

    let mut row = Bits::new(map.cluster_count());
    for portal in portal_vector.ones() {
        row.set(map.portals[portal].leaf);
    }

    if row.get(cluster) {
        log::warn!("cluster {} portals saw into cluster", cluster);
    }
    row.set(cluster);

    log::debug!("cluster {:4}: {:4} visible", cluster, row.count());
    Ok(row)
}

/// Make visibility mutual
pub fn symmetrize(pvs: &mut [Bits]) {
    for from in 0..pvs.len() {
        for to in pvs[from].ones().collect::<Vec<_>>() {
            if to < pvs.len() && to != from {
                pvs[to].set(from);
            }
        }
    }
}

/// Calculate hearable sets, a cluster hears everything visible from clusters it sees
pub fn calc_phs(pvs: &[Bits]) -> Result<Vec<Bits>> {
    log::trace!("--- calc_phs ---");

    let cluster_count = pvs.len();
    let mut phs = Vec::with_capacity(cluster_count);
    let mut total = 0;

    for (cluster, row) in pvs.iter().enumerate() {
        let mut hearable = row.clone();

        for seen in row.ones() {
            let seen_row = pvs.get(seen).ok_or(CompileError::BadPvsBit(seen, cluster))?;
            hearable.union_with(seen_row);
        }

        total += hearable.count();
        phs.push(hearable);
    }

    if cluster_count != 0 {
        log::info!("average clusters hearable: {}", total / cluster_count);
    }

    Ok(phs)
}

/// Calculate cluster visibility of the portal file.
///
/// Output is byte-identical between runs only with `threads == 1`. With more workers a portal
/// flow may read a neighbour's final result or its flood bound depending on timing, so rows
/// may differ while both stay valid over-approximations.
pub fn compute_vis(file: &PortalFile, config: &VisConfig) -> Result<VisData> {
    log::info!("--- vis ---");

    let map = VisMap::new(file)?;
    log::debug!("{:5} portals, {:5} clusters", map.portals.len(), map.cluster_count());

    let flood = flow::base_vis(&map);

    let vis = if config.fast {
        // flood is a very loose bound
        flood.into_iter().map(Some).collect::<Vec<_>>()
    } else {
        let order = flow::sort_portals(&flood, config.no_sort);
        flow::final_vis(&map, &flood, &order, config.threads)
    };

    let mut pvs = (0..map.cluster_count())
        .map(|cluster| cluster_merge(&map, &vis, cluster))
        .collect::<Result<Vec<_>>>()?;

    if config.symmetric {
        symmetrize(&mut pvs);
    }

    if !pvs.is_empty() {
        let total = pvs.iter().map(Bits::count).sum::<usize>();
        log::info!("average clusters visible: {}", total / pvs.len());
    }

    let phs = calc_phs(&pvs)?;

    Ok(VisData { cluster_count: map.cluster_count(), pvs, phs })
} // compute_vis

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{prtfile::FilePortal, vec3d};

    /// Portal of x = `x` plane, facing -x
    pub(crate) fn wall_portal(clusters: [u32; 2], x: f64) -> FilePortal {
        FilePortal {
            clusters,
            winding: Winding::new(vec![
                vec3d!(x, 0.0, 0.0),
                vec3d!(x, 0.0, 64.0),
                vec3d!(x, 64.0, 64.0),
                vec3d!(x, 64.0, 0.0),
            ]),
        }
    }

    #[test]
    fn bits_basics() {
        let mut bits = Bits::new(12);
        assert_eq!(bits.bytes().len(), 2);

        bits.set(0);
        bits.set(9);
        assert!(bits.get(9) && !bits.get(8) && !bits.get(100));
        assert_eq!(bits.count(), 2);
        assert_eq!(bits.ones().collect::<Vec<_>>(), vec![0, 9]);
    }

    #[test]
    fn portals_are_doubled() {
        let file = PortalFile { cluster_count: 2, portals: vec![wall_portal([0, 1], 32.0)] };
        let map = VisMap::new(&file).unwrap();

        assert_eq!(map.portals.len(), 2);
        assert_eq!(map.leafs[0].portals, vec![0]);
        assert_eq!(map.leafs[1].portals, vec![1]);

        // the forward portal plane faces its target
        let forward = &map.portals[0];
        assert_eq!(forward.leaf, 1);
        assert!((forward.plane.normal ^ map.portals[1].plane.normal) < -0.99);
        assert_eq!(map.portals[1].winding.points[0], forward.winding.points[3]);
        assert!((forward.radius - (2.0 * 32.0 * 32.0f64).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn leaf_portal_limit() {
        let portals = (0..=MAX_PORTALS_ON_LEAF as u32).map(|index| wall_portal([0, 1], index as f64)).collect();
        let file = PortalFile { cluster_count: 2, portals };

        assert!(matches!(VisMap::new(&file), Err(CompileError::LeafPortalLimit(0))));
    }

    #[test]
    fn out_of_range_portals_are_rejected() {
        let file = PortalFile { cluster_count: 2, portals: vec![wall_portal([0, 1], 0.0), wall_portal([1, 5], 32.0)] };

        assert!(matches!(
            VisMap::new(&file),
            Err(CompileError::PortalFile(PortalFileError::BadCluster { portal: 1, cluster: 5, cluster_count: 2 }))
        ));

        let mut short = wall_portal([0, 1], 0.0);
        short.winding.points.truncate(2);
        let file = PortalFile { cluster_count: 2, portals: vec![short] };

        assert!(matches!(
            VisMap::new(&file),
            Err(CompileError::PortalFile(PortalFileError::BadPointCount { portal: 0, count: 2 }))
        ));
    }

    #[test]
    fn merge_and_phs() {
        let file = PortalFile {
            cluster_count: 3,
            portals: vec![wall_portal([0, 1], 32.0), wall_portal([1, 2], 96.0)],
        };
        let map = VisMap::new(&file).unwrap();

        // only direct neighbours are visible
        let vis = (0..map.portals.len()).map(|_| Some(Bits::new(map.portals.len()))).collect::<Vec<_>>();
        let pvs = (0..3).map(|cluster| cluster_merge(&map, &vis, cluster).unwrap()).collect::<Vec<_>>();

        assert_eq!(pvs[0].ones().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(pvs[1].ones().collect::<Vec<_>>(), vec![0, 1, 2]);

        let phs = calc_phs(&pvs).unwrap();
        assert_eq!(phs[0].ones().collect::<Vec<_>>(), vec![0, 1, 2]);

        let mut missing = vis.clone();
        missing[2] = None;
        assert!(matches!(cluster_merge(&map, &missing, 1), Err(CompileError::PortalNotDone(2))));

        let mut bad = pvs.clone();
        bad[0] = Bits::from_bytes(vec![0b1000_0001]);
        assert!(matches!(calc_phs(&bad), Err(CompileError::BadPvsBit(7, 0))));
    }

    #[test]
    fn symmetrize_mirrors_rows() {
        let mut pvs = vec![Bits::new(3), Bits::new(3), Bits::new(3)];
        pvs[0].set(0);
        pvs[0].set(2);
        pvs[1].set(1);
        pvs[2].set(2);

        symmetrize(&mut pvs);
        assert!(pvs[2].get(0));
        assert!(!pvs[1].get(0));
    }
}

// mod.rs
