///! Compiler options

/// Policy of choosing which brush of an intersecting pair gets subtracted
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ChopPolicy {
    /// Keep the subtraction that produces fewer fragments, skip the pair if both fragment
    #[default]
    FewestFragments,

    /// Always accept the subtraction with fewer fragments
    AllowFragmentation,
}

/// BSP stage options
#[derive(Clone, Debug)]
pub struct BspConfig {
    /// Brushes with smaller volume are reported as micro brushes
    pub micro_volume: f64,

    /// World block size (in units)
    pub block_size: f64,

    /// Minimal and maximal world block index
    pub block_limits: (i32, i32),

    /// Drop detail brushes
    pub no_detail: bool,

    /// Keep detail brushes structural
    pub full_detail: bool,

    /// Drop liquid brushes
    pub no_water: bool,

    /// Skip brush chopping
    pub no_csg: bool,

    /// Skip second BSP pass based on visible sides
    pub no_opt: bool,

    /// Treat leaks as fatal
    pub leak_test: bool,

    /// Brush chopping tie-break
    pub chop_policy: ChopPolicy,

    /// Plane table capacity
    pub max_planes: usize,

    /// Node capacity (per world or model)
    pub max_nodes: usize,

    /// Brush fragment capacity
    pub max_brushes: usize,

    /// Portal capacity
    pub max_portals: usize,

    /// Build world blocks in parallel
    pub parallel: bool,
}

impl Default for BspConfig {
    fn default() -> Self {
        Self {
            micro_volume: 1.0,
            block_size: 1024.0,
            block_limits: (-4, 3),
            no_detail: false,
            full_detail: false,
            no_water: false,
            no_csg: false,
            no_opt: false,
            leak_test: false,
            chop_policy: ChopPolicy::default(),
            max_planes: 65536,
            max_nodes: 65536,
            max_brushes: 1 << 20,
            max_portals: 1 << 20,
            parallel: true,
        }
    }
}

/// Visibility stage options
#[derive(Clone, Debug)]
pub struct VisConfig {
    /// Use base flood as final visibility
    pub fast: bool,

    /// Process portals in file order
    pub no_sort: bool,

    /// Make PVS symmetric
    pub symmetric: bool,

    /// Worker thread count, 0 means rayon default. Only 1 gives run-to-run identical output.
    pub threads: usize,

    /// Maximal size of visibility lump
    pub max_vis_bytes: usize,
}

impl Default for VisConfig {
    fn default() -> Self {
        Self {
            fast: false,
            no_sort: false,
            symmetric: true,
            threads: 0,
            max_vis_bytes: 0x400000,
        }
    }
}

// config.rs
