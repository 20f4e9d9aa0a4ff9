///! Compilation error declaration module

use thiserror::Error;

use crate::math::Vec3d;

/// Portal file parsing error
#[derive(Debug, Error, PartialEq)]
pub enum PortalFileError {
    /// File doesn't start with portal file magic
    #[error("bad portal file magic {0:?}")]
    BadMagic(String),

    /// Expected one more token
    #[error("unexpected end of portal file")]
    NextTokenExpected,

    /// Number parsing error
    #[error("bad number {token:?} in portal file")]
    BadNumber {
        /// Token number was parsed from
        token: String,
    },

    /// Unexpected token
    #[error("unexpected token {actual:?}, expected {expected:?}")]
    UnexpectedToken {
        /// Actual token
        actual: String,

        /// Expected token
        expected: &'static str,
    },

    /// Portal refers to cluster outside of cluster range
    #[error("portal {portal} references cluster {cluster} of {cluster_count}")]
    BadCluster {
        /// Portal index
        portal: usize,

        /// Referenced cluster
        cluster: i64,

        /// Total cluster count
        cluster_count: usize,
    },

    /// Portal winding with unsupported point count
    #[error("portal {portal} has bad point count {count}")]
    BadPointCount {
        /// Portal index
        portal: usize,

        /// Point count
        count: i64,
    },
}

/// Fatal compilation error
#[derive(Debug, Error)]
pub enum CompileError {
    /// Winding clipping produced more points than it can hold
    #[error("winding points exceeded estimate ({0} points)")]
    WindingOverflow(usize),

    /// Plane normal is too short to be a plane
    #[error("bad plane normal {0:?}")]
    BadNormal(Vec3d),

    /// Plane table is full
    #[error("plane table is full ({0} planes)")]
    PlaneTableFull(usize),

    /// Node capacity exceeded
    #[error("node limit exceeded ({0} nodes)")]
    NodeLimit(usize),

    /// Brush capacity exceeded
    #[error("brush limit exceeded ({0} brushes)")]
    BrushLimit(usize),

    /// Portal capacity exceeded
    #[error("portal limit exceeded ({0} portals)")]
    PortalLimit(usize),

    /// Splitter plane was already used by some parent node
    #[error("splitter plane {0} was already used by a parent node")]
    TriedParent(u32),

    /// Brush reported both facing and split by the same plane
    #[error("brush {0} is both facing and split by plane {1}")]
    FacingWithSplits(usize, u32),

    /// Portal doesn't refer to the node it's linked to
    #[error("portal is mislinked to node {0}")]
    MislinkedPortal(usize),

    /// Portal flood requested on non-leaf node
    #[error("entity flood through non-leaf node")]
    FloodThroughNode,

    /// Origin brush in world entity
    #[error("origin brush in world entity (brush {0})")]
    OriginBrushInWorld(usize),

    /// World entity has no brushes to build tree of
    #[error("world has no brushes")]
    EmptyWorld,

    /// Area portal entity with more or less than one brush
    #[error("func_areaportal entity {0} must be a single brush")]
    BadAreaPortal(usize),

    /// Map leaks while leak test is enabled
    #[error("map leaks ({0} point leak path)")]
    Leaked(usize),

    /// Visibility lump overflow
    #[error("visibility data exceeds {0} bytes")]
    VisOverflow(usize),

    /// Compressed visibility row can't be decoded
    #[error("compressed visibility row is corrupt")]
    CorruptVis,

    /// Set bit outside of cluster range
    #[error("bad bit {0} in PVS row of cluster {1}")]
    BadPvsBit(usize, usize),

    /// Portal wasn't processed before cluster merge
    #[error("portal {0} isn't done")]
    PortalNotDone(usize),

    /// Leaf has more portals than allowed
    #[error("leaf {0} has too many portals")]
    LeafPortalLimit(usize),

    /// Portal file parsing error
    #[error(transparent)]
    PortalFile(#[from] PortalFileError),

    /// Filesystem error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Compilation result
pub type Result<T> = std::result::Result<T, CompileError>;

// error.rs
