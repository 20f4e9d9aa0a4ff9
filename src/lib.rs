///! Weird BSP compiler library
///!
///! Turns map brushes into a binary space partition, the portal graph between its leafs
///! and the potentially visible/hearable sets of the resulting clusters.

use std::num::NonZeroU32;

/// Generic id implementation
macro_rules! impl_id {
    ($name: ident) => {
        /// Unique identifier
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Ord, PartialOrd)]
        pub struct $name(NonZeroU32);

        impl $name {
            /// Build id from index
            pub fn from_index(index: usize) -> Self {
                $name(NonZeroU32::MIN.saturating_add(index as u32))
            }

            /// Get index by id
            pub fn into_index(self) -> usize {
                self.0.get() as usize - 1
            }
        }
    };
}

impl_id!(NodeId);
impl_id!(PortalId);
impl_id!(MapBrushId);

/// Vector math
pub mod math;

/// Basic geometric primitives
pub mod geom;

/// Convex polygons
pub mod winding;

/// Plane table
pub mod plane;

/// Contents and surface flags
pub mod contents;

/// Compilation errors
pub mod error;

/// Compiler options
pub mod config;

/// Shared compilation state
pub mod session;

/// Compiler input
pub mod map;

/// Brushes and brush fragments
pub mod brush;

/// Constructive solid geometry
pub mod csg;

/// BSP tree
pub mod bsp;

/// Portals, flooding and leaks
pub mod portal;

/// Portal file
pub mod prtfile;

/// Visibility
pub mod vis;

/// Compilation pipeline
pub mod compile;

pub use compile::{compile_map, CompiledMap, CompiledModel};
pub use config::{BspConfig, ChopPolicy, VisConfig};
pub use error::{CompileError, PortalFileError, Result};
pub use session::CompileSession;

// lib.rs
