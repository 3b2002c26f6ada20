//! # njmodel
//!
//! A pure-Rust library for the Ninja family of console model formats:
//! relocatable node hierarchies with attached geometry in the Basic, Chunk,
//! and GameCube-indexed layouts.
//!
//! ## Supported Operations
//!
//! - **Offset streams** - Endian-aware readers and writers that follow and
//!   schedule 32-bit base-relative offsets, with read-side object caching and
//!   write-side relocation recording
//! - **Node graphs** - Arena-backed parent/child/sibling hierarchies with
//!   BAMS rotations and transform composition
//! - **Basic geometry** - Vertex/normal buffers, meshes, materials, and
//!   primitive-to-triangle expansion
//! - **Format sniffing** - Structural detection of the geometry layout when a
//!   blob carries no tag
//! - **Relocation containers** - Whole-model files with rebase tables
//! - **Basic to GC conversion** - Attribute deduplication into indexed pools
//!   with automatic index-width promotion
//!
//! ## Quick Start
//!
//! ### Reading a model container
//!
//! ```no_run
//! use std::fs::File;
//! use njmodel::formats::reloc::read_model;
//! use njmodel::io::Endian;
//!
//! let file = File::open("stage.mdl")?;
//! let (graph, kind) = read_model(file, Endian::Little)?;
//! println!("{} nodes of {kind:?} geometry", graph.node_count());
//! # Ok::<(), njmodel::Error>(())
//! ```
//!
//! ### Converting Basic geometry for the GameCube
//!
//! ```no_run
//! use std::fs::File;
//! use njmodel::converter::convert_graph;
//! use njmodel::formats::reloc::{read_model, write_model};
//! use njmodel::formats::GeometryKind;
//! use njmodel::io::Endian;
//!
//! let (graph, _) = read_model(File::open("stage.mdl")?, Endian::Little)?;
//! let converted = convert_graph(&graph)?;
//! let out = File::create("stage_gc.mdl")?;
//! write_model(out, &converted, GeometryKind::Gc, Endian::Big)?;
//! # Ok::<(), njmodel::Error>(())
//! ```

pub mod converter;
pub mod error;
pub mod formats;
pub mod io;
pub mod math;

// Re-exports for convenience
pub use error::{Error, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::formats::basic::{
        BasicGeometry, Material, MaterialFlags, Mesh, Primitive, PrimitiveType,
    };
    pub use crate::formats::gc::{GcGeometry, GcMesh, IndexAttributes};
    pub use crate::formats::node::{Node, NodeFlags, NodeGraph, NodeId};
    pub use crate::formats::reloc::{read_model, write_model, RelocContainer};
    pub use crate::formats::{Color, Geometry, GeometryKind, Uv};
    pub use crate::io::{Endian, OffsetReader, OffsetWriter};
    pub use crate::math::{BoundingSphere, Rotation3};

    pub use crate::converter;
}

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
