//! Cross-format model conversion.

mod basic_to_gc;

pub use basic_to_gc::{convert_geometry, convert_graph};
