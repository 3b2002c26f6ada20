//! Endian-aware stream I/O with deferred offset resolution.
//!
//! The formats in this library encode object graphs as relative byte offsets
//! into a flat buffer. [`OffsetReader`] follows offsets without disturbing the
//! cursor and caches objects reached through more than one reference.
//! [`OffsetWriter`] emits placeholder offsets up front and patches them from a
//! deferred-write queue, recording every patched location for relocation
//! tables.

pub mod bitfield;
mod reader;
mod writer;

pub use reader::OffsetReader;
pub use writer::OffsetWriter;

/// Byte order of every multi-byte field in a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}
