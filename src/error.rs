//! Error types for `njmodel`

use thiserror::Error;

/// The error type for `njmodel` operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    /// IO error from stream operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An offset field failed the alignment/bounds plausibility check.
    #[error("malformed offset {offset:#x} at position {position:#x}")]
    MalformedOffset {
        /// The raw offset value read from the stream.
        offset: i32,
        /// The stream position of the offset field.
        position: u64,
    },

    /// A geometry blob failed every candidate format validator.
    #[error("no geometry format matched the data at {offset:#x}")]
    UnknownGeometryFormat {
        /// The absolute stream position of the candidate geometry.
        offset: u64,
    },

    /// A field documented as always-zero held a nonzero value.
    ///
    /// This signals an unhandled format variant and is never ignored.
    #[error("reserved field at position {position:#x} is nonzero: {value:#x}")]
    NonZeroReservedField {
        /// The stream position of the reserved field.
        position: u64,
        /// The value found.
        value: u32,
    },

    /// Node hierarchy nesting exceeded the parser's depth cap.
    ///
    /// Offsets forming a cycle would otherwise recurse forever.
    #[error("node hierarchy deeper than {limit} levels")]
    RecursionLimitExceeded {
        /// The depth cap that was hit.
        limit: usize,
    },

    /// A GC attribute pool grew past what 16-bit indices can address.
    #[error("{attribute} pool has {count} entries, more than 16-bit indices can address")]
    AttributePoolOverflow {
        /// The attribute kind whose pool overflowed.
        attribute: &'static str,
        /// The number of distinct entries accumulated.
        count: usize,
    },

    /// A strip primitive has more corners than its 15-bit count field holds.
    #[error("strip has {corners} corners, more than a 15-bit count")]
    OversizedStrip {
        /// The number of corners in the strip.
        corners: usize,
    },

    /// A relocation-table container header is inconsistent.
    #[error("invalid container: {message}")]
    InvalidContainer {
        /// Description of what is inconsistent.
        message: String,
    },

    /// A GC display-list primitive opcode was not recognized.
    #[error("unsupported GC primitive opcode: {value:#x}")]
    UnsupportedGcPrimitive {
        /// The opcode byte.
        value: u8,
    },

    /// A GC mesh is missing its mandatory index-attributes parameter.
    #[error("GC mesh has no index-attributes parameter")]
    MissingIndexAttributes,

    /// A write produced a position that does not fit a 32-bit offset field.
    #[error("offset at position {position:#x} does not fit in 32 bits")]
    OffsetOverflow {
        /// The placeholder position being patched.
        position: u64,
    },
}

/// A specialized Result type for `njmodel` operations.
pub type Result<T> = std::result::Result<T, Error>;
