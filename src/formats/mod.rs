//! Binary scene formats: node hierarchies and their attached geometry.
//!
//! Geometry comes in a closed set of on-disk layouts. `Basic` (and its DX
//! variant) is fully modeled; `Chunk` is preserved structurally; `Gc` covers
//! the indexed layout the converter produces. None of the layouts carries a
//! discriminant byte, so [`Geometry::read`] can sniff the format by
//! structural trial when the caller does not know it.

pub mod basic;
pub mod chunk;
pub mod gc;
pub mod node;
pub mod reloc;

use std::io::{Read, Seek, Write};

pub use basic::BasicGeometry;
pub use chunk::ChunkGeometry;
pub use gc::GcGeometry;
pub use node::{Node, NodeFlags, NodeGraph, NodeId};

use crate::error::{Error, Result};
use crate::io::{Endian, OffsetReader, OffsetWriter};
use crate::math::BoundingSphere;

/// An RGBA color.
///
/// The on-disk channel order depends on the stream's endianness: BGRA bytes
/// in little-endian streams, ARGB bytes in big-endian streams. This is a
/// channel reordering, not a word swap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Self = Self {
        r: 255,
        g: 255,
        b: 255,
        a: 255,
    };

    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub(crate) fn read<R: Read + Seek>(reader: &mut OffsetReader<R>) -> Result<Self> {
        let bytes = reader.read_bytes(4)?;
        Ok(match reader.endian() {
            Endian::Little => Self {
                b: bytes[0],
                g: bytes[1],
                r: bytes[2],
                a: bytes[3],
            },
            Endian::Big => Self {
                a: bytes[0],
                r: bytes[1],
                g: bytes[2],
                b: bytes[3],
            },
        })
    }

    pub(crate) fn write<W: Write + Seek>(&self, writer: &mut OffsetWriter<'_, W>) -> Result<()> {
        let bytes = match writer.endian() {
            Endian::Little => [self.b, self.g, self.r, self.a],
            Endian::Big => [self.a, self.r, self.g, self.b],
        };
        writer.write_bytes(&bytes)
    }
}

/// A texture coordinate pair in signed 1/256 texel units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Uv {
    pub u: i16,
    pub v: i16,
}

impl Uv {
    pub fn new(u: i16, v: i16) -> Self {
        Self { u, v }
    }

    pub(crate) fn read<R: Read + Seek>(reader: &mut OffsetReader<R>) -> Result<Self> {
        Ok(Self {
            u: reader.read_i16()?,
            v: reader.read_i16()?,
        })
    }

    pub(crate) fn write<W: Write + Seek>(&self, writer: &mut OffsetWriter<'_, W>) -> Result<()> {
        writer.write_i16(self.u)?;
        writer.write_i16(self.v)
    }
}

/// The format tag of an attached geometry.
///
/// `Unknown` asks the parser to resolve the layout by structural sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    Basic,
    BasicDx,
    Chunk,
    Gc,
    Unknown,
}

/// Geometry attached to a node, one variant per on-disk layout.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Basic(BasicGeometry),
    Chunk(ChunkGeometry),
    Gc(GcGeometry),
}

impl Geometry {
    #[must_use]
    pub fn kind(&self) -> GeometryKind {
        match self {
            Self::Basic(basic) if basic.dx => GeometryKind::BasicDx,
            Self::Basic(_) => GeometryKind::Basic,
            Self::Chunk(_) => GeometryKind::Chunk,
            Self::Gc(_) => GeometryKind::Gc,
        }
    }

    #[must_use]
    pub fn bounds(&self) -> &BoundingSphere {
        match self {
            Self::Basic(basic) => &basic.bounds,
            Self::Chunk(chunk) => &chunk.bounds,
            Self::Gc(gc) => &gc.bounds,
        }
    }

    /// Parse a geometry at the current position.
    ///
    /// With a concrete `kind`, the matching parser runs directly. With
    /// [`GeometryKind::Unknown`], candidates are tried in priority order
    /// Basic, BasicDX, Chunk, GC: each runs its structural validator and, if
    /// that passes, a real parse. A mid-parse failure falls through to the
    /// next candidate. Probe failures are local; only the final
    /// [`Error::UnknownGeometryFormat`] propagates.
    pub(crate) fn read<R: Read + Seek>(
        reader: &mut OffsetReader<R>,
        kind: GeometryKind,
    ) -> Result<Self> {
        match kind {
            GeometryKind::Basic => Ok(Self::Basic(BasicGeometry::read(reader, false)?)),
            GeometryKind::BasicDx => Ok(Self::Basic(BasicGeometry::read(reader, true)?)),
            GeometryKind::Chunk => Ok(Self::Chunk(ChunkGeometry::read(reader)?)),
            GeometryKind::Gc => Ok(Self::Gc(GcGeometry::read(reader)?)),
            GeometryKind::Unknown => Self::sniff(reader),
        }
    }

    fn sniff<R: Read + Seek>(reader: &mut OffsetReader<R>) -> Result<Self> {
        const CANDIDATES: [GeometryKind; 4] = [
            GeometryKind::Basic,
            GeometryKind::BasicDx,
            GeometryKind::Chunk,
            GeometryKind::Gc,
        ];

        let start = reader.position()?;
        for kind in CANDIDATES {
            let plausible = match kind {
                GeometryKind::Basic => BasicGeometry::validate_header(reader, false)?,
                GeometryKind::BasicDx => BasicGeometry::validate_header(reader, true)?,
                GeometryKind::Chunk => ChunkGeometry::validate_header(reader)?,
                GeometryKind::Gc => GcGeometry::validate_header(reader)?,
                GeometryKind::Unknown => unreachable!(),
            };
            if !plausible {
                continue;
            }
            reader.seek(start)?;
            match Self::read(reader, kind) {
                Ok(geometry) => {
                    tracing::debug!("sniffed geometry at {start:#x} as {kind:?}");
                    return Ok(geometry);
                }
                Err(error) => {
                    tracing::trace!("candidate {kind:?} failed at {start:#x}: {error}");
                    reader.seek(start)?;
                }
            }
        }
        Err(Error::UnknownGeometryFormat { offset: start })
    }

    pub(crate) fn write<'g, W: Write + Seek>(
        &'g self,
        writer: &mut OffsetWriter<'g, W>,
    ) -> Result<()> {
        match self {
            Self::Basic(basic) => basic.write(writer),
            Self::Chunk(chunk) => chunk.write(writer),
            Self::Gc(gc) => gc.write(writer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_sniff_falls_through_after_mid_parse_failure() {
        // Shaped like a Basic header whose single mesh record carries a
        // nonzero reserved word: the Basic and DX validators both pass, the
        // real parses both fail, and resolution must move on to Chunk, which
        // reads the same bytes as an empty model with null stream offsets.
        let mut bytes = vec![0u8; 64];
        bytes[12..16].copy_from_slice(&40i32.to_le_bytes()); // mesh list offset
        bytes[20..22].copy_from_slice(&1i16.to_le_bytes()); // mesh count
        bytes[48..52].copy_from_slice(&0xDEADu32.to_le_bytes()); // mesh reserved word

        let mut reader =
            OffsetReader::new(Cursor::new(bytes.clone()), Endian::Little, 0).unwrap();
        let geometry = Geometry::read(&mut reader, GeometryKind::Unknown).unwrap();
        assert!(matches!(geometry, Geometry::Chunk(_)));

        // The same bytes parsed directly as Basic surface the failure that
        // the sniffer stepped over.
        let mut reader = OffsetReader::new(Cursor::new(bytes), Endian::Little, 0).unwrap();
        assert!(matches!(
            Geometry::read(&mut reader, GeometryKind::Basic),
            Err(Error::NonZeroReservedField { .. })
        ));
    }
}
