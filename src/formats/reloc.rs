//! The relocation-table container wrapping a serialized model.
//!
//! Layout: 4 ignored bytes, `resourceType:i32, dataSize:i32,
//! relocationCount:i32, relocationTableOffset:i32`, zero padding to a 32-byte
//! header, the resource body (all internal offsets relative to byte 32),
//! padding to a 16-byte boundary, then one i32 per stored offset field
//! giving its position relative to the body. A loader can rebase the model
//! in place by adding its load address at each listed position.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use crate::error::{Error, Result};
use crate::formats::{GeometryKind, NodeGraph};
use crate::io::{Endian, OffsetReader, OffsetWriter};

/// Size of the container header; also the body's base offset.
pub const HEADER_SIZE: u64 = 32;

const RESOURCE_BASIC: i32 = 0;
const RESOURCE_BASIC_DX: i32 = 1;
const RESOURCE_CHUNK: i32 = 2;
const RESOURCE_GC: i32 = 3;

/// A parsed container: the raw body plus its relocation table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocContainer {
    pub resource_type: i32,
    pub body: Vec<u8>,
    /// Body-relative positions of every stored offset field.
    pub relocations: Vec<i32>,
}

impl RelocContainer {
    /// Build a container by serializing a body through a fresh
    /// [`OffsetWriter`] with base offset 0.
    ///
    /// Body-relative offsets written by `build` are valid once the body lands
    /// at byte 32, and the writer's patch list becomes the relocation table
    /// verbatim.
    pub fn pack<'a, F>(resource_type: i32, endian: Endian, build: F) -> Result<Self>
    where
        F: FnOnce(&mut OffsetWriter<'a, Cursor<Vec<u8>>>) -> Result<()>,
    {
        let mut writer = OffsetWriter::new(Cursor::new(Vec::new()), endian, 0);
        build(&mut writer)?;
        writer.flush_deferred()?;
        let relocations = writer
            .offset_positions()
            .iter()
            .map(|&position| {
                i32::try_from(position).map_err(|_| Error::OffsetOverflow { position })
            })
            .collect::<Result<Vec<i32>>>()?;
        Ok(Self {
            resource_type,
            body: writer.into_inner().into_inner(),
            relocations,
        })
    }

    pub fn read<R: Read + Seek>(inner: R, endian: Endian) -> Result<Self> {
        let mut reader = OffsetReader::new(inner, endian, 0)?;
        reader.seek(4)?;
        let resource_type = reader.read_i32()?;
        let data_size = read_size(&mut reader, "data size")?;
        let relocation_count = read_size(&mut reader, "relocation count")?;
        let table_offset = read_size(&mut reader, "relocation table offset")?;
        for _ in 0..3 {
            let position = reader.position()?;
            let word = reader.read_u32()?;
            if word != 0 {
                return Err(Error::NonZeroReservedField {
                    position,
                    value: word,
                });
            }
        }

        reader.seek(HEADER_SIZE)?;
        let body = reader.read_bytes(data_size)?;

        reader.seek(HEADER_SIZE + table_offset as u64)?;
        let mut relocations = Vec::with_capacity(relocation_count);
        for _ in 0..relocation_count {
            relocations.push(reader.read_i32()?);
        }

        Ok(Self {
            resource_type,
            body,
            relocations,
        })
    }

    pub fn write<W: Write + Seek>(&self, inner: W, endian: Endian) -> Result<()> {
        let mut writer = OffsetWriter::new(inner, endian, 0);
        writer.write_u32(0)?;
        writer.write_i32(self.resource_type)?;
        writer.write_i32(self.body.len() as i32)?;
        writer.write_i32(self.relocations.len() as i32)?;
        let table_offset = (self.body.len() as u64).next_multiple_of(16);
        writer.write_i32(table_offset as i32)?;
        writer.write_bytes(&[0u8; 12])?;

        writer.write_bytes(&self.body)?;
        writer.align(16)?;
        for relocation in &self.relocations {
            writer.write_i32(*relocation)?;
        }
        Ok(())
    }
}

fn read_size<R: Read + Seek>(reader: &mut OffsetReader<R>, what: &str) -> Result<usize> {
    let value = reader.read_i32()?;
    usize::try_from(value).map_err(|_| Error::InvalidContainer {
        message: format!("negative {what}: {value}"),
    })
}

fn resource_type_for(kind: GeometryKind) -> Result<i32> {
    match kind {
        GeometryKind::Basic => Ok(RESOURCE_BASIC),
        GeometryKind::BasicDx => Ok(RESOURCE_BASIC_DX),
        GeometryKind::Chunk => Ok(RESOURCE_CHUNK),
        GeometryKind::Gc => Ok(RESOURCE_GC),
        GeometryKind::Unknown => Err(Error::InvalidContainer {
            message: "cannot store a model without a concrete format".into(),
        }),
    }
}

fn kind_for(resource_type: i32) -> Result<GeometryKind> {
    match resource_type {
        RESOURCE_BASIC => Ok(GeometryKind::Basic),
        RESOURCE_BASIC_DX => Ok(GeometryKind::BasicDx),
        RESOURCE_CHUNK => Ok(GeometryKind::Chunk),
        RESOURCE_GC => Ok(GeometryKind::Gc),
        other => Err(Error::InvalidContainer {
            message: format!("unknown resource type {other}"),
        }),
    }
}

/// Read a whole model out of a container stream.
pub fn read_model<R: Read + Seek>(inner: R, endian: Endian) -> Result<(NodeGraph, GeometryKind)> {
    let container = RelocContainer::read(inner, endian)?;
    let kind = kind_for(container.resource_type)?;
    tracing::debug!(
        ?kind,
        body_len = container.body.len(),
        relocations = container.relocations.len(),
        "read model container"
    );
    let mut reader = OffsetReader::new(Cursor::new(container.body), endian, 0)?;
    let graph = NodeGraph::read(&mut reader, kind)?;
    Ok((graph, kind))
}

/// Serialize a whole model into a container stream.
///
/// The graph's root record lands at byte 32; every non-null offset field it
/// produces gets a relocation entry.
pub fn write_model<W: Write + Seek>(
    mut inner: W,
    graph: &NodeGraph,
    kind: GeometryKind,
    endian: Endian,
) -> Result<()> {
    let resource_type = resource_type_for(kind)?;
    let container = RelocContainer::pack(resource_type, endian, |writer| {
        graph.write(writer)?;
        writer.flush_deferred()
    })?;
    inner.seek(SeekFrom::Start(0))?;
    container.write(inner, endian)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_lifts_patch_list() {
        let container = RelocContainer::pack(RESOURCE_BASIC, Endian::Little, |writer| {
            writer.write_u32(0xDEAD)?;
            writer.schedule_offset(|writer| writer.write_u32(0xBEEF))?;
            writer.flush_deferred()
        })
        .unwrap();
        assert_eq!(container.relocations, vec![4]);
        assert_eq!(container.body.len(), 12);
    }

    #[test]
    fn test_container_round_trip() {
        let original = RelocContainer {
            resource_type: RESOURCE_GC,
            body: vec![1, 2, 3, 4, 5],
            relocations: vec![0],
        };
        let mut buffer = Cursor::new(Vec::new());
        original.write(&mut buffer, Endian::Big).unwrap();
        buffer.set_position(0);
        let reread = RelocContainer::read(buffer, Endian::Big).unwrap();
        assert_eq!(reread, original);
    }

    #[test]
    fn test_nonzero_reserved_header_bytes_rejected() {
        let original = RelocContainer {
            resource_type: RESOURCE_BASIC,
            body: vec![0; 4],
            relocations: Vec::new(),
        };
        let mut buffer = Cursor::new(Vec::new());
        original.write(&mut buffer, Endian::Little).unwrap();
        let mut bytes = buffer.into_inner();
        bytes[24] = 0xAA; // inside the reserved tail of the header
        let result = RelocContainer::read(Cursor::new(bytes), Endian::Little);
        assert!(matches!(
            result,
            Err(Error::NonZeroReservedField { position: 24, .. })
        ));
    }
}
