//! The Chunk geometry format, preserved structurally.
//!
//! Chunk models carry two self-describing streams: a vertex list of 32-bit
//! words and a poly list of 16-bit words, each a run of tagged chunks ending
//! at a 0xFF sentinel. The payload words are kept raw so a model can
//! round-trip byte-exact without this crate understanding every chunk kind.

use std::io::{Read, Seek, Write};

use crate::error::Result;
use crate::io::{OffsetReader, OffsetWriter};
use crate::math::BoundingSphere;

const END_CHUNK: u8 = 0xFF;

/// Poly chunk types below this carry no size word.
const FIRST_SIZED_POLY_TYPE: u8 = 16;

/// A 32-bit vertex chunk: `type:8 | flags:8 | size:16` then `size` words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexChunk {
    pub header: u32,
    pub payload: Vec<u32>,
}

impl VertexChunk {
    #[must_use]
    pub fn chunk_type(&self) -> u8 {
        (self.header & 0xFF) as u8
    }
}

/// A 16-bit poly chunk. Tiny chunks (type < 16) have no payload; the rest
/// carry a size word counting 16-bit payload words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolyChunk {
    pub header: u16,
    pub payload: Vec<u16>,
}

impl PolyChunk {
    #[must_use]
    pub fn chunk_type(&self) -> u8 {
        (self.header & 0xFF) as u8
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkGeometry {
    pub vertex_chunks: Vec<VertexChunk>,
    pub poly_chunks: Vec<PolyChunk>,
    pub bounds: BoundingSphere,
}

impl ChunkGeometry {
    pub(crate) fn read<R: Read + Seek>(reader: &mut OffsetReader<R>) -> Result<Self> {
        let vertex_offset = reader.read_i32()?;
        let poly_offset = reader.read_i32()?;
        let bounds = BoundingSphere::read(reader)?;

        let vertex_chunks = reader
            .at_offset(vertex_offset, read_vertex_chunks)?
            .unwrap_or_default();
        let poly_chunks = reader
            .at_offset(poly_offset, read_poly_chunks)?
            .unwrap_or_default();

        Ok(Self {
            vertex_chunks,
            poly_chunks,
            bounds,
        })
    }

    /// Plausibility probe: both offsets sane and the leading chunk of each
    /// stream carries a known type. Cursor restored.
    pub(crate) fn validate_header<R: Read + Seek>(reader: &mut OffsetReader<R>) -> Result<bool> {
        let start = reader.position()?;
        let verdict = Self::header_plausible(reader);
        reader.seek(start)?;
        verdict
    }

    fn header_plausible<R: Read + Seek>(reader: &mut OffsetReader<R>) -> Result<bool> {
        if reader.position()? + 24 > reader.stream_len() {
            return Ok(false);
        }
        let vertex_offset = reader.read_i32()?;
        let poly_offset = reader.read_i32()?;
        if !reader.check_offset(vertex_offset) || !reader.check_offset(poly_offset) {
            return Ok(false);
        }
        let vertex_ok = match reader.at_offset(vertex_offset, |reader| reader.read_u32())? {
            Some(header) => {
                let chunk_type = (header & 0xFF) as u8;
                chunk_type == END_CHUNK || (0x20..=0x24).contains(&chunk_type)
            }
            None => true,
        };
        let poly_ok = match reader.at_offset(poly_offset, |reader| reader.read_u16())? {
            Some(header) => {
                let chunk_type = (header & 0xFF) as u8;
                chunk_type == END_CHUNK || chunk_type <= 0x4B
            }
            None => true,
        };
        Ok(vertex_ok && poly_ok)
    }

    pub(crate) fn write<'g, W: Write + Seek>(
        &'g self,
        writer: &mut OffsetWriter<'g, W>,
    ) -> Result<()> {
        if self.vertex_chunks.is_empty() {
            writer.write_null_offset()?;
        } else {
            writer.schedule_offset(move |writer| {
                for chunk in &self.vertex_chunks {
                    writer.write_u32(chunk.header)?;
                    for word in &chunk.payload {
                        writer.write_u32(*word)?;
                    }
                }
                writer.write_u32(u32::from(END_CHUNK))
            })?;
        }
        if self.poly_chunks.is_empty() {
            writer.write_null_offset()?;
        } else {
            writer.schedule_offset(move |writer| {
                for chunk in &self.poly_chunks {
                    writer.write_u16(chunk.header)?;
                    if chunk.chunk_type() >= FIRST_SIZED_POLY_TYPE {
                        writer.write_u16(chunk.payload.len() as u16)?;
                    }
                    for word in &chunk.payload {
                        writer.write_u16(*word)?;
                    }
                }
                writer.write_u16(u16::from(END_CHUNK))
            })?;
        }
        self.bounds.write(writer)
    }
}

/// A truncated stream ends the list instead of failing; malformed models in
/// the wild stop mid-stream and the original tooling accepts them.
fn read_vertex_chunks<R: Read + Seek>(reader: &mut OffsetReader<R>) -> Result<Vec<VertexChunk>> {
    let mut chunks = Vec::new();
    loop {
        let Ok(header) = reader.read_u32() else {
            break;
        };
        if (header & 0xFF) as u8 == END_CHUNK {
            break;
        }
        let size = (header >> 16) as usize;
        let mut payload = Vec::with_capacity(size);
        let mut truncated = false;
        for _ in 0..size {
            match reader.read_u32() {
                Ok(word) => payload.push(word),
                Err(_) => {
                    truncated = true;
                    break;
                }
            }
        }
        chunks.push(VertexChunk { header, payload });
        if truncated {
            break;
        }
    }
    Ok(chunks)
}

fn read_poly_chunks<R: Read + Seek>(reader: &mut OffsetReader<R>) -> Result<Vec<PolyChunk>> {
    let mut chunks = Vec::new();
    loop {
        let Ok(header) = reader.read_u16() else {
            break;
        };
        let chunk_type = (header & 0xFF) as u8;
        if chunk_type == END_CHUNK {
            break;
        }
        let mut payload = Vec::new();
        let mut truncated = false;
        if chunk_type >= FIRST_SIZED_POLY_TYPE {
            match reader.read_u16() {
                Ok(size) => {
                    for _ in 0..size {
                        match reader.read_u16() {
                            Ok(word) => payload.push(word),
                            Err(_) => {
                                truncated = true;
                                break;
                            }
                        }
                    }
                }
                Err(_) => truncated = true,
            }
        }
        chunks.push(PolyChunk { header, payload });
        if truncated {
            break;
        }
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Endian;
    use std::io::Cursor;

    fn reader(bytes: Vec<u8>) -> OffsetReader<Cursor<Vec<u8>>> {
        OffsetReader::new(Cursor::new(bytes), Endian::Little, 0).unwrap()
    }

    #[test]
    fn test_vertex_list_stops_at_sentinel() {
        // One chunk of type 0x22 with 2 payload words, then the end chunk.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(0x0002_0022u32).to_le_bytes());
        bytes.extend_from_slice(&111u32.to_le_bytes());
        bytes.extend_from_slice(&222u32.to_le_bytes());
        bytes.extend_from_slice(&0xFFu32.to_le_bytes());
        bytes.extend_from_slice(&333u32.to_le_bytes()); // past the sentinel

        let mut r = reader(bytes);
        let chunks = read_vertex_chunks(&mut r).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type(), 0x22);
        assert_eq!(chunks[0].payload, vec![111, 222]);
    }

    #[test]
    fn test_truncated_stream_is_end_of_list() {
        // Chunk claims 4 payload words but the stream ends after 1.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(0x0004_0022u32).to_le_bytes());
        bytes.extend_from_slice(&111u32.to_le_bytes());

        let mut r = reader(bytes);
        let chunks = read_vertex_chunks(&mut r).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].payload, vec![111]);
    }

    #[test]
    fn test_tiny_poly_chunk_has_no_size_word() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x0101u16.to_le_bytes()); // type 1, tiny
        bytes.extend_from_slice(&0x0040u16.to_le_bytes()); // type 0x40, sized
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&777u16.to_le_bytes());
        bytes.extend_from_slice(&0x00FFu16.to_le_bytes());

        let mut r = reader(bytes);
        let chunks = read_poly_chunks(&mut r).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].payload.is_empty());
        assert_eq!(chunks[1].payload, vec![777]);
    }
}
