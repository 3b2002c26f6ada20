//! The GameCube indexed geometry format.
//!
//! Geometry is split into deduplicated attribute pools (positions, normals,
//! colors, texture coordinates) referenced by index from per-mesh display
//! lists. Index width is 8 or 16 bits per attribute, declared by the
//! mandatory index-attributes mesh parameter.

use std::io::{Read, Seek, Write};

use glam::Vec3;

use crate::error::{Error, Result};
use crate::formats::{Color, Uv};
use crate::io::{OffsetReader, OffsetWriter};
use crate::math::BoundingSphere;

const ATTRIBUTE_POSITION: u8 = 1;
const ATTRIBUTE_NORMAL: u8 = 2;
const ATTRIBUTE_COLOR: u8 = 3;
const ATTRIBUTE_TEXCOORD: u8 = 5;
const ATTRIBUTE_END: u8 = 0xFF;

const OPCODE_TRIANGLES: u8 = 0x90;
const OPCODE_STRIP: u8 = 0x98;

/// Mesh parameter kinds the converter and reader understand. Unknown kinds
/// round-trip raw.
pub const PARAM_INDEX_ATTRIBUTES: u32 = 1;
pub const PARAM_BLEND_ALPHA: u32 = 4;
pub const PARAM_TEXTURE: u32 = 8;

/// The index-attributes word: which attributes each corner indexes and which
/// of them use 16-bit indices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexAttributes(pub u32);

impl IndexAttributes {
    pub const HAS_POSITION: u32 = 0x01;
    pub const POSITION_16BIT: u32 = 0x02;
    pub const HAS_NORMAL: u32 = 0x04;
    pub const NORMAL_16BIT: u32 = 0x08;
    pub const HAS_COLOR: u32 = 0x10;
    pub const COLOR_16BIT: u32 = 0x20;
    pub const HAS_UV: u32 = 0x40;
    pub const UV_16BIT: u32 = 0x80;

    #[must_use]
    pub fn contains(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub fn set(&mut self, bit: u32, value: bool) {
        if value {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    /// Encoded byte width of one display-list corner.
    #[must_use]
    pub fn corner_size(&self) -> usize {
        let width = |has: u32, wide: u32| {
            if !self.contains(has) {
                0
            } else if self.contains(wide) {
                2
            } else {
                1
            }
        };
        width(Self::HAS_POSITION, Self::POSITION_16BIT)
            + width(Self::HAS_NORMAL, Self::NORMAL_16BIT)
            + width(Self::HAS_COLOR, Self::COLOR_16BIT)
            + width(Self::HAS_UV, Self::UV_16BIT)
    }
}

/// A raw mesh parameter pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcMeshParam {
    pub kind: u32,
    pub value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPrimitiveKind {
    Triangles,
    Strip,
}

/// One display-list corner: indices into the geometry's attribute pools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcCorner {
    pub position: u16,
    pub normal: Option<u16>,
    pub color: Option<u16>,
    pub uv: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcPrimitive {
    pub kind: GcPrimitiveKind,
    pub corners: Vec<GcCorner>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GcMesh {
    pub params: Vec<GcMeshParam>,
    pub primitives: Vec<GcPrimitive>,
}

impl GcMesh {
    /// The mandatory index-attributes parameter.
    pub fn index_attributes(&self) -> Result<IndexAttributes> {
        self.params
            .iter()
            .find(|param| param.kind == PARAM_INDEX_ATTRIBUTES)
            .map(|param| IndexAttributes(param.value))
            .ok_or(Error::MissingIndexAttributes)
    }

    fn display_list_size(&self) -> Result<u32> {
        let attributes = self.index_attributes()?;
        let corner_size = attributes.corner_size();
        let raw: usize = self
            .primitives
            .iter()
            .map(|primitive| 3 + primitive.corners.len() * corner_size)
            .sum();
        // GX FIFO data is padded to a 32-byte boundary.
        Ok(raw.next_multiple_of(32) as u32)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GcGeometry {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub colors: Vec<Color>,
    pub uvs: Vec<Uv>,
    pub opaque_meshes: Vec<GcMesh>,
    pub translucent_meshes: Vec<GcMesh>,
    pub bounds: BoundingSphere,
}

impl GcGeometry {
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            normals: Vec::new(),
            colors: Vec::new(),
            uvs: Vec::new(),
            opaque_meshes: Vec::new(),
            translucent_meshes: Vec::new(),
            bounds: BoundingSphere::default(),
        }
    }

    pub(crate) fn read<R: Read + Seek>(reader: &mut OffsetReader<R>) -> Result<Self> {
        let vertex_list_offset = reader.read_i32()?;
        let reserved_position = reader.position()?;
        let reserved = reader.read_u32()?;
        if reserved != 0 {
            return Err(Error::NonZeroReservedField {
                position: reserved_position,
                value: reserved,
            });
        }
        let opaque_offset = reader.read_i32()?;
        let translucent_offset = reader.read_i32()?;
        let opaque_count = reader.read_u16()? as usize;
        let translucent_count = reader.read_u16()? as usize;
        let bounds = BoundingSphere::read(reader)?;

        let mut geometry = Self {
            bounds,
            ..Self::new()
        };
        reader.at_offset(vertex_list_offset, |reader| {
            read_attribute_pools(reader, &mut geometry)
        })?;
        geometry.opaque_meshes = reader
            .at_offset(opaque_offset, |reader| read_meshes(reader, opaque_count))?
            .unwrap_or_default();
        geometry.translucent_meshes = reader
            .at_offset(translucent_offset, |reader| {
                read_meshes(reader, translucent_count)
            })?
            .unwrap_or_default();
        Ok(geometry)
    }

    /// Plausibility probe on the header; cursor restored.
    pub(crate) fn validate_header<R: Read + Seek>(reader: &mut OffsetReader<R>) -> Result<bool> {
        let start = reader.position()?;
        let verdict = Self::header_plausible(reader);
        reader.seek(start)?;
        verdict
    }

    fn header_plausible<R: Read + Seek>(reader: &mut OffsetReader<R>) -> Result<bool> {
        if reader.position()? + 36 > reader.stream_len() {
            return Ok(false);
        }
        let vertex_list_offset = reader.read_i32()?;
        let reserved = reader.read_u32()?;
        let opaque_offset = reader.read_i32()?;
        let translucent_offset = reader.read_i32()?;
        let opaque_count = reader.read_u16()?;
        let translucent_count = reader.read_u16()?;
        Ok(reserved == 0
            && reader.check_offset(vertex_list_offset)
            && reader.check_offset(opaque_offset)
            && reader.check_offset(translucent_offset)
            && (opaque_count == 0 || opaque_offset != 0)
            && (translucent_count == 0 || translucent_offset != 0))
    }

    pub(crate) fn write<'g, W: Write + Seek>(
        &'g self,
        writer: &mut OffsetWriter<'g, W>,
    ) -> Result<()> {
        let has_pools = !self.positions.is_empty()
            || !self.normals.is_empty()
            || !self.colors.is_empty()
            || !self.uvs.is_empty();
        if has_pools {
            writer.schedule_offset(move |writer| write_attribute_pools(writer, self))?;
        } else {
            writer.write_null_offset()?;
        }
        writer.write_u32(0)?;

        schedule_mesh_list(writer, &self.opaque_meshes)?;
        schedule_mesh_list(writer, &self.translucent_meshes)?;
        writer.write_u16(self.opaque_meshes.len() as u16)?;
        writer.write_u16(self.translucent_meshes.len() as u16)?;
        self.bounds.write(writer)
    }
}

impl Default for GcGeometry {
    fn default() -> Self {
        Self::new()
    }
}

fn read_attribute_pools<R: Read + Seek>(
    reader: &mut OffsetReader<R>,
    geometry: &mut GcGeometry,
) -> Result<()> {
    loop {
        let kind = reader.read_u8()?;
        if kind == ATTRIBUTE_END {
            return Ok(());
        }
        let _element_size = reader.read_u8()?;
        let count = reader.read_u16()? as usize;
        let data_offset = reader.read_u32()? as i32;
        let _data_size = reader.read_u32()?;

        reader.at_offset(data_offset, |reader| {
            match kind {
                ATTRIBUTE_POSITION => {
                    for _ in 0..count {
                        geometry.positions.push(reader.read_vec3()?);
                    }
                }
                ATTRIBUTE_NORMAL => {
                    for _ in 0..count {
                        geometry.normals.push(reader.read_vec3()?);
                    }
                }
                ATTRIBUTE_COLOR => {
                    for _ in 0..count {
                        geometry.colors.push(Color::read(reader)?);
                    }
                }
                ATTRIBUTE_TEXCOORD => {
                    for _ in 0..count {
                        geometry.uvs.push(Uv::read(reader)?);
                    }
                }
                other => {
                    return Err(Error::InvalidContainer {
                        message: format!("unknown vertex attribute kind {other:#x}"),
                    })
                }
            }
            Ok(())
        })?;
    }
}

fn read_meshes<R: Read + Seek>(
    reader: &mut OffsetReader<R>,
    count: usize,
) -> Result<Vec<GcMesh>> {
    let mut meshes = Vec::with_capacity(count);
    for _ in 0..count {
        let params_offset = reader.read_u32()? as i32;
        let params_count = reader.read_u32()? as usize;
        let display_list_offset = reader.read_u32()? as i32;
        let display_list_size = reader.read_u32()? as usize;

        let params = reader
            .at_offset(params_offset, |reader| {
                let mut params = Vec::with_capacity(params_count);
                for _ in 0..params_count {
                    params.push(GcMeshParam {
                        kind: reader.read_u32()?,
                        value: reader.read_u32()?,
                    });
                }
                Ok(params)
            })?
            .unwrap_or_default();

        let mut mesh = GcMesh {
            params,
            primitives: Vec::new(),
        };
        let attributes = mesh.index_attributes()?;
        mesh.primitives = reader
            .at_offset(display_list_offset, |reader| {
                read_display_list(reader, attributes, display_list_size)
            })?
            .unwrap_or_default();
        meshes.push(mesh);
    }
    Ok(meshes)
}

fn read_display_list<R: Read + Seek>(
    reader: &mut OffsetReader<R>,
    attributes: IndexAttributes,
    size: usize,
) -> Result<Vec<GcPrimitive>> {
    let corner_size = attributes.corner_size();
    let mut primitives = Vec::new();
    let mut consumed = 0usize;
    while consumed + 3 <= size {
        let opcode = reader.read_u8()?;
        if opcode == 0 {
            // Zero padding runs to the end of the recorded size.
            return Ok(primitives);
        }
        let kind = match opcode {
            OPCODE_TRIANGLES => GcPrimitiveKind::Triangles,
            OPCODE_STRIP => GcPrimitiveKind::Strip,
            value => return Err(Error::UnsupportedGcPrimitive { value }),
        };
        let corner_count = reader.read_u16()? as usize;
        consumed += 3 + corner_count * corner_size;
        if consumed > size {
            return Err(Error::InvalidContainer {
                message: format!("display list overruns its recorded size of {size} bytes"),
            });
        }
        let mut corners = Vec::with_capacity(corner_count);
        for _ in 0..corner_count {
            corners.push(read_corner(reader, attributes)?);
        }
        primitives.push(GcPrimitive { kind, corners });
    }
    Ok(primitives)
}

fn read_corner<R: Read + Seek>(
    reader: &mut OffsetReader<R>,
    attributes: IndexAttributes,
) -> Result<GcCorner> {
    let mut read_index = |has: u32, wide: u32| -> Result<Option<u16>> {
        if !attributes.contains(has) {
            Ok(None)
        } else if attributes.contains(wide) {
            Ok(Some(reader.read_u16()?))
        } else {
            Ok(Some(u16::from(reader.read_u8()?)))
        }
    };
    let position = read_index(IndexAttributes::HAS_POSITION, IndexAttributes::POSITION_16BIT)?
        .unwrap_or(0);
    let normal = read_index(IndexAttributes::HAS_NORMAL, IndexAttributes::NORMAL_16BIT)?;
    let color = read_index(IndexAttributes::HAS_COLOR, IndexAttributes::COLOR_16BIT)?;
    let uv = read_index(IndexAttributes::HAS_UV, IndexAttributes::UV_16BIT)?;
    Ok(GcCorner {
        position,
        normal,
        color,
        uv,
    })
}

fn write_attribute_pools<'g, W: Write + Seek>(
    writer: &mut OffsetWriter<'g, W>,
    geometry: &'g GcGeometry,
) -> Result<()> {
    write_pool_entry(writer, ATTRIBUTE_POSITION, 12, &geometry.positions, |w, v| {
        w.write_vec3(*v)
    })?;
    write_pool_entry(writer, ATTRIBUTE_NORMAL, 12, &geometry.normals, |w, v| {
        w.write_vec3(*v)
    })?;
    write_pool_entry(writer, ATTRIBUTE_COLOR, 4, &geometry.colors, |w, c| {
        c.write(w)
    })?;
    write_pool_entry(writer, ATTRIBUTE_TEXCOORD, 4, &geometry.uvs, |w, uv| {
        uv.write(w)
    })?;
    writer.write_u8(ATTRIBUTE_END)?;
    writer.write_bytes(&[0u8; 11])
}

/// Empty pools emit neither an entry nor a buffer.
fn write_pool_entry<'g, W, T, F>(
    writer: &mut OffsetWriter<'g, W>,
    kind: u8,
    element_size: u8,
    pool: &'g [T],
    mut write_item: F,
) -> Result<()>
where
    W: Write + Seek,
    F: FnMut(&mut OffsetWriter<'g, W>, &T) -> Result<()> + 'g,
{
    if pool.is_empty() {
        return Ok(());
    }
    writer.write_u8(kind)?;
    writer.write_u8(element_size)?;
    writer.write_u16(pool.len() as u16)?;
    writer.schedule_offset(move |writer| {
        for item in pool {
            write_item(writer, item)?;
        }
        Ok(())
    })?;
    writer.write_u32(pool.len() as u32 * u32::from(element_size))
}

fn schedule_mesh_list<'g, W: Write + Seek>(
    writer: &mut OffsetWriter<'g, W>,
    meshes: &'g [GcMesh],
) -> Result<()> {
    if meshes.is_empty() {
        return writer.write_null_offset();
    }
    writer.schedule_offset(move |writer| {
        for mesh in meshes {
            write_mesh(writer, mesh)?;
        }
        Ok(())
    })
}

fn write_mesh<'g, W: Write + Seek>(
    writer: &mut OffsetWriter<'g, W>,
    mesh: &'g GcMesh,
) -> Result<()> {
    let attributes = mesh.index_attributes()?;
    let size = mesh.display_list_size()?;

    writer.schedule_offset(move |writer| {
        for param in &mesh.params {
            writer.write_u32(param.kind)?;
            writer.write_u32(param.value)?;
        }
        Ok(())
    })?;
    writer.write_u32(mesh.params.len() as u32)?;
    writer.schedule_offset(move |writer| {
        let start = writer.position()?;
        for primitive in &mesh.primitives {
            let opcode = match primitive.kind {
                GcPrimitiveKind::Triangles => OPCODE_TRIANGLES,
                GcPrimitiveKind::Strip => OPCODE_STRIP,
            };
            writer.write_u8(opcode)?;
            let corner_count =
                u16::try_from(primitive.corners.len()).map_err(|_| Error::InvalidContainer {
                    message: format!(
                        "display-list primitive has {} corners, more than a 16-bit count",
                        primitive.corners.len()
                    ),
                })?;
            writer.write_u16(corner_count)?;
            for corner in &primitive.corners {
                write_corner(writer, attributes, corner)?;
            }
        }
        let written = writer.position()? - start;
        for _ in written..u64::from(size) {
            writer.write_u8(0)?;
        }
        Ok(())
    })?;
    writer.write_u32(size)
}

fn write_corner<W: Write + Seek>(
    writer: &mut OffsetWriter<'_, W>,
    attributes: IndexAttributes,
    corner: &GcCorner,
) -> Result<()> {
    let mut write_index = |index: Option<u16>, has: u32, wide: u32| -> Result<()> {
        if !attributes.contains(has) {
            return Ok(());
        }
        let index = index.unwrap_or(0);
        if attributes.contains(wide) {
            writer.write_u16(index)
        } else {
            writer.write_u8(index as u8)
        }
    };
    write_index(
        Some(corner.position),
        IndexAttributes::HAS_POSITION,
        IndexAttributes::POSITION_16BIT,
    )?;
    write_index(
        corner.normal,
        IndexAttributes::HAS_NORMAL,
        IndexAttributes::NORMAL_16BIT,
    )?;
    write_index(
        corner.color,
        IndexAttributes::HAS_COLOR,
        IndexAttributes::COLOR_16BIT,
    )?;
    write_index(
        corner.uv,
        IndexAttributes::HAS_UV,
        IndexAttributes::UV_16BIT,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::Endian;
    use std::io::Cursor;

    #[test]
    fn test_corner_size_tracks_flags() {
        let mut attributes = IndexAttributes::default();
        attributes.set(IndexAttributes::HAS_POSITION, true);
        attributes.set(IndexAttributes::HAS_NORMAL, true);
        assert_eq!(attributes.corner_size(), 2);
        attributes.set(IndexAttributes::POSITION_16BIT, true);
        assert_eq!(attributes.corner_size(), 3);
        attributes.set(IndexAttributes::HAS_UV, true);
        attributes.set(IndexAttributes::UV_16BIT, true);
        assert_eq!(attributes.corner_size(), 5);
    }

    #[test]
    fn test_missing_index_attributes_is_an_error() {
        let mesh = GcMesh {
            params: vec![GcMeshParam {
                kind: PARAM_TEXTURE,
                value: 7,
            }],
            primitives: Vec::new(),
        };
        assert!(matches!(
            mesh.index_attributes(),
            Err(Error::MissingIndexAttributes)
        ));
    }

    #[test]
    fn test_display_list_size_is_padded() {
        let mut attributes = IndexAttributes::default();
        attributes.set(IndexAttributes::HAS_POSITION, true);
        let mesh = GcMesh {
            params: vec![GcMeshParam {
                kind: PARAM_INDEX_ATTRIBUTES,
                value: attributes.0,
            }],
            primitives: vec![GcPrimitive {
                kind: GcPrimitiveKind::Triangles,
                corners: vec![GcCorner::default(); 3],
            }],
        };
        // 3 header bytes + 3 one-byte corners, padded to 32.
        assert_eq!(mesh.display_list_size().unwrap(), 32);
    }

    #[test]
    fn test_corner_count_past_u16_rejected_on_write() {
        let mut attributes = IndexAttributes::default();
        attributes.set(IndexAttributes::HAS_POSITION, true);
        let mesh = GcMesh {
            params: vec![GcMeshParam {
                kind: PARAM_INDEX_ATTRIBUTES,
                value: attributes.0,
            }],
            primitives: vec![GcPrimitive {
                kind: GcPrimitiveKind::Triangles,
                corners: vec![GcCorner::default(); 65536],
            }],
        };
        let mut writer = OffsetWriter::new(Cursor::new(Vec::new()), Endian::Little, 0);
        write_mesh(&mut writer, &mesh).unwrap();
        // The display list body is deferred, so the count check fires on flush.
        let result = writer.flush_deferred();
        assert!(matches!(result, Err(Error::InvalidContainer { .. })));
    }
}
