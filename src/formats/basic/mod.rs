//! The Basic geometry format: flat vertex/normal buffers, a mesh list, and a
//! material list, all reached through offsets from a compact header.
//!
//! The DX variant is byte-compatible except for a trailing reserved word on
//! the header and on every mesh record, both required to be zero.

mod material;
mod mesh;

pub use material::{AlphaOp, FilterMode, Material, MaterialFlags};
pub use mesh::{Mesh, Primitive, PrimitiveType, TriangleCorner};

use std::io::{Read, Seek, Write};

use glam::Vec3;

use crate::error::{Error, Result};
use crate::io::{OffsetReader, OffsetWriter};
use crate::math::BoundingSphere;

#[derive(Debug, Clone, PartialEq)]
pub struct BasicGeometry {
    /// Whether this geometry uses the DX record layout.
    pub dx: bool,
    pub vertices: Vec<Vec3>,
    /// Geometry-level normals, parallel to `vertices`. Meshes carrying their
    /// own per-corner normals ignore this list.
    pub normals: Option<Vec<Vec3>>,
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
    pub bounds: BoundingSphere,
}

impl BasicGeometry {
    pub fn new(dx: bool) -> Self {
        Self {
            dx,
            vertices: Vec::new(),
            normals: None,
            meshes: Vec::new(),
            materials: Vec::new(),
            bounds: BoundingSphere::default(),
        }
    }

    pub(crate) fn read<R: Read + Seek>(reader: &mut OffsetReader<R>, dx: bool) -> Result<Self> {
        let vertex_offset = reader.read_i32()?;
        let normal_offset = reader.read_i32()?;
        let vertex_count = read_count(reader)?;
        let mesh_offset = reader.read_i32()?;
        let material_offset = reader.read_i32()?;
        let mesh_count = reader.read_i16()?.max(0) as usize;
        let material_count = reader.read_i16()?.max(0) as usize;
        let bounds = BoundingSphere::read(reader)?;

        if dx {
            let position = reader.position()?;
            let unused = reader.read_i32()?;
            if unused != 0 {
                return Err(Error::NonZeroReservedField {
                    position,
                    value: unused as u32,
                });
            }
        }

        let vertices = reader
            .at_offset(vertex_offset, |reader| read_vec3s(reader, vertex_count))?
            .unwrap_or_default();
        let normals = reader.at_offset(normal_offset, |reader| read_vec3s(reader, vertex_count))?;
        let meshes = reader
            .at_offset(mesh_offset, |reader| {
                let mut meshes = Vec::with_capacity(mesh_count);
                for _ in 0..mesh_count {
                    meshes.push(Mesh::read(reader, dx)?);
                }
                Ok(meshes)
            })?
            .unwrap_or_default();
        let materials = reader
            .at_offset(material_offset, |reader| {
                let mut materials = Vec::with_capacity(material_count);
                for _ in 0..material_count {
                    materials.push(Material::read(reader)?);
                }
                Ok(materials)
            })?
            .unwrap_or_default();

        Ok(Self {
            dx,
            vertices,
            normals,
            meshes,
            materials,
            bounds,
        })
    }

    /// Plausibility probe on the header fields alone; cursor restored.
    pub(crate) fn validate_header<R: Read + Seek>(
        reader: &mut OffsetReader<R>,
        dx: bool,
    ) -> Result<bool> {
        let start = reader.position()?;
        let verdict = Self::header_plausible(reader, dx);
        reader.seek(start)?;
        verdict
    }

    fn header_plausible<R: Read + Seek>(reader: &mut OffsetReader<R>, dx: bool) -> Result<bool> {
        // Five offset/count words, two i16 counts, 16 bounds bytes, plus the
        // DX variant's trailing reserved word.
        let header_len: u64 = if dx { 44 } else { 40 };
        if reader.position()? + header_len > reader.stream_len() {
            return Ok(false);
        }
        let vertex_offset = reader.read_i32()?;
        let normal_offset = reader.read_i32()?;
        let vertex_count = reader.read_i32()?;
        let mesh_offset = reader.read_i32()?;
        let material_offset = reader.read_i32()?;
        let mesh_count = reader.read_i16()?;
        let material_count = reader.read_i16()?;
        reader.skip(16)?; // bounds

        let mut plausible = reader.check_offset(vertex_offset)
            && reader.check_offset(normal_offset)
            && reader.check_offset(mesh_offset)
            && reader.check_offset(material_offset)
            && vertex_count >= 0
            && mesh_count >= 0
            && material_count >= 0
            && (vertex_count == 0 || vertex_offset != 0)
            && (mesh_count == 0 || mesh_offset != 0);
        if dx && plausible {
            plausible = reader.read_i32()? == 0;
        }
        Ok(plausible)
    }

    pub(crate) fn write<'g, W: Write + Seek>(
        &'g self,
        writer: &mut OffsetWriter<'g, W>,
    ) -> Result<()> {
        let vertices = (!self.vertices.is_empty()).then_some(self.vertices.as_slice());
        schedule_vec3s(writer, vertices)?;
        schedule_vec3s(writer, self.normals.as_deref())?;
        writer.write_i32(self.vertices.len() as i32)?;

        if self.meshes.is_empty() {
            writer.write_null_offset()?;
        } else {
            writer.schedule_offset(move |writer| {
                for mesh in &self.meshes {
                    mesh.write(writer, self.dx)?;
                }
                Ok(())
            })?;
        }
        if self.materials.is_empty() {
            writer.write_null_offset()?;
        } else {
            writer.schedule_offset(move |writer| {
                for material in &self.materials {
                    material.write(writer)?;
                }
                Ok(())
            })?;
        }

        writer.write_i16(self.meshes.len() as i16)?;
        writer.write_i16(self.materials.len() as i16)?;
        self.bounds.write(writer)?;
        if self.dx {
            writer.write_i32(0)?;
        }
        Ok(())
    }
}

fn read_count<R: Read + Seek>(reader: &mut OffsetReader<R>) -> Result<usize> {
    Ok(reader.read_i32()?.max(0) as usize)
}

fn read_vec3s<R: Read + Seek>(reader: &mut OffsetReader<R>, count: usize) -> Result<Vec<Vec3>> {
    let mut list = Vec::with_capacity(count);
    for _ in 0..count {
        list.push(reader.read_vec3()?);
    }
    Ok(list)
}

fn schedule_vec3s<'g, W: Write + Seek>(
    writer: &mut OffsetWriter<'g, W>,
    list: Option<&'g [Vec3]>,
) -> Result<()> {
    match list {
        Some(items) => writer.schedule_offset(move |writer| {
            for item in items {
                writer.write_vec3(*item)?;
            }
            Ok(())
        }),
        None => writer.write_null_offset(),
    }
}
