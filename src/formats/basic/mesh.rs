//! Basic-format meshes: primitive lists, per-corner overlays, and the
//! expansion of every primitive kind into plain triangles.

use std::io::{Read, Seek, Write};

use glam::Vec3;

use crate::error::{Error, Result};
use crate::formats::{Color, Uv};
use crate::io::{OffsetReader, OffsetWriter};

/// The primitive encoding shared by every primitive in a mesh (2-bit tag).
///
/// NGons use the strip wire encoding and the strip triangulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Triangles,
    Quads,
    NGons,
    Strips,
}

impl PrimitiveType {
    fn from_bits(bits: u16) -> Self {
        match bits & 3 {
            0 => Self::Triangles,
            1 => Self::Quads,
            2 => Self::NGons,
            _ => Self::Strips,
        }
    }

    fn to_bits(self) -> u16 {
        match self {
            Self::Triangles => 0,
            Self::Quads => 1,
            Self::NGons => 2,
            Self::Strips => 3,
        }
    }
}

/// A single primitive, holding vertex-list indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Primitive {
    Triangle([u16; 3]),
    Quad([u16; 4]),
    /// Also the wire form of NGons. `reversed` flips the winding of the
    /// first emitted triangle.
    Strip { reversed: bool, indices: Vec<u16> },
}

impl Primitive {
    /// Number of corners this primitive contributes to the mesh's per-corner
    /// overlay arrays.
    #[must_use]
    pub fn corner_count(&self) -> usize {
        match self {
            Self::Triangle(_) => 3,
            Self::Quad(_) => 4,
            Self::Strip { indices, .. } => indices.len(),
        }
    }

    fn read<R: Read + Seek>(
        reader: &mut OffsetReader<R>,
        primitive_type: PrimitiveType,
    ) -> Result<Self> {
        match primitive_type {
            PrimitiveType::Triangles => Ok(Self::Triangle([
                reader.read_u16()?,
                reader.read_u16()?,
                reader.read_u16()?,
            ])),
            PrimitiveType::Quads => Ok(Self::Quad([
                reader.read_u16()?,
                reader.read_u16()?,
                reader.read_u16()?,
                reader.read_u16()?,
            ])),
            PrimitiveType::NGons | PrimitiveType::Strips => {
                let header = reader.read_u16()?;
                let reversed = header & 0x8000 != 0;
                let count = (header & 0x7FFF) as usize;
                let mut indices = Vec::with_capacity(count);
                for _ in 0..count {
                    indices.push(reader.read_u16()?);
                }
                Ok(Self::Strip { reversed, indices })
            }
        }
    }

    fn write<W: Write + Seek>(&self, writer: &mut OffsetWriter<'_, W>) -> Result<()> {
        match self {
            Self::Triangle(indices) => {
                for index in indices {
                    writer.write_u16(*index)?;
                }
            }
            Self::Quad(indices) => {
                for index in indices {
                    writer.write_u16(*index)?;
                }
            }
            Self::Strip { reversed, indices } => {
                if indices.len() > 0x7FFF {
                    return Err(Error::OversizedStrip {
                        corners: indices.len(),
                    });
                }
                let mut header = indices.len() as u16;
                if *reversed {
                    header |= 0x8000;
                }
                writer.write_u16(header)?;
                for index in indices {
                    writer.write_u16(*index)?;
                }
            }
        }
        Ok(())
    }
}

/// One corner of an expanded triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleCorner {
    /// Index into the geometry's vertex list.
    pub vertex: u16,
    pub normal: Option<Vec3>,
    pub color: Option<Color>,
    pub uv: Option<Uv>,
}

/// A mesh: one material, one primitive encoding, optional per-corner overlays.
///
/// Overlay arrays (normals, colors, uvs) run parallel to the mesh's corners in
/// primitive order, so their length equals the total corner count. A mesh with
/// its own normal overlay never consults the geometry-level normal list.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Index into the geometry's material list (14 bits on disk).
    pub material_id: u16,
    pub primitive_type: PrimitiveType,
    pub primitives: Vec<Primitive>,
    pub normals: Option<Vec<Vec3>>,
    pub colors: Option<Vec<Color>>,
    pub uvs: Option<Vec<Uv>>,
}

impl Mesh {
    /// Total corner count across all primitives.
    #[must_use]
    pub fn corner_count(&self) -> usize {
        self.primitives.iter().map(Primitive::corner_count).sum()
    }

    pub(crate) fn read<R: Read + Seek>(reader: &mut OffsetReader<R>, dx: bool) -> Result<Self> {
        let packed = reader.read_u16()?;
        let material_id = packed & 0x3FFF;
        let primitive_type = PrimitiveType::from_bits(packed >> 14);
        let primitive_count = reader.read_u16()? as usize;

        let primitives = reader
            .read_offset_then(|reader| {
                let mut primitives = Vec::with_capacity(primitive_count);
                for _ in 0..primitive_count {
                    primitives.push(Primitive::read(reader, primitive_type)?);
                }
                Ok(primitives)
            })?
            .unwrap_or_default();

        let reserved_position = reader.position()?;
        let reserved = reader.read_i32()?;
        if reserved != 0 {
            return Err(Error::NonZeroReservedField {
                position: reserved_position,
                value: reserved as u32,
            });
        }

        let corners = primitives.iter().map(Primitive::corner_count).sum();
        let normals = reader.read_offset_then(|reader| read_vec3_list(reader, corners))?;
        let colors = reader.read_offset_then(|reader| read_color_list(reader, corners))?;
        let uvs = reader.read_offset_then(|reader| read_uv_list(reader, corners))?;

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

        Ok(Self {
            material_id,
            primitive_type,
            primitives,
            normals,
            colors,
            uvs,
        })
    }

    pub(crate) fn write<'g, W: Write + Seek>(
        &'g self,
        writer: &mut OffsetWriter<'g, W>,
        dx: bool,
    ) -> Result<()> {
        let packed = (self.material_id & 0x3FFF) | (self.primitive_type.to_bits() << 14);
        writer.write_u16(packed)?;
        writer.write_u16(self.primitives.len() as u16)?;

        if self.primitives.is_empty() {
            writer.write_null_offset()?;
        } else {
            writer.schedule_offset(move |writer| {
                for primitive in &self.primitives {
                    primitive.write(writer)?;
                }
                Ok(())
            })?;
        }

        writer.write_i32(0)?;

        schedule_list(writer, self.normals.as_deref(), |writer, normal| {
            writer.write_vec3(*normal)
        })?;
        schedule_list(writer, self.colors.as_deref(), |writer, color| {
            color.write(writer)
        })?;
        schedule_list(writer, self.uvs.as_deref(), |writer, uv| uv.write(writer))?;

        if dx {
            writer.write_i32(0)?;
        }
        Ok(())
    }

    /// Expand every primitive into triangles with resolved corner attributes.
    ///
    /// Quads split A,B,C then C,D,A. Strips walk a sliding window whose
    /// winding alternates per triangle, seeded by the reversed flag: the
    /// non-flipped window emits in order, the flipped first window swaps its
    /// last two corners, and every later flipped window swaps its first two.
    /// Normals come from the mesh overlay when present, otherwise from
    /// `geometry_normals` indexed by vertex.
    #[must_use]
    pub fn to_triangles(&self, geometry_normals: Option<&[Vec3]>) -> Vec<[TriangleCorner; 3]> {
        let corner = |vertex: u16, position: usize| TriangleCorner {
            vertex,
            normal: match &self.normals {
                Some(normals) => normals.get(position).copied(),
                None => geometry_normals.and_then(|list| list.get(vertex as usize)).copied(),
            },
            color: self.colors.as_ref().and_then(|list| list.get(position)).copied(),
            uv: self.uvs.as_ref().and_then(|list| list.get(position)).copied(),
        };

        let mut triangles = Vec::new();
        let mut base = 0usize;
        for primitive in &self.primitives {
            match primitive {
                Primitive::Triangle([a, b, c]) => {
                    triangles.push([
                        corner(*a, base),
                        corner(*b, base + 1),
                        corner(*c, base + 2),
                    ]);
                }
                Primitive::Quad([a, b, c, d]) => {
                    triangles.push([
                        corner(*a, base),
                        corner(*b, base + 1),
                        corner(*c, base + 2),
                    ]);
                    triangles.push([
                        corner(*c, base + 2),
                        corner(*d, base + 3),
                        corner(*a, base),
                    ]);
                }
                Primitive::Strip { reversed, indices } => {
                    let mut flip = *reversed;
                    for k in 0..indices.len().saturating_sub(2) {
                        let window = [
                            corner(indices[k], base + k),
                            corner(indices[k + 1], base + k + 1),
                            corner(indices[k + 2], base + k + 2),
                        ];
                        let triangle = if !flip {
                            window
                        } else if k == 0 {
                            [window[0], window[2], window[1]]
                        } else {
                            [window[1], window[0], window[2]]
                        };
                        triangles.push(triangle);
                        flip = !flip;
                    }
                }
            }
            base += primitive.corner_count();
        }
        triangles
    }
}

fn read_vec3_list<R: Read + Seek>(
    reader: &mut OffsetReader<R>,
    count: usize,
) -> Result<Vec<Vec3>> {
    let mut list = Vec::with_capacity(count);
    for _ in 0..count {
        list.push(reader.read_vec3()?);
    }
    Ok(list)
}

fn read_color_list<R: Read + Seek>(
    reader: &mut OffsetReader<R>,
    count: usize,
) -> Result<Vec<Color>> {
    let mut list = Vec::with_capacity(count);
    for _ in 0..count {
        list.push(Color::read(reader)?);
    }
    Ok(list)
}

fn read_uv_list<R: Read + Seek>(reader: &mut OffsetReader<R>, count: usize) -> Result<Vec<Uv>> {
    let mut list = Vec::with_capacity(count);
    for _ in 0..count {
        list.push(Uv::read(reader)?);
    }
    Ok(list)
}

fn schedule_list<'g, W, T, F>(
    writer: &mut OffsetWriter<'g, W>,
    list: Option<&'g [T]>,
    mut write_item: F,
) -> Result<()>
where
    W: Write + Seek,
    F: FnMut(&mut OffsetWriter<'g, W>, &T) -> Result<()> + 'g,
{
    match list {
        Some(items) => writer.schedule_offset(move |writer| {
            for item in items {
                write_item(writer, item)?;
            }
            Ok(())
        }),
        None => writer.write_null_offset(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh_with(primitive_type: PrimitiveType, primitives: Vec<Primitive>) -> Mesh {
        Mesh {
            material_id: 0,
            primitive_type,
            primitives,
            normals: None,
            colors: None,
            uvs: None,
        }
    }

    fn vertices(triangles: &[[TriangleCorner; 3]]) -> Vec<[u16; 3]> {
        triangles
            .iter()
            .map(|t| [t[0].vertex, t[1].vertex, t[2].vertex])
            .collect()
    }

    #[test]
    fn test_quad_split() {
        let mesh = mesh_with(PrimitiveType::Quads, vec![Primitive::Quad([0, 1, 2, 3])]);
        assert_eq!(
            vertices(&mesh.to_triangles(None)),
            vec![[0, 1, 2], [2, 3, 0]]
        );
    }

    #[test]
    fn test_strip_alternation() {
        let mesh = mesh_with(
            PrimitiveType::Strips,
            vec![Primitive::Strip {
                reversed: false,
                indices: vec![0, 1, 2, 3, 4],
            }],
        );
        assert_eq!(
            vertices(&mesh.to_triangles(None)),
            vec![[0, 1, 2], [2, 1, 3], [2, 3, 4]]
        );
    }

    #[test]
    fn test_reversed_strip_flips_first_triangle() {
        let mesh = mesh_with(
            PrimitiveType::Strips,
            vec![Primitive::Strip {
                reversed: true,
                indices: vec![0, 1, 2, 3],
            }],
        );
        assert_eq!(
            vertices(&mesh.to_triangles(None)),
            vec![[0, 2, 1], [1, 2, 3]]
        );
    }

    #[test]
    fn test_degenerate_strip_emits_nothing() {
        let mesh = mesh_with(
            PrimitiveType::Strips,
            vec![Primitive::Strip {
                reversed: false,
                indices: vec![0, 1],
            }],
        );
        assert!(mesh.to_triangles(None).is_empty());
    }

    #[test]
    fn test_overlays_follow_corner_position() {
        // Two triangles; the color overlay is addressed by corner position,
        // not by vertex index.
        let mut mesh = mesh_with(
            PrimitiveType::Triangles,
            vec![
                Primitive::Triangle([5, 6, 7]),
                Primitive::Triangle([7, 6, 8]),
            ],
        );
        let colors: Vec<Color> = (0..6)
            .map(|i| Color::new(i as u8, 0, 0, 255))
            .collect();
        mesh.colors = Some(colors);

        let triangles = mesh.to_triangles(None);
        assert_eq!(triangles[0][0].color, Some(Color::new(0, 0, 0, 255)));
        assert_eq!(triangles[1][0].color, Some(Color::new(3, 0, 0, 255)));
        assert_eq!(triangles[1][2].color, Some(Color::new(5, 0, 0, 255)));
    }

    #[test]
    fn test_mesh_normals_shadow_geometry_normals() {
        let geometry_normals = vec![Vec3::X; 3];
        let mut mesh = mesh_with(
            PrimitiveType::Triangles,
            vec![Primitive::Triangle([0, 1, 2])],
        );
        let triangles = mesh.to_triangles(Some(&geometry_normals));
        assert_eq!(triangles[0][0].normal, Some(Vec3::X));

        mesh.normals = Some(vec![Vec3::Y; 3]);
        let triangles = mesh.to_triangles(Some(&geometry_normals));
        assert_eq!(triangles[0][0].normal, Some(Vec3::Y));
    }

    #[test]
    fn test_strip_longer_than_count_field_rejected() {
        use crate::io::Endian;
        use std::io::Cursor;

        let mut writer = OffsetWriter::new(Cursor::new(Vec::new()), Endian::Little, 0);
        let full = Primitive::Strip {
            reversed: true,
            indices: vec![0; 0x7FFF],
        };
        full.write(&mut writer).unwrap();

        let oversized = Primitive::Strip {
            reversed: false,
            indices: vec![0; 0x8000],
        };
        let result = oversized.write(&mut writer);
        assert!(matches!(
            result,
            Err(Error::OversizedStrip { corners: 0x8000 })
        ));
    }

    #[test]
    fn test_packed_word_split() {
        assert_eq!(PrimitiveType::from_bits(0x8001 >> 14), PrimitiveType::NGons);
        assert_eq!(PrimitiveType::Strips.to_bits() << 14, 0xC000);
    }
}
