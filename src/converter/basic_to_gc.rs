//! Basic to GameCube geometry conversion.
//!
//! The Basic format stores fat per-corner data; the GC format wants compact
//! indexed pools. Conversion expands every Basic primitive to triangles,
//! deduplicates each attribute into a pool shared across the whole geometry,
//! and re-emits the triangles as indexed display lists. Index width per
//! attribute is promoted from 8 to 16 bits only when its pool outgrows a byte.

use glam::Vec3;

use crate::error::{Error, Result};
use crate::formats::basic::BasicGeometry;
use crate::formats::gc::{
    GcCorner, GcGeometry, GcMesh, GcMeshParam, GcPrimitive, GcPrimitiveKind, IndexAttributes,
    PARAM_BLEND_ALPHA, PARAM_INDEX_ATTRIBUTES, PARAM_TEXTURE,
};
use crate::formats::{Color, Geometry, NodeGraph, Uv};
use crate::math::BoundingSphere;

/// Corner cap per emitted display-list primitive. A primitive's corner count
/// is a u16 on disk; 65535 is the largest whole-triangle multiple that fits.
const MAX_PRIMITIVE_CORNERS: usize = 65535;

/// Convert every Basic geometry in `graph`, preserving node structure,
/// transforms, and geometry sharing. Non-Basic geometry is carried over
/// unchanged.
pub fn convert_graph(graph: &NodeGraph) -> Result<NodeGraph> {
    graph.try_map_geometries(|geometry| match geometry {
        Geometry::Basic(basic) => Ok(Geometry::Gc(convert_geometry(basic)?)),
        other => Ok(other.clone()),
    })
}

/// Convert one Basic geometry into its indexed GC equivalent.
pub fn convert_geometry(basic: &BasicGeometry) -> Result<GcGeometry> {
    let mut pools = AttributePools::default();
    let mut geometry = GcGeometry::new();

    for mesh in &basic.meshes {
        // Vertex colors and vertex normals are mutually exclusive on the GC
        // side. Colors win when the mesh carries them, or when the geometry
        // has no normals to fall back on.
        let use_colors = mesh.colors.is_some() || basic.normals.is_none();
        let has_uvs = mesh.uvs.is_some();

        let mut attributes = IndexAttributes::default();
        attributes.set(IndexAttributes::HAS_POSITION, true);
        attributes.set(IndexAttributes::HAS_COLOR, use_colors);
        attributes.set(IndexAttributes::HAS_NORMAL, !use_colors);
        attributes.set(IndexAttributes::HAS_UV, has_uvs);

        let mut corners = Vec::new();
        for triangle in mesh.to_triangles(basic.normals.as_deref()) {
            // The GC rasterizer winds the other way.
            for corner in [triangle[2], triangle[1], triangle[0]] {
                let position = basic
                    .vertices
                    .get(corner.vertex as usize)
                    .copied()
                    .unwrap_or(Vec3::ZERO);
                let mut indexed = GcCorner {
                    position: pools.positions.intern(position)?,
                    ..GcCorner::default()
                };
                if use_colors {
                    let color = corner.color.unwrap_or(Color::WHITE);
                    indexed.color = Some(pools.colors.intern(color)?);
                } else {
                    let normal = corner.normal.unwrap_or(Vec3::Y);
                    indexed.normal = Some(pools.normals.intern(normal)?);
                }
                if has_uvs {
                    indexed.uv = Some(pools.uvs.intern(corner.uv.unwrap_or_default())?);
                }
                corners.push(indexed);
            }
        }

        let material = basic.materials.get(mesh.material_id as usize);
        let texture_id = material.map_or(0, |material| material.texture_id());
        let use_alpha = material.is_some_and(|material| material.flags.use_alpha());

        let gc_mesh = GcMesh {
            params: vec![
                GcMeshParam {
                    kind: PARAM_INDEX_ATTRIBUTES,
                    value: attributes.0,
                },
                GcMeshParam {
                    kind: PARAM_TEXTURE,
                    value: texture_id,
                },
                GcMeshParam {
                    kind: PARAM_BLEND_ALPHA,
                    value: u32::from(use_alpha),
                },
            ],
            primitives: corners
                .chunks(MAX_PRIMITIVE_CORNERS)
                .map(|batch| GcPrimitive {
                    kind: GcPrimitiveKind::Triangles,
                    corners: batch.to_vec(),
                })
                .collect(),
        };
        if use_alpha {
            geometry.translucent_meshes.push(gc_mesh);
        } else {
            geometry.opaque_meshes.push(gc_mesh);
        }
    }

    promote_wide_indices(&mut geometry, &pools);

    geometry.bounds = BoundingSphere::from_points(&pools.positions.entries);
    geometry.positions = pools.positions.entries;
    geometry.normals = pools.normals.entries;
    geometry.colors = pools.colors.entries;
    geometry.uvs = pools.uvs.entries;

    tracing::debug!(
        positions = geometry.positions.len(),
        normals = geometry.normals.len(),
        colors = geometry.colors.len(),
        uvs = geometry.uvs.len(),
        opaque = geometry.opaque_meshes.len(),
        translucent = geometry.translucent_meshes.len(),
        "converted geometry"
    );
    Ok(geometry)
}

/// Any pool past 255 entries forces 16-bit indices on every mesh that
/// references the attribute.
fn promote_wide_indices(geometry: &mut GcGeometry, pools: &AttributePools) {
    let promotions = [
        (
            pools.positions.entries.len(),
            IndexAttributes::HAS_POSITION,
            IndexAttributes::POSITION_16BIT,
        ),
        (
            pools.normals.entries.len(),
            IndexAttributes::HAS_NORMAL,
            IndexAttributes::NORMAL_16BIT,
        ),
        (
            pools.colors.entries.len(),
            IndexAttributes::HAS_COLOR,
            IndexAttributes::COLOR_16BIT,
        ),
        (
            pools.uvs.entries.len(),
            IndexAttributes::HAS_UV,
            IndexAttributes::UV_16BIT,
        ),
    ];

    let meshes = geometry
        .opaque_meshes
        .iter_mut()
        .chain(geometry.translucent_meshes.iter_mut());
    for mesh in meshes {
        for param in &mut mesh.params {
            if param.kind != PARAM_INDEX_ATTRIBUTES {
                continue;
            }
            let mut attributes = IndexAttributes(param.value);
            for (len, has, wide) in promotions {
                if len > 255 && attributes.contains(has) {
                    attributes.set(wide, true);
                }
            }
            param.value = attributes.0;
        }
    }
}

#[derive(Default)]
struct AttributePools {
    positions: Pool<Vec3>,
    normals: Pool<Vec3>,
    colors: Pool<Color>,
    uvs: Pool<Uv>,
}

/// A linear first-occurrence-wins deduplication pool.
struct Pool<T> {
    entries: Vec<T>,
    attribute: &'static str,
}

impl Default for Pool<Vec3> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            attribute: "position",
        }
    }
}

impl Default for Pool<Color> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            attribute: "color",
        }
    }
}

impl Default for Pool<Uv> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            attribute: "uv",
        }
    }
}

impl<T: PartialEq + Copy> Pool<T> {
    fn intern(&mut self, value: T) -> Result<u16> {
        if let Some(index) = self.entries.iter().position(|entry| *entry == value) {
            return Ok(index as u16);
        }
        // The on-disk pool count is a u16, so 65535 entries is the ceiling.
        if self.entries.len() >= usize::from(u16::MAX) {
            return Err(Error::AttributePoolOverflow {
                attribute: self.attribute,
                count: self.entries.len() + 1,
            });
        }
        self.entries.push(value);
        Ok((self.entries.len() - 1) as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::basic::{Material, Mesh, Primitive, PrimitiveType};
    use crate::formats::node::Node;

    fn triangle_mesh(material_id: u16, indices: [u16; 3]) -> Mesh {
        Mesh {
            material_id,
            primitive_type: PrimitiveType::Triangles,
            primitives: vec![Primitive::Triangle(indices)],
            normals: None,
            colors: None,
            uvs: None,
        }
    }

    fn flat_geometry() -> BasicGeometry {
        let mut basic = BasicGeometry::new(false);
        basic.vertices = vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE];
        basic.materials = vec![Material::default()];
        basic
    }

    #[test]
    fn test_positions_dedup_across_meshes() {
        let mut basic = flat_geometry();
        basic.meshes = vec![triangle_mesh(0, [0, 1, 2]), triangle_mesh(0, [2, 1, 3])];
        let gc = convert_geometry(&basic).unwrap();
        // Six corners, four distinct positions.
        assert_eq!(gc.positions.len(), 4);
    }

    #[test]
    fn test_corner_order_reversed() {
        let mut basic = flat_geometry();
        basic.meshes = vec![triangle_mesh(0, [0, 1, 2])];
        let gc = convert_geometry(&basic).unwrap();
        let corners = &gc.opaque_meshes[0].primitives[0].corners;
        let positions: Vec<Vec3> = corners
            .iter()
            .map(|corner| gc.positions[corner.position as usize])
            .collect();
        assert_eq!(positions, vec![Vec3::Y, Vec3::X, Vec3::ZERO]);
    }

    #[test]
    fn test_colors_win_without_normals() {
        let mut basic = flat_geometry();
        basic.meshes = vec![triangle_mesh(0, [0, 1, 2])];
        let gc = convert_geometry(&basic).unwrap();
        let attributes = gc.opaque_meshes[0].index_attributes().unwrap();
        assert!(attributes.contains(IndexAttributes::HAS_COLOR));
        assert!(!attributes.contains(IndexAttributes::HAS_NORMAL));
        // Corners with no explicit color intern opaque white.
        assert_eq!(gc.colors, vec![Color::WHITE]);
    }

    #[test]
    fn test_normals_win_when_present_and_uncolored() {
        let mut basic = flat_geometry();
        basic.normals = Some(vec![Vec3::Z; 4]);
        basic.meshes = vec![triangle_mesh(0, [0, 1, 2])];
        let gc = convert_geometry(&basic).unwrap();
        let attributes = gc.opaque_meshes[0].index_attributes().unwrap();
        assert!(attributes.contains(IndexAttributes::HAS_NORMAL));
        assert!(!attributes.contains(IndexAttributes::HAS_COLOR));
        assert_eq!(gc.normals, vec![Vec3::Z]);
    }

    #[test]
    fn test_per_corner_colors_beat_normals() {
        let mut basic = flat_geometry();
        basic.normals = Some(vec![Vec3::Z; 4]);
        let mut mesh = triangle_mesh(0, [0, 1, 2]);
        mesh.colors = Some(vec![Color::new(255, 0, 0, 255); 3]);
        basic.meshes = vec![mesh];
        let gc = convert_geometry(&basic).unwrap();
        let attributes = gc.opaque_meshes[0].index_attributes().unwrap();
        assert!(attributes.contains(IndexAttributes::HAS_COLOR));
        assert!(gc.normals.is_empty());
    }

    /// A mesh touching `vertex_count` distinct positions as whole triangles.
    fn spread_geometry(vertex_count: u16) -> BasicGeometry {
        let mut basic = BasicGeometry::new(false);
        basic.vertices = (0..vertex_count)
            .map(|i| Vec3::new(f32::from(i), 0.0, 0.0))
            .collect();
        basic.materials = vec![Material::default()];
        let mut primitives: Vec<Primitive> = (0..vertex_count / 3)
            .map(|i| Primitive::Triangle([3 * i, 3 * i + 1, 3 * i + 2]))
            .collect();
        // Sweep up vertices the division by three left behind.
        for i in (vertex_count / 3) * 3..vertex_count {
            primitives.push(Primitive::Triangle([i, 0, 1]));
        }
        basic.meshes = vec![Mesh {
            material_id: 0,
            primitive_type: PrimitiveType::Triangles,
            primitives,
            normals: None,
            colors: None,
            uvs: None,
        }];
        basic
    }

    #[test]
    fn test_255_entry_pool_keeps_byte_indices() {
        let gc = convert_geometry(&spread_geometry(255)).unwrap();
        assert_eq!(gc.positions.len(), 255);
        let attributes = gc.opaque_meshes[0].index_attributes().unwrap();
        assert!(!attributes.contains(IndexAttributes::POSITION_16BIT));
    }

    #[test]
    fn test_256_entry_pool_promotes_to_16_bit() {
        let gc = convert_geometry(&spread_geometry(256)).unwrap();
        assert_eq!(gc.positions.len(), 256);
        let attributes = gc.opaque_meshes[0].index_attributes().unwrap();
        assert!(attributes.contains(IndexAttributes::POSITION_16BIT));
        // The color pool stayed tiny, so its indices stay narrow.
        assert!(!attributes.contains(IndexAttributes::COLOR_16BIT));
    }

    #[test]
    fn test_pool_caps_at_u16_count() {
        let mut pool = Pool::<Uv>::default();
        pool.entries = (0..u16::MAX).map(|u| Uv::new(u as i16, 0)).collect();
        // A value already pooled still resolves.
        assert_eq!(pool.intern(Uv::new(0, 0)).unwrap(), 0);
        // A 65536th distinct value would overflow the on-disk count field.
        let result = pool.intern(Uv::new(0, 1));
        assert!(matches!(
            result,
            Err(Error::AttributePoolOverflow {
                attribute: "uv",
                count: 65536,
            })
        ));
        assert_eq!(pool.entries.len(), usize::from(u16::MAX));
    }

    #[test]
    fn test_oversized_mesh_splits_display_list() {
        let mut basic = flat_geometry();
        // 21846 triangles make 65538 corners, past a u16 corner count.
        basic.meshes = vec![Mesh {
            material_id: 0,
            primitive_type: PrimitiveType::Triangles,
            primitives: vec![Primitive::Triangle([0, 1, 2]); 21846],
            normals: None,
            colors: None,
            uvs: None,
        }];
        let gc = convert_geometry(&basic).unwrap();
        let primitives = &gc.opaque_meshes[0].primitives;
        assert_eq!(primitives.len(), 2);
        assert_eq!(primitives[0].corners.len(), 65535);
        assert_eq!(primitives[1].corners.len(), 3);
    }

    #[test]
    fn test_translucent_routing_by_use_alpha() {
        let mut basic = flat_geometry();
        let mut translucent = Material::default();
        translucent.flags.set_use_alpha(true);
        basic.materials = vec![Material::default(), translucent];
        basic.meshes = vec![triangle_mesh(0, [0, 1, 2]), triangle_mesh(1, [1, 2, 3])];

        let gc = convert_geometry(&basic).unwrap();
        assert_eq!(gc.opaque_meshes.len(), 1);
        assert_eq!(gc.translucent_meshes.len(), 1);
    }

    #[test]
    fn test_convert_graph_keeps_sharing() {
        let mut basic = flat_geometry();
        basic.meshes = vec![triangle_mesh(0, [0, 1, 2])];

        let mut graph = NodeGraph::with_root(Node::new());
        let geometry = graph.add_geometry(Geometry::Basic(basic));
        let root = graph.root();
        let a = graph.add_node(Node::new());
        let b = graph.add_node(Node::new());
        graph.node_mut(a).geometry = Some(geometry);
        graph.node_mut(b).geometry = Some(geometry);
        graph.attach_child(root, a);
        graph.attach_child(root, b);

        let converted = convert_graph(&graph).unwrap();
        assert_eq!(converted.node_count(), 3);
        assert_eq!(converted.geometry_count(), 1);
        assert!(matches!(
            converted.geometry(converted.node(a).geometry.unwrap()),
            Geometry::Gc(_)
        ));
    }
}
