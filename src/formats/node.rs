//! Node hierarchies: the scene graph every model format hangs off.
//!
//! Nodes form a binary-ish tree on disk: each record points at an optional
//! geometry, an optional first child, and an optional next sibling. In memory
//! the graph is an arena of [`Node`]s and [`Geometry`]s addressed by plain
//! indices, so shared subtrees and shared geometry deserialize to a single
//! entry instead of duplicating.

use std::io::{Cursor, Read, Seek, Write};

use glam::{Mat4, Vec3};

use crate::error::{Error, Result};
use crate::formats::{Geometry, GeometryKind};
use crate::io::{Endian, OffsetReader, OffsetWriter};
use crate::math::Rotation3;

/// Size of one node record on disk.
pub const NODE_RECORD_SIZE: u64 = 52;

/// Cyclic offset graphs would otherwise recurse forever.
const MAX_NODE_DEPTH: usize = 512;

/// Index of a node in its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// Index of a geometry in its graph's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeometryId(usize);

/// The node flags word, preserved bit-exact.
///
/// Low bits control transform composition and traversal; the rest of the word
/// round-trips untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeFlags(pub u32);

impl NodeFlags {
    pub const IGNORE_TRANSLATION: u32 = 0x01;
    pub const IGNORE_ROTATION: u32 = 0x02;
    pub const IGNORE_SCALE: u32 = 0x04;
    pub const SKIP_DRAW: u32 = 0x08;
    pub const SKIP_CHILDREN: u32 = 0x10;
    pub const ROTATE_ZXY: u32 = 0x20;

    #[must_use]
    pub fn ignore_translation(&self) -> bool {
        self.0 & Self::IGNORE_TRANSLATION != 0
    }

    #[must_use]
    pub fn ignore_rotation(&self) -> bool {
        self.0 & Self::IGNORE_ROTATION != 0
    }

    #[must_use]
    pub fn ignore_scale(&self) -> bool {
        self.0 & Self::IGNORE_SCALE != 0
    }

    #[must_use]
    pub fn skip_draw(&self) -> bool {
        self.0 & Self::SKIP_DRAW != 0
    }

    #[must_use]
    pub fn skip_children(&self) -> bool {
        self.0 & Self::SKIP_CHILDREN != 0
    }

    #[must_use]
    pub fn rotate_zxy(&self) -> bool {
        self.0 & Self::ROTATE_ZXY != 0
    }

    pub fn set(&mut self, bit: u32, value: bool) {
        if value {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }
}

/// One element of a hierarchy.
///
/// Child and sibling links are owning in the tree sense; the parent link is a
/// back-reference kept consistent by the graph's attach methods. Siblings
/// share their predecessor's parent.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub flags: NodeFlags,
    pub translation: Vec3,
    pub rotation: Rotation3,
    pub scale: Vec3,
    pub geometry: Option<GeometryId>,
    child: Option<NodeId>,
    sibling: Option<NodeId>,
    parent: Option<NodeId>,
}

impl Node {
    pub fn new() -> Self {
        Self {
            flags: NodeFlags::default(),
            translation: Vec3::ZERO,
            rotation: Rotation3::ZERO,
            scale: Vec3::ONE,
            geometry: None,
            child: None,
            sibling: None,
            parent: None,
        }
    }

    #[must_use]
    pub fn child(&self) -> Option<NodeId> {
        self.child
    }

    #[must_use]
    pub fn sibling(&self) -> Option<NodeId> {
        self.sibling
    }

    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

/// An arena-backed node hierarchy with its attached geometry.
#[derive(Debug, Clone)]
pub struct NodeGraph {
    nodes: Vec<Node>,
    geometries: Vec<Geometry>,
    root: NodeId,
}

impl NodeGraph {
    pub fn with_root(root: Node) -> Self {
        Self {
            nodes: vec![root],
            geometries: Vec::new(),
            root: NodeId(0),
        }
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    #[must_use]
    pub fn geometry(&self, id: GeometryId) -> &Geometry {
        &self.geometries[id.0]
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn geometry_count(&self) -> usize {
        self.geometries.len()
    }

    pub fn geometries(&self) -> impl Iterator<Item = (GeometryId, &Geometry)> {
        self.geometries
            .iter()
            .enumerate()
            .map(|(index, geometry)| (GeometryId(index), geometry))
    }

    /// Add a detached node; link it with [`attach_child`](Self::attach_child)
    /// or [`attach_sibling`](Self::attach_sibling).
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryId {
        let id = GeometryId(self.geometries.len());
        self.geometries.push(geometry);
        id
    }

    /// Append `child` to the end of `parent`'s child chain.
    pub fn attach_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        match self.nodes[parent.0].child {
            None => self.nodes[parent.0].child = Some(child),
            Some(first) => {
                let mut last = first;
                while let Some(next) = self.nodes[last.0].sibling {
                    last = next;
                }
                self.nodes[last.0].sibling = Some(child);
            }
        }
    }

    /// Append `sibling` to the end of `node`'s sibling chain.
    ///
    /// The new sibling inherits `node`'s parent.
    pub fn attach_sibling(&mut self, node: NodeId, sibling: NodeId) {
        self.nodes[sibling.0].parent = self.nodes[node.0].parent;
        let mut last = node;
        while let Some(next) = self.nodes[last.0].sibling {
            last = next;
        }
        self.nodes[last.0].sibling = Some(sibling);
    }

    /// Depth-first traversal from the root: each node before its children,
    /// children before siblings.
    pub fn iter_depth_first(&self) -> impl Iterator<Item = NodeId> + '_ {
        let mut stack = vec![self.root];
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            let node = &self.nodes[id.0];
            if let Some(sibling) = node.sibling {
                stack.push(sibling);
            }
            if let Some(child) = node.child {
                stack.push(child);
            }
            Some(id)
        })
    }

    /// The node's transform relative to its parent.
    ///
    /// Built as identity, then scale unless ignored, then translation unless
    /// ignored, then rotation unless ignored. Rotation composes per-axis in
    /// XYZ order, or ZXY when the flag says so. Column vectors, so the result
    /// is `R * T * S`.
    #[must_use]
    pub fn local_transform(&self, id: NodeId) -> Mat4 {
        let node = &self.nodes[id.0];
        let mut matrix = Mat4::IDENTITY;
        if !node.flags.ignore_scale() {
            matrix = Mat4::from_scale(node.scale) * matrix;
        }
        if !node.flags.ignore_translation() {
            matrix = Mat4::from_translation(node.translation) * matrix;
        }
        if !node.flags.ignore_rotation() {
            let [x, y, z] = node.rotation.to_radians();
            let rotation = if node.flags.rotate_zxy() {
                Mat4::from_rotation_y(y) * Mat4::from_rotation_x(x) * Mat4::from_rotation_z(z)
            } else {
                Mat4::from_rotation_z(z) * Mat4::from_rotation_y(y) * Mat4::from_rotation_x(x)
            };
            matrix = rotation * matrix;
        }
        matrix
    }

    /// The node's transform in model space (every ancestor applied).
    #[must_use]
    pub fn world_transform(&self, id: NodeId) -> Mat4 {
        let local = self.local_transform(id);
        match self.nodes[id.0].parent {
            Some(parent) => self.world_transform(parent) * local,
            None => local,
        }
    }

    /// Deserialize a hierarchy rooted at the cursor.
    ///
    /// Children parse before siblings. Node and geometry references resolve
    /// through the reader's object cache, so a subtree or geometry reached
    /// through two offsets lands in the arena once.
    pub fn read<R: Read + Seek>(
        reader: &mut OffsetReader<R>,
        kind: GeometryKind,
    ) -> Result<Self> {
        let mut graph = Self {
            nodes: Vec::new(),
            geometries: Vec::new(),
            root: NodeId(0),
        };
        let root = read_node(reader, &mut graph, kind, None, 0)?;
        graph.root = root;
        Ok(graph)
    }

    /// Serialize the hierarchy, root record at the cursor.
    ///
    /// Geometry, child, and sibling references are scheduled on the writer's
    /// deferred queue; the caller flushes when the surrounding structure is
    /// complete. Null links are written as four zero bytes.
    pub fn write<'g, W: Write + Seek>(
        &'g self,
        writer: &mut OffsetWriter<'g, W>,
    ) -> Result<()> {
        write_node(self, writer, self.root)
    }

    /// Rebuild the graph with every geometry passed through `f`.
    ///
    /// Node structure and links are preserved; a geometry shared by several
    /// nodes maps once and stays shared.
    pub fn try_map_geometries<F>(&self, mut f: F) -> Result<Self>
    where
        F: FnMut(&Geometry) -> Result<Geometry>,
    {
        let geometries = self
            .geometries
            .iter()
            .map(&mut f)
            .collect::<Result<Vec<Geometry>>>()?;
        Ok(Self {
            nodes: self.nodes.clone(),
            geometries,
            root: self.root,
        })
    }

    /// Whether two graphs describe the same hierarchy: same flags, transforms,
    /// geometry content, and child/sibling shape. Arena ordering is irrelevant.
    #[must_use]
    pub fn structurally_equal(&self, other: &Self) -> bool {
        self.subtrees_equal(self.root, other, other.root)
    }

    fn subtrees_equal(&self, id: NodeId, other: &Self, other_id: NodeId) -> bool {
        let a = &self.nodes[id.0];
        let b = &other.nodes[other_id.0];
        if a.flags != b.flags
            || a.translation != b.translation
            || a.rotation != b.rotation
            || a.scale != b.scale
        {
            return false;
        }
        match (a.geometry, b.geometry) {
            (None, None) => {}
            (Some(ga), Some(gb)) => {
                if self.geometries[ga.0] != other.geometries[gb.0] {
                    return false;
                }
            }
            _ => return false,
        }
        let links_equal = |la: Option<NodeId>, lb: Option<NodeId>| match (la, lb) {
            (None, None) => Some(true),
            (Some(na), Some(nb)) => Some(self.subtrees_equal(na, other, nb)),
            _ => None,
        };
        matches!(links_equal(a.child, b.child), Some(true))
            && matches!(links_equal(a.sibling, b.sibling), Some(true))
    }
}

fn read_node<R: Read + Seek>(
    reader: &mut OffsetReader<R>,
    graph: &mut NodeGraph,
    kind: GeometryKind,
    parent: Option<NodeId>,
    depth: usize,
) -> Result<NodeId> {
    if depth > MAX_NODE_DEPTH {
        return Err(Error::RecursionLimitExceeded {
            limit: MAX_NODE_DEPTH,
        });
    }

    let flags = NodeFlags(reader.read_u32()?);
    let geometry = reader.read_offset_cached(|reader| {
        let geometry = Geometry::read(reader, kind)?;
        Ok(graph.add_geometry(geometry))
    })?;
    let translation = reader.read_vec3()?;
    let rotation = Rotation3::read(reader)?;
    let scale = reader.read_vec3()?;

    let id = graph.add_node(Node {
        flags,
        translation,
        rotation,
        scale,
        geometry,
        child: None,
        sibling: None,
        parent,
    });

    let child = reader
        .read_offset_cached(|reader| read_node(reader, &mut *graph, kind, Some(id), depth + 1))?;
    graph.nodes[id.0].child = child;

    let sibling = reader
        .read_offset_cached(|reader| read_node(reader, &mut *graph, kind, parent, depth + 1))?;
    graph.nodes[id.0].sibling = sibling;

    Ok(id)
}

fn write_node<'g, W: Write + Seek>(
    graph: &'g NodeGraph,
    writer: &mut OffsetWriter<'g, W>,
    id: NodeId,
) -> Result<()> {
    let node = graph.node(id);
    writer.write_u32(node.flags.0)?;
    match node.geometry {
        Some(geometry) => {
            writer.schedule_offset(move |writer| graph.geometry(geometry).write(writer))?;
        }
        None => writer.write_null_offset()?,
    }
    writer.write_vec3(node.translation)?;
    node.rotation.write(writer)?;
    writer.write_vec3(node.scale)?;
    match node.child() {
        Some(child) => {
            writer.schedule_offset(move |writer| write_node(graph, writer, child))?;
        }
        None => writer.write_null_offset()?,
    }
    match node.sibling() {
        Some(sibling) => {
            writer.schedule_offset(move |writer| write_node(graph, writer, sibling))?;
        }
        None => writer.write_null_offset()?,
    }
    Ok(())
}

/// Whether a well-formed hierarchy of the given format begins at
/// `base_offset + offset` in `data`.
///
/// A full parse over a private reader, so the probe cannot disturb an
/// in-flight read. Any failure anywhere in the subtree fails the probe.
#[must_use]
pub fn validate_node_at(
    data: &[u8],
    endian: Endian,
    base_offset: u64,
    offset: i32,
    kind: GeometryKind,
) -> bool {
    if offset <= 0 {
        return false;
    }
    let probe = || -> Result<()> {
        let mut reader = OffsetReader::new(Cursor::new(data), endian, base_offset)?;
        let target = base_offset + offset as u64;
        if target + NODE_RECORD_SIZE > reader.stream_len() {
            return Err(Error::MalformedOffset {
                offset,
                position: 0,
            });
        }
        reader.seek(target)?;
        NodeGraph::read(&mut reader, kind)?;
        Ok(())
    };
    probe().is_ok()
}

/// Scan `data` for the first 4-aligned offset at which a well-formed
/// hierarchy of the given format begins.
#[must_use]
pub fn scan_for_node(data: &[u8], endian: Endian, kind: GeometryKind) -> Option<u64> {
    let mut offset: i32 = 4;
    while (offset as u64) + NODE_RECORD_SIZE <= data.len() as u64 {
        if validate_node_at(data, endian, 0, offset, kind) {
            return Some(offset as u64);
        }
        offset = offset.checked_add(4)?;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(translation: Vec3) -> Node {
        Node {
            translation,
            ..Node::new()
        }
    }

    #[test]
    fn test_attach_child_and_sibling_links() {
        let mut graph = NodeGraph::with_root(Node::new());
        let root = graph.root();
        let a = graph.add_node(leaf(Vec3::X));
        let b = graph.add_node(leaf(Vec3::Y));
        let c = graph.add_node(leaf(Vec3::Z));
        graph.attach_child(root, a);
        graph.attach_child(root, b);
        graph.attach_sibling(b, c);

        assert_eq!(graph.node(root).child(), Some(a));
        assert_eq!(graph.node(a).sibling(), Some(b));
        assert_eq!(graph.node(b).sibling(), Some(c));
        // Siblings inherit the predecessor's parent.
        assert_eq!(graph.node(a).parent(), Some(root));
        assert_eq!(graph.node(b).parent(), Some(root));
        assert_eq!(graph.node(c).parent(), Some(root));
    }

    #[test]
    fn test_depth_first_order() {
        // root -> (a -> (a1), b)
        let mut graph = NodeGraph::with_root(Node::new());
        let root = graph.root();
        let a = graph.add_node(Node::new());
        let a1 = graph.add_node(Node::new());
        let b = graph.add_node(Node::new());
        graph.attach_child(root, a);
        graph.attach_child(a, a1);
        graph.attach_child(root, b);

        let order: Vec<NodeId> = graph.iter_depth_first().collect();
        assert_eq!(order, vec![root, a, a1, b]);
    }

    #[test]
    fn test_local_transform_scale_then_translate() {
        let graph = NodeGraph::with_root(Node {
            translation: Vec3::new(1.0, 2.0, 3.0),
            scale: Vec3::splat(2.0),
            ..Node::new()
        });
        let matrix = graph.local_transform(graph.root());
        let point = matrix.transform_point3(Vec3::ONE);
        // Scale first, translation second.
        assert!((point - Vec3::new(3.0, 4.0, 5.0)).length() < 1e-5);
    }

    #[test]
    fn test_local_transform_ignore_bits() {
        let mut node = Node {
            translation: Vec3::new(1.0, 2.0, 3.0),
            scale: Vec3::splat(2.0),
            ..Node::new()
        };
        node.flags.set(NodeFlags::IGNORE_TRANSLATION, true);
        node.flags.set(NodeFlags::IGNORE_SCALE, true);
        let graph = NodeGraph::with_root(node);
        assert_eq!(graph.local_transform(graph.root()), Mat4::IDENTITY);
    }

    #[test]
    fn test_rotation_order() {
        // 90 degrees about X then 90 about Y (XYZ order) maps +Z to +X.
        let node = Node {
            rotation: Rotation3::new(0x4000, 0x4000, 0),
            ..Node::new()
        };
        let graph = NodeGraph::with_root(node);
        let matrix = graph.local_transform(graph.root());
        let point = matrix.transform_point3(Vec3::Z);
        assert!((point - Vec3::X).length() < 1e-4);

        // ZXY order applies Y last, mapping +Z to -Y instead.
        let mut node = Node {
            rotation: Rotation3::new(0x4000, 0x4000, 0),
            ..Node::new()
        };
        node.flags.set(NodeFlags::ROTATE_ZXY, true);
        let graph = NodeGraph::with_root(node);
        let matrix = graph.local_transform(graph.root());
        let point = matrix.transform_point3(Vec3::Z);
        assert!((point - Vec3::new(0.0, -1.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_world_transform_parent_applied_second() {
        let mut graph = NodeGraph::with_root(Node {
            translation: Vec3::new(10.0, 0.0, 0.0),
            ..Node::new()
        });
        let root = graph.root();
        let child = graph.add_node(Node {
            translation: Vec3::new(0.0, 5.0, 0.0),
            ..Node::new()
        });
        graph.attach_child(root, child);

        let point = graph.world_transform(child).transform_point3(Vec3::ZERO);
        assert!((point - Vec3::new(10.0, 5.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_recursion_limit_on_cyclic_offsets() {
        // A record at offset 4 whose child offset points back at itself.
        let mut bytes = vec![0u8; 64];
        bytes[48..52].copy_from_slice(&4i32.to_le_bytes()); // child field at 4 + 44
        let mut reader =
            OffsetReader::new(Cursor::new(&bytes[..]), Endian::Little, 0).unwrap();
        reader.seek(4).unwrap();
        let result = NodeGraph::read(&mut reader, GeometryKind::Basic);
        assert!(matches!(
            result,
            Err(Error::RecursionLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_scan_for_node_finds_embedded_record() {
        // Garbage prefix, then an all-null record (a valid leaf node).
        let mut bytes = vec![0xFFu8; 4];
        bytes.extend_from_slice(&[0u8; 52]);
        assert_eq!(
            scan_for_node(&bytes, Endian::Little, GeometryKind::Basic),
            Some(4)
        );
        assert!(validate_node_at(
            &bytes,
            Endian::Little,
            0,
            4,
            GeometryKind::Basic
        ));
    }

    #[test]
    fn test_scan_for_node_rejects_garbage() {
        // Every candidate record holds a malformed geometry offset.
        let bytes = vec![0xABu8; 64];
        assert_eq!(
            scan_for_node(&bytes, Endian::Little, GeometryKind::Basic),
            None
        );
    }

    #[test]
    fn test_structural_equality_ignores_arena_order() {
        // Same shape built in two different insertion orders.
        let mut a = NodeGraph::with_root(Node::new());
        let a_child = a.add_node(leaf(Vec3::X));
        a.attach_child(a.root(), a_child);

        let mut b = NodeGraph::with_root(Node::new());
        let b_filler = b.add_node(leaf(Vec3::Y));
        let b_child = b.add_node(leaf(Vec3::X));
        b.attach_child(b.root(), b_child);
        let _ = b_filler; // occupies arena slot 1, never linked

        assert!(a.structurally_equal(&b));

        b.node_mut(b_child).translation = Vec3::Z;
        assert!(!a.structurally_equal(&b));
    }
}
