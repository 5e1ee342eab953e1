//! Engine-agnostic scene graph produced by the interpreter
//!
//! A [`SceneNode`] tree mirrors the clump hierarchy of the source file. Every
//! node owns zero or more [`MeshBatch`]es whose indices point into the batch's
//! own vertex arrays.

use rwx_math::{Mat4, Transform, Vec3, AABB};
use serde::{Deserialize, Serialize};

use crate::material::{MaterialSignature, MaterialState};

/// Interleaved vertex for GPU upload
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BatchVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    /// Effective material color (RGBA)
    pub color: [f32; 4],
}

/// A triangle list sharing one material
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshBatch {
    pub positions: Vec<[f32; 3]>,
    /// Parallel to `positions`
    pub uvs: Vec<[f32; 2]>,
    /// Parallel to `positions`, unit length
    pub normals: Vec<[f32; 3]>,
    /// Triangle list into this batch's own vertices
    pub indices: Vec<u32>,
    /// Material snapshot taken at the first face
    pub material: MaterialState,
    pub signature: MaterialSignature,
    /// Face tag shared by every triangle in the batch
    pub tag: i32,
    pub bounds: AABB,
    /// Vertices were split per face for two-sided lighting
    pub duplicated: bool,
}

impl MeshBatch {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Triangles as index triples
    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    /// Interleaved vertex buffer, colored with the material's effective color
    pub fn interleaved(&self) -> Vec<BatchVertex> {
        let color = self.material.effective_color();
        self.positions
            .iter()
            .zip(&self.normals)
            .zip(&self.uvs)
            .map(|((&position, &normal), &uv)| BatchVertex { position, normal, uv, color })
            .collect()
    }

    /// Index buffer as raw bytes
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// Node in the output hierarchy
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    pub name: String,
    /// Local transform relative to the parent node
    pub transform: Transform,
    /// Joint pose active when the clump closed, if not identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joint: Option<Mat4>,
    pub children: Vec<SceneNode>,
    pub batches: Vec<MeshBatch>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::IDENTITY,
            joint: None,
            children: Vec::new(),
            batches: Vec::new(),
        }
    }

    /// Depth-first, pre-order traversal including `self`
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    /// Find a node by name in this subtree
    pub fn find(&self, name: &str) -> Option<&SceneNode> {
        self.walk().find(|node| node.name == name)
    }

    /// Number of nodes in this subtree, including `self`
    pub fn node_count(&self) -> usize {
        self.walk().count()
    }

    pub fn batch_count(&self) -> usize {
        self.walk().map(|node| node.batches.len()).sum()
    }

    pub fn vertex_count(&self) -> usize {
        self.walk()
            .flat_map(|node| &node.batches)
            .map(MeshBatch::vertex_count)
            .sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.walk()
            .flat_map(|node| &node.batches)
            .map(MeshBatch::triangle_count)
            .sum()
    }

    /// Batches in this subtree carrying `tag`
    pub fn batches_with_tag(&self, tag: i32) -> impl Iterator<Item = &MeshBatch> + '_ {
        self.walk()
            .flat_map(|node| &node.batches)
            .filter(move |batch| batch.tag == tag)
    }

    /// Bounds of this subtree in this node's space
    pub fn bounds(&self) -> AABB {
        let own = self
            .batches
            .iter()
            .fold(AABB::EMPTY, |acc, batch| acc.union(&batch.bounds));
        self.children.iter().fold(own, |acc, child| {
            let child_bounds = child.bounds();
            if child_bounds.is_empty() {
                return acc;
            }
            let m = child.transform.to_matrix();
            corners(&child_bounds)
                .into_iter()
                .fold(acc, |acc, corner| acc.expand_to_include(m.transform_point(corner)))
        })
    }
}

fn corners(b: &AABB) -> [Vec3; 8] {
    let (lo, hi) = (b.min, b.max);
    [
        Vec3::new(lo.x, lo.y, lo.z),
        Vec3::new(hi.x, lo.y, lo.z),
        Vec3::new(lo.x, hi.y, lo.z),
        Vec3::new(hi.x, hi.y, lo.z),
        Vec3::new(lo.x, lo.y, hi.z),
        Vec3::new(hi.x, lo.y, hi.z),
        Vec3::new(lo.x, hi.y, hi.z),
        Vec3::new(hi.x, hi.y, hi.z),
    ]
}

/// Pre-order iterator over a node subtree
pub struct Walk<'a> {
    stack: Vec<&'a SceneNode>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a SceneNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(tag: i32, positions: Vec<[f32; 3]>) -> MeshBatch {
        let material = MaterialState::default();
        let n = positions.len();
        MeshBatch {
            bounds: AABB::from_points(positions.iter().map(|&p| Vec3::from_array(p))),
            positions,
            uvs: vec![[0.0, 0.0]; n],
            normals: vec![[0.0, 0.0, 1.0]; n],
            indices: vec![0, 1, 2],
            signature: material.signature(),
            material,
            tag,
            duplicated: false,
        }
    }

    fn tree() -> SceneNode {
        let mut root = SceneNode::new("root");
        let mut a = SceneNode::new("clump_1");
        a.batches.push(batch(0, vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]));
        let mut b = SceneNode::new("clump_2");
        b.transform.position = Vec3::new(10.0, 0.0, 0.0);
        b.batches.push(batch(7, vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]));
        a.children.push(b);
        root.children.push(a);
        root.children.push(SceneNode::new("clump_3"));
        root
    }

    #[test]
    fn test_walk_is_preorder() {
        let names: Vec<_> = tree().walk().map(|n| n.name.clone()).collect();
        assert_eq!(names, ["root", "clump_1", "clump_2", "clump_3"]);
    }

    #[test]
    fn test_counts_and_lookup() {
        let root = tree();
        assert_eq!(root.node_count(), 4);
        assert_eq!(root.batch_count(), 2);
        assert_eq!(root.triangle_count(), 2);
        assert_eq!(root.vertex_count(), 6);
        assert_eq!(root.batches_with_tag(7).count(), 1);
        assert!(root.find("clump_2").is_some());
        assert!(root.find("missing").is_none());
    }

    #[test]
    fn test_bounds_follow_child_transforms() {
        let bounds = tree().bounds();
        assert_eq!(bounds.min, Vec3::ZERO);
        assert_eq!(bounds.max, Vec3::new(11.0, 1.0, 0.0));
    }

    #[test]
    fn test_interleaved_carries_color() {
        let mut b = batch(0, vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        b.material.opacity = 0.5;
        let verts = b.interleaved();
        assert_eq!(verts.len(), 3);
        assert_eq!(verts[1].position, [1.0, 0.0, 0.0]);
        assert_eq!(verts[2].color, [1.0, 1.0, 1.0, 0.5]);
        assert_eq!(bytemuck::cast_slice::<BatchVertex, u8>(&verts).len(), 3 * 48);
        assert_eq!(b.index_bytes().len(), 12);
    }
}
