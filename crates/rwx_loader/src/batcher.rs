//! Geometry batching
//!
//! Vertices accumulate in a clump-local [`VertexPool`] addressed by the 1-based
//! indices authored in the file. Faces are fan-triangulated into a
//! [`BatchBuilder`], which copies only the pool vertices it references so each
//! finished [`MeshBatch`] is self-contained. Normals are generated when the
//! batch is finalized.

use std::collections::HashMap;

use rwx_math::{Vec2, Vec3, AABB};

use crate::command::FaceKind;
use crate::config::{Handedness, LoaderConfig};
use crate::material::{MaterialSignature, MaterialState};
use crate::scene::MeshBatch;

/// Fallback normal for vertices without a usable face normal
pub const UP: Vec3 = Vec3::Y;

/// A vertex as declared in the file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolVertex {
    pub position: Vec3,
    pub uv: Vec2,
}

/// Clump-local vertex list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexPool {
    vertices: Vec<PoolVertex>,
}

impl VertexPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a vertex and return its 1-based index
    pub fn push(&mut self, position: Vec3, uv: Vec2) -> u32 {
        self.vertices.push(PoolVertex { position, uv });
        self.vertices.len() as u32
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertex at a 0-based offset
    pub fn get(&self, index: usize) -> Option<&PoolVertex> {
        self.vertices.get(index)
    }

    /// Convert authored 1-based indices to 0-based offsets.
    ///
    /// Returns `None` if any index falls outside the pool.
    pub fn resolve(&self, indices: &[u32]) -> Option<Vec<u32>> {
        indices
            .iter()
            .map(|&i| i.checked_sub(1).filter(|&i| (i as usize) < self.len()))
            .collect()
    }
}

/// Fan triangulation of an n-gon: `[0,i,i+1]` for `i` in `1..n-1`
pub fn fan(n: usize) -> impl Iterator<Item = [usize; 3]> {
    (1..n.saturating_sub(1)).map(|i| [0, i, i + 1])
}

/// Triangles for a face of the given shape over `indices`
pub fn triangulate(kind: FaceKind, indices: &[u32]) -> Vec<[u32; 3]> {
    let corners = match kind {
        FaceKind::Triangle => indices.len().min(3),
        FaceKind::Quad => indices.len().min(4),
        FaceKind::Polygon => indices.len(),
    };
    fan(corners)
        .map(|[a, b, c]| [indices[a], indices[b], indices[c]])
        .collect()
}

/// Counters produced while finalizing a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FinishStats {
    pub degenerate_triangles: usize,
    pub duplicated: bool,
}

/// In-progress batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchBuilder {
    material: MaterialState,
    signature: MaterialSignature,
    /// Pool offset to batch-local index
    remap: HashMap<u32, u32>,
    positions: Vec<Vec3>,
    uvs: Vec<Vec2>,
    indices: Vec<u32>,
}

impl BatchBuilder {
    /// Start a batch with a material snapshot
    pub fn new(material: MaterialState, signature: MaterialSignature) -> Self {
        Self {
            material,
            signature,
            remap: HashMap::new(),
            positions: Vec::new(),
            uvs: Vec::new(),
            indices: Vec::new(),
        }
    }

    pub fn signature(&self) -> &MaterialSignature {
        &self.signature
    }

    pub fn material(&self) -> &MaterialState {
        &self.material
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Add a triangle of 0-based pool offsets; offsets must be in range
    pub fn push_triangle(&mut self, pool: &VertexPool, triangle: [u32; 3]) {
        for offset in triangle {
            let index = match self.remap.get(&offset) {
                Some(&index) => index,
                None => {
                    let vertex = pool.get(offset as usize).copied().unwrap_or(PoolVertex {
                        position: Vec3::ZERO,
                        uv: Vec2::ZERO,
                    });
                    let index = self.positions.len() as u32;
                    self.positions.push(vertex.position);
                    self.uvs.push(vertex.uv);
                    self.remap.insert(offset, index);
                    index
                }
            };
            self.indices.push(index);
        }
    }

    /// Finalize into an immutable batch with normals
    pub fn finish(self, config: &LoaderConfig) -> (MeshBatch, FinishStats) {
        let Self { material, signature, mut positions, uvs, mut indices, .. } = self;

        if config.handedness == Handedness::Left {
            for p in &mut positions {
                p.x = -p.x;
            }
            for tri in indices.chunks_exact_mut(3) {
                tri.swap(1, 2);
            }
        }

        let face_normals: Vec<Option<Vec3>> = indices
            .chunks_exact(3)
            .map(|tri| {
                let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| positions[i as usize]);
                (b - a).cross(c - a).try_normalize(config.degenerate_normal_epsilon)
            })
            .collect();
        let degenerate_triangles = face_normals.iter().filter(|n| n.is_none()).count();

        let mut buckets: Vec<Vec<Vec3>> = vec![Vec::new(); positions.len()];
        for (tri, normal) in indices.chunks_exact(3).zip(&face_normals) {
            if let Some(normal) = normal {
                for &i in tri {
                    buckets[i as usize].push(*normal);
                }
            }
        }

        let duplicated = material.is_double_sided()
            && buckets.iter().any(|b| has_opposing(b, config.opposing_normal_dot));

        let (positions, uvs, normals, indices) = if duplicated {
            let mut out_positions = Vec::with_capacity(indices.len());
            let mut out_uvs = Vec::with_capacity(indices.len());
            let mut out_normals = Vec::with_capacity(indices.len());
            for (tri, normal) in indices.chunks_exact(3).zip(&face_normals) {
                let normal = normal.unwrap_or(UP);
                for &i in tri {
                    out_positions.push(positions[i as usize]);
                    out_uvs.push(uvs[i as usize]);
                    out_normals.push(normal);
                }
            }
            let out_indices: Vec<u32> = (0..out_positions.len() as u32).collect();
            (out_positions, out_uvs, out_normals, out_indices)
        } else {
            let normals: Vec<Vec3> = buckets
                .iter()
                .map(|bucket| smooth_normal(bucket, config.degenerate_normal_epsilon))
                .collect();
            (positions, uvs, normals, indices)
        };

        let batch = MeshBatch {
            bounds: AABB::from_points(positions.iter().copied()),
            positions: positions.iter().map(|p| p.to_array()).collect(),
            uvs: uvs.iter().map(|uv| uv.to_array()).collect(),
            normals: normals.iter().map(|n| n.to_array()).collect(),
            indices,
            tag: material.tag,
            material,
            signature,
            duplicated,
        };
        (batch, FinishStats { degenerate_triangles, duplicated })
    }
}

/// Whether any two normals in a vertex bucket point away from each other
fn has_opposing(bucket: &[Vec3], threshold: f32) -> bool {
    bucket
        .iter()
        .enumerate()
        .any(|(i, a)| bucket[i + 1..].iter().any(|b| a.dot(*b) < threshold))
}

/// Hemisphere-aligned average of face normals
fn smooth_normal(bucket: &[Vec3], epsilon: f32) -> Vec3 {
    let sum = bucket.iter().fold(Vec3::ZERO, |acc, &n| {
        if acc.dot(n) < 0.0 {
            acc - n
        } else {
            acc + n
        }
    });
    sum.try_normalize(epsilon).unwrap_or(UP)
}
