//! Batch validation
//!
//! Checks emitted batches before they are handed to a renderer:
//! - Index bounds and triangle-list shape
//! - Parallel attribute array lengths
//! - Finite positions and unit normals
//! - Degenerate triangles (reported as warnings, they are kept on purpose)

use rwx_math::Vec3;

use crate::scene::{MeshBatch, SceneNode};

/// Validation error types
#[derive(Clone, Debug, PartialEq)]
pub enum BatchValidationError {
    /// Batch without triangles
    EmptyBatch { node: String, batch_index: usize },
    /// Index count not a multiple of 3
    InvalidIndexCount { node: String, batch_index: usize, index_count: usize },
    /// UV or normal array does not match the position array
    AttributeLengthMismatch {
        node: String,
        batch_index: usize,
        positions: usize,
        uvs: usize,
        normals: usize,
    },
    /// Index references a vertex outside the batch
    IndexOutOfBounds {
        node: String,
        batch_index: usize,
        index_value: u32,
        vertex_count: usize,
    },
    /// Position or normal contains NaN or infinity
    NonFiniteVertex { node: String, batch_index: usize, vertex_index: usize },
    /// Normal is not unit length
    InvalidNormal {
        node: String,
        batch_index: usize,
        vertex_index: usize,
        normal: [f32; 3],
    },
}

/// Validation options
#[derive(Clone, Debug)]
pub struct ValidationOptions {
    /// Report zero-area triangles as warnings
    pub check_degenerate_triangles: bool,
    pub check_normals: bool,
    /// Minimum area for a non-degenerate triangle
    pub min_triangle_area: f32,
    /// Allowed deviation of a normal's squared length from 1
    pub normal_tolerance: f32,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            check_degenerate_triangles: true,
            check_normals: true,
            min_triangle_area: 1e-10,
            normal_tolerance: 0.01,
        }
    }
}

/// Scene validation result
#[derive(Clone, Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<BatchValidationError>,
    /// Non-fatal issues
    pub warnings: Vec<String>,
    pub stats: SceneStats,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Scene statistics
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneStats {
    pub node_count: usize,
    pub batch_count: usize,
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub degenerate_triangle_count: usize,
    pub duplicated_batch_count: usize,
}

/// Batch validator
pub struct BatchValidator {
    options: ValidationOptions,
}

impl BatchValidator {
    pub fn new() -> Self {
        Self { options: ValidationOptions::default() }
    }

    pub fn with_options(options: ValidationOptions) -> Self {
        Self { options }
    }

    /// Validate every batch in a scene tree
    pub fn validate(&self, root: &SceneNode) -> ValidationResult {
        let mut result = ValidationResult::default();
        for node in root.walk() {
            result.stats.node_count += 1;
            for (batch_index, batch) in node.batches.iter().enumerate() {
                self.validate_batch(&node.name, batch_index, batch, &mut result);
            }
        }
        result
    }

    /// Validate a single batch, appending to `result`
    pub fn validate_batch(
        &self,
        node: &str,
        batch_index: usize,
        batch: &MeshBatch,
        result: &mut ValidationResult,
    ) {
        let stats = &mut result.stats;
        stats.batch_count += 1;
        stats.vertex_count += batch.vertex_count();
        stats.triangle_count += batch.triangle_count();
        if batch.duplicated {
            stats.duplicated_batch_count += 1;
        }

        if batch.indices.is_empty() {
            result.errors.push(BatchValidationError::EmptyBatch {
                node: node.to_string(),
                batch_index,
            });
            return;
        }

        if batch.indices.len() % 3 != 0 {
            result.errors.push(BatchValidationError::InvalidIndexCount {
                node: node.to_string(),
                batch_index,
                index_count: batch.indices.len(),
            });
        }

        let vertex_count = batch.positions.len();
        if batch.uvs.len() != vertex_count || batch.normals.len() != vertex_count {
            result.errors.push(BatchValidationError::AttributeLengthMismatch {
                node: node.to_string(),
                batch_index,
                positions: vertex_count,
                uvs: batch.uvs.len(),
                normals: batch.normals.len(),
            });
            return;
        }

        for &index in &batch.indices {
            if index as usize >= vertex_count {
                result.errors.push(BatchValidationError::IndexOutOfBounds {
                    node: node.to_string(),
                    batch_index,
                    index_value: index,
                    vertex_count,
                });
            }
        }

        for (vertex_index, (position, normal)) in
            batch.positions.iter().zip(&batch.normals).enumerate()
        {
            if position.iter().chain(normal).any(|v| !v.is_finite()) {
                result.errors.push(BatchValidationError::NonFiniteVertex {
                    node: node.to_string(),
                    batch_index,
                    vertex_index,
                });
                continue;
            }
            if self.options.check_normals {
                let len_sq = Vec3::from_array(*normal).length_squared();
                if (len_sq - 1.0).abs() > self.options.normal_tolerance {
                    result.errors.push(BatchValidationError::InvalidNormal {
                        node: node.to_string(),
                        batch_index,
                        vertex_index,
                        normal: *normal,
                    });
                }
            }
        }

        if self.options.check_degenerate_triangles {
            let degenerate = batch
                .triangles()
                .filter(|tri| tri.iter().all(|&i| (i as usize) < vertex_count))
                .filter(|tri| {
                    let [a, b, c] = tri.map(|i| Vec3::from_array(batch.positions[i as usize]));
                    is_degenerate_triangle(a, b, c, self.options.min_triangle_area)
                })
                .count();
            if degenerate > 0 {
                result.stats.degenerate_triangle_count += degenerate;
                result.warnings.push(format!(
                    "Node {} batch {}: {} degenerate triangle(s)",
                    node, batch_index, degenerate
                ));
            }
        }
    }
}

impl Default for BatchValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if a triangle has zero or near-zero area
pub fn is_degenerate_triangle(v0: Vec3, v1: Vec3, v2: Vec3, min_area: f32) -> bool {
    let area_sq = (v1 - v0).cross(v2 - v0).length_squared() * 0.25;
    !(area_sq >= min_area * min_area)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::MaterialState;
    use rwx_math::AABB;

    fn triangle_batch() -> MeshBatch {
        let material = MaterialState::default();
        let positions = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        MeshBatch {
            bounds: AABB::from_points(positions.iter().map(|&p| Vec3::from_array(p))),
            positions,
            uvs: vec![[0.0, 0.0]; 3],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            indices: vec![0, 1, 2],
            signature: material.signature(),
            material,
            tag: 0,
            duplicated: false,
        }
    }

    fn scene_with(batch: MeshBatch) -> SceneNode {
        let mut root = SceneNode::new("root");
        let mut child = SceneNode::new("clump_1");
        child.batches.push(batch);
        root.children.push(child);
        root
    }

    #[test]
    fn test_valid_triangle() {
        let result = BatchValidator::new().validate(&scene_with(triangle_batch()));
        assert!(result.is_valid(), "{:?}", result.errors);
        assert_eq!(result.stats.node_count, 2);
        assert_eq!(result.stats.triangle_count, 1);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_out_of_bounds_index() {
        let mut batch = triangle_batch();
        batch.indices = vec![0, 1, 5];
        let result = BatchValidator::new().validate(&scene_with(batch));
        assert!(matches!(
            result.errors[0],
            BatchValidationError::IndexOutOfBounds { index_value: 5, vertex_count: 3, .. }
        ));
    }

    #[test]
    fn test_bad_normal_and_lengths() {
        let mut batch = triangle_batch();
        batch.normals[1] = [0.0, 0.0, 0.0];
        let result = BatchValidator::new().validate(&scene_with(batch));
        assert!(matches!(
            result.errors[0],
            BatchValidationError::InvalidNormal { vertex_index: 1, .. }
        ));

        let mut batch = triangle_batch();
        batch.uvs.pop();
        let result = BatchValidator::new().validate(&scene_with(batch));
        assert!(matches!(
            result.errors[0],
            BatchValidationError::AttributeLengthMismatch { uvs: 2, .. }
        ));
    }

    #[test]
    fn test_degenerate_is_warning() {
        let mut batch = triangle_batch();
        batch.positions[2] = [2.0, 0.0, 0.0];
        let result = BatchValidator::new().validate(&scene_with(batch));
        assert!(result.is_valid());
        assert_eq!(result.stats.degenerate_triangle_count, 1);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_empty_batch() {
        let mut batch = triangle_batch();
        batch.indices.clear();
        let result = BatchValidator::new().validate(&scene_with(batch));
        assert!(matches!(result.errors[0], BatchValidationError::EmptyBatch { .. }));
    }
}
