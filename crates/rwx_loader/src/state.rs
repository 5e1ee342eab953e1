//! Interpreter state
//!
//! [`ParseState`] holds everything one parse needs: the transform, joint and
//! material scope stacks, the clump-local vertex pool, the batch being built
//! and the stack of open scene nodes. Lines are applied one at a time through
//! [`ParseState::step`], so a host can spread a parse over as many calls as it
//! likes. [`ParseState::finish`] closes what is still open and yields the scene.

use rwx_math::{radians, Mat4, Transform, Vec2, Vec3};

use crate::batcher::{triangulate, BatchBuilder, VertexPool};
use crate::command::{CommandKind, Face, MaterialDirective, ScopeOp, TransformOp};
use crate::config::{Handedness, LoaderConfig};
use crate::diagnostics::Diagnostics;
use crate::material::{MaterialSignature, MaterialState};
use crate::parser::tokenize_line;
use crate::scene::SceneNode;

/// Result of feeding one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The command changed the state
    Applied,
    /// Empty or comment-only line
    Blank,
    /// Unknown keyword or malformed arguments; state untouched
    Ignored,
}

/// What an open clump saved from its parent
#[derive(Debug, Clone, PartialEq)]
struct ClumpFrame {
    parent_matrix: Mat4,
    parent_pool: VertexPool,
    parent_batch: Option<BatchBuilder>,
    transform_depth: usize,
    material_depth: usize,
}

/// Mutable interpreter state for one parse
#[derive(Debug, Clone, PartialEq)]
pub struct ParseState {
    config: LoaderConfig,

    matrix: Mat4,
    transform_stack: Vec<Mat4>,
    clump_stack: Vec<ClumpFrame>,

    joint: Mat4,
    joint_stack: Vec<Mat4>,

    material: MaterialState,
    material_stack: Vec<MaterialState>,
    signature: Option<MaterialSignature>,

    pool: VertexPool,
    batch: Option<BatchBuilder>,

    /// Root at index 0, innermost open clump last
    nodes: Vec<SceneNode>,
    clumps_opened: usize,

    transform_baked: bool,
    prototype_open: bool,
    instance_transform: Option<Mat4>,

    diagnostics: Diagnostics,
}

impl Default for ParseState {
    fn default() -> Self {
        Self::new(LoaderConfig::default())
    }
}

impl ParseState {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            matrix: Mat4::IDENTITY,
            transform_stack: Vec::new(),
            clump_stack: Vec::new(),
            joint: Mat4::IDENTITY,
            joint_stack: Vec::new(),
            material: MaterialState::default(),
            material_stack: Vec::new(),
            signature: None,
            pool: VertexPool::new(),
            batch: None,
            nodes: vec![SceneNode::new("root")],
            clumps_opened: 0,
            transform_baked: false,
            prototype_open: false,
            instance_transform: None,
            diagnostics: Diagnostics::default(),
        }
    }

    /// Interpret one line of text
    pub fn step(&mut self, line: &str) -> StepOutcome {
        match tokenize_line(line) {
            None => StepOutcome::Blank,
            Some(cmd) if cmd.kind == CommandKind::Unknown => StepOutcome::Ignored,
            Some(cmd) => {
                self.apply(&cmd.kind);
                StepOutcome::Applied
            }
        }
    }

    /// Apply an already parsed command
    pub fn apply(&mut self, kind: &CommandKind) {
        match kind {
            CommandKind::Vertex { position, uv } => {
                self.add_vertex(*position, uv.unwrap_or(Vec2::ZERO));
            }
            CommandKind::Face(face) => self.add_face(face),
            CommandKind::Material(directive) => self.apply_material(directive),
            CommandKind::Transform(op) => self.apply_transform(op),
            CommandKind::Scope(op) => self.apply_scope(*op),
            CommandKind::RotateJoint { axis, degrees } => {
                self.joint = self.joint * Mat4::from_axis_angle(*axis, radians(*degrees));
            }
            CommandKind::Unknown => {}
        }
    }

    /// Close open scopes and return the scene root
    pub fn finish(mut self) -> (SceneNode, Diagnostics) {
        while !self.clump_stack.is_empty() {
            self.diagnostics.auto_closed_clumps += 1;
            log::warn!("Closing clump left open at end of input");
            self.end_clump();
        }
        self.flush_batch();

        let root = self.nodes.swap_remove(0);
        (root, self.diagnostics)
    }

    // --- Collaborator hooks ---

    /// Whether a prototype definition is currently open
    pub fn is_prototype_open(&self) -> bool {
        self.prototype_open
    }

    pub fn set_prototype_open(&mut self, open: bool) {
        self.prototype_open = open;
    }

    /// The open clump's transform is already baked into its geometry
    pub fn mark_transform_baked(&mut self) {
        self.transform_baked = true;
    }

    pub fn is_transform_baked(&self) -> bool {
        self.transform_baked
    }

    /// Transform applied to every vertex until cleared
    pub fn set_instance_transform(&mut self, transform: Option<Mat4>) {
        self.instance_transform = transform;
    }

    pub fn instance_transform(&self) -> Option<&Mat4> {
        self.instance_transform.as_ref()
    }

    // --- Read-only views ---

    /// Active transform matrix
    pub fn transform(&self) -> &Mat4 {
        &self.matrix
    }

    /// Active joint matrix
    pub fn joint_matrix(&self) -> &Mat4 {
        &self.joint
    }

    /// Material at the top of the scope stack
    pub fn material(&self) -> &MaterialState {
        &self.material
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Number of open clumps
    pub fn clump_depth(&self) -> usize {
        self.clump_stack.len()
    }

    /// Vertices declared in the current clump
    pub fn vertex_count(&self) -> usize {
        self.pool.len()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    // --- Geometry ---

    fn add_vertex(&mut self, position: Vec3, uv: Vec2) {
        let position = match &self.instance_transform {
            Some(m) => m.transform_point(position),
            None => position,
        };
        self.pool.push(position, uv);
    }

    fn add_face(&mut self, face: &Face) {
        let Some(resolved) = self.pool.resolve(&face.indices) else {
            self.diagnostics.out_of_range_faces += 1;
            log::debug!(
                "Dropping face {:?} outside {} clump vertices",
                face.indices,
                self.pool.len()
            );
            return;
        };

        let (material, signature) = match face.tag {
            Some(tag) if tag != self.material.tag => {
                let material = MaterialState { tag, ..self.material.clone() };
                let signature = material.signature();
                (material, signature)
            }
            _ => (self.material.clone(), self.current_signature()),
        };

        if self.batch.as_ref().is_some_and(|b| *b.signature() != signature) {
            self.flush_batch();
        }
        let batch = self
            .batch
            .get_or_insert_with(|| BatchBuilder::new(material, signature));
        for triangle in triangulate(face.kind, &resolved) {
            batch.push_triangle(&self.pool, triangle);
        }
    }

    fn current_signature(&mut self) -> MaterialSignature {
        self.signature
            .get_or_insert_with(|| self.material.signature())
            .clone()
    }

    /// Finalize the in-progress batch onto the innermost open node
    fn flush_batch(&mut self) {
        let Some(batch) = self.batch.take() else {
            return;
        };
        if batch.is_empty() {
            return;
        }
        let (batch, stats) = batch.finish(&self.config);
        self.diagnostics.degenerate_triangles += stats.degenerate_triangles;
        if stats.duplicated {
            self.diagnostics.duplicated_batches += 1;
        }
        if let Some(node) = self.nodes.last_mut() {
            node.batches.push(batch);
        }
    }

    // --- Materials ---

    fn apply_material(&mut self, directive: &MaterialDirective) {
        self.material.apply(directive);
        self.signature = None;
    }

    fn push_material(&mut self) {
        self.material_stack.push(self.material.clone());
    }

    fn pop_material(&mut self) {
        if let Some(material) = self.material_stack.pop() {
            self.material = material;
            self.signature = None;
        }
    }

    // --- Transforms ---

    fn apply_transform(&mut self, op: &TransformOp) {
        match op {
            TransformOp::Translate(v) => self.matrix = self.matrix * Mat4::from_translation(*v),
            TransformOp::Rotate { axis, degrees } => {
                self.matrix = self.matrix * Mat4::from_axis_angle(*axis, radians(*degrees));
            }
            TransformOp::Scale(v) => self.matrix = self.matrix * Mat4::from_scale(*v),
            TransformOp::SetMatrix(values) => {
                let (matrix, sanitized) =
                    sanitize_matrix(values, self.config.matrix_noise_threshold);
                if sanitized > 0 {
                    log::debug!("Sanitized {} transform components", sanitized);
                    self.diagnostics.sanitized_matrix_components += sanitized;
                }
                self.matrix = matrix;
            }
            TransformOp::Identity => self.matrix = Mat4::IDENTITY,
        }
    }

    fn apply_scope(&mut self, op: ScopeOp) {
        match op {
            ScopeOp::ClumpBegin => self.begin_clump(),
            ScopeOp::ClumpEnd => {
                if self.clump_stack.is_empty() {
                    self.diagnostics.unmatched_scope_ends += 1;
                    log::warn!("clumpend without an open clump");
                } else {
                    self.end_clump();
                }
            }
            ScopeOp::TransformBegin => {
                self.transform_stack.push(self.matrix);
                self.push_material();
            }
            ScopeOp::TransformEnd => {
                let floor = self.clump_stack.last().map_or(0, |f| f.transform_depth);
                if self.transform_stack.len() > floor {
                    if let Some(matrix) = self.transform_stack.pop() {
                        self.matrix = matrix;
                    }
                    self.pop_material();
                } else {
                    self.diagnostics.unmatched_scope_ends += 1;
                    log::warn!("transformend without transformbegin, resetting to identity");
                    self.matrix = Mat4::IDENTITY;
                }
            }
            ScopeOp::JointBegin => self.joint_stack.push(self.joint),
            ScopeOp::JointEnd => match self.joint_stack.pop() {
                Some(joint) => self.joint = joint,
                None => {
                    self.diagnostics.unmatched_scope_ends += 1;
                    log::warn!("jointtransformend without jointtransformbegin");
                    self.joint = Mat4::IDENTITY;
                }
            },
            ScopeOp::IdentityJoint => self.joint = Mat4::IDENTITY,
        }
    }

    /// Convert a node-space matrix to the configured handedness
    fn to_output_space(&self, m: &Mat4) -> Mat4 {
        match self.config.handedness {
            Handedness::Right => *m,
            Handedness::Left => m.reflect_x(),
        }
    }

    fn begin_clump(&mut self) {
        self.clump_stack.push(ClumpFrame {
            parent_matrix: self.matrix,
            parent_pool: std::mem::take(&mut self.pool),
            parent_batch: self.batch.take(),
            transform_depth: self.transform_stack.len(),
            material_depth: self.material_stack.len(),
        });
        self.push_material();

        self.clumps_opened += 1;
        self.nodes.push(SceneNode::new(format!("clump_{}", self.clumps_opened)));
        self.transform_baked = false;
    }

    fn end_clump(&mut self) {
        self.flush_batch();

        let joint = (self.joint != Mat4::IDENTITY).then(|| self.to_output_space(&self.joint));
        if let Some(node) = self.nodes.last_mut() {
            node.joint = joint;
        }

        if !self.transform_baked {
            let matrix = self.to_output_space(&self.matrix);
            let (transform, issues) = Transform::decompose(&matrix);
            if issues.any_repaired() {
                self.diagnostics.repaired_matrices += 1;
                log::debug!("Repaired clump matrix during decomposition: {:?}", issues);
            }
            if let Some(node) = self.nodes.last_mut() {
                node.transform = transform;
            }
        }

        let Some(frame) = self.clump_stack.pop() else {
            return;
        };
        self.matrix = frame.parent_matrix;
        self.pool = frame.parent_pool;
        self.batch = frame.parent_batch;
        self.transform_stack.truncate(frame.transform_depth);
        self.material_stack.truncate(frame.material_depth + 1);
        self.pop_material();

        // The root is never popped: a frame exists for every clump node
        if self.nodes.len() > 1 {
            if let Some(node) = self.nodes.pop() {
                if let Some(parent) = self.nodes.last_mut() {
                    parent.children.push(node);
                }
            }
        }
        self.transform_baked = false;
    }
}

/// Feed one line, consuming and returning the state
pub fn step(mut state: ParseState, line: &str) -> ParseState {
    state.step(line);
    state
}

/// Build a matrix from 16 column-major values, flushing unstable components.
///
/// A zero homogeneous element becomes one; non-finite values and values with
/// magnitude below `threshold` become zero. Returns the number of changes.
pub fn sanitize_matrix(values: &[f32; 16], threshold: f32) -> (Mat4, usize) {
    let mut m = *values;
    let mut changed = 0;
    for v in m.iter_mut() {
        if !v.is_finite() || (*v != 0.0 && v.abs() < threshold) {
            *v = 0.0;
            changed += 1;
        }
    }
    if m[15] == 0.0 {
        m[15] = 1.0;
        changed += 1;
    }
    (Mat4::from_cols_array(&m), changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rwx_math::Quat;

    fn run(lines: &[&str]) -> ParseState {
        lines.iter().fold(ParseState::default(), |state, line| step(state, line))
    }

    fn triangle_lines() -> Vec<&'static str> {
        vec!["vertex 0 0 0", "vertex 1 0 0", "vertex 1 1 0", "triangle 1 2 3"]
    }

    #[test]
    fn test_step_outcomes() {
        let mut state = ParseState::default();
        assert_eq!(state.step("vertex 0 0 0"), StepOutcome::Applied);
        assert_eq!(state.step("  # nothing"), StepOutcome::Blank);
        assert_eq!(state.step("vertex 0 x 0"), StepOutcome::Ignored);
        assert_eq!(state.step("frobnicate"), StepOutcome::Ignored);
    }

    #[test]
    fn test_malformed_line_leaves_state_unchanged() {
        let mut state = run(&["clumpbegin", "color 1 0 0", "vertex 0 0 0", "vertex 1 0 0"]);
        let before = state.clone();
        for line in ["vertex 1 abc 0", "translate 1 2", "polygon 4 1 2 3", "materialmode triple"] {
            assert_eq!(state.step(line), StepOutcome::Ignored);
            assert_eq!(state, before);
        }
    }

    #[test]
    fn test_clump_local_indexing() {
        let mut lines = vec!["vertex 5 5 5", "vertex 6 6 6", "clumpbegin", "vertex 2 3 4"];
        lines.push("triangle 1 1 1");
        lines.push("clumpend");
        let (root, _) = run(&lines).finish();
        let batch = &root.children[0].batches[0];
        assert_eq!(batch.positions, vec![[2.0, 3.0, 4.0]]);
        assert_eq!(batch.indices, vec![0, 0, 0]);
    }

    #[test]
    fn test_parent_pool_restored_after_clump() {
        let (root, diagnostics) = run(&[
            "vertex 0 0 0",
            "vertex 1 0 0",
            "vertex 0 1 0",
            "clumpbegin",
            "vertex 9 9 9",
            "clumpend",
            "triangle 1 2 3",
        ])
        .finish();
        assert_eq!(root.batches.len(), 1);
        assert_eq!(root.batches[0].positions[1], [1.0, 0.0, 0.0]);
        assert_eq!(diagnostics.out_of_range_faces, 0);
    }

    #[test]
    fn test_out_of_range_face_dropped() {
        let (root, diagnostics) = run(&["vertex 0 0 0", "triangle 1 2 3", "triangle 0 1 1"]).finish();
        assert!(root.batches.is_empty());
        assert_eq!(diagnostics.out_of_range_faces, 2);
    }

    #[test]
    fn test_opacity_change_splits_batch() {
        let mut lines = triangle_lines();
        lines.push("opacity 0.5");
        lines.push("triangle 1 2 3");
        lines.push("opacity 0.5");
        lines.push("triangle 1 3 2");
        let (root, _) = run(&lines).finish();
        assert_eq!(root.batches.len(), 2);
        assert_eq!(root.batches[1].triangle_count(), 2);
        assert_eq!(root.batches[1].material.opacity, 0.5);
    }

    #[test]
    fn test_face_tag_override() {
        let (root, _) = run(&[
            "tag 3",
            "vertex 0 0 0",
            "vertex 1 0 0",
            "vertex 1 1 0",
            "triangle 1 2 3",
            "triangle 1 2 3 tag 3",
            "triangle 1 2 3 tag 9",
        ])
        .finish();
        let tags: Vec<_> = root.batches.iter().map(|b| (b.tag, b.triangle_count())).collect();
        assert_eq!(tags, vec![(3, 2), (9, 1)]);
    }

    #[test]
    fn test_clump_transform_decomposed() {
        let mut lines = vec!["clumpbegin", "translate 1 2 3", "rotate 0 1 0 90", "scale 2 2 2"];
        lines.extend(triangle_lines());
        lines.push("clumpend");
        let state = run(&lines);
        assert_eq!(*state.transform(), Mat4::IDENTITY);
        let (root, _) = state.finish();
        let t = root.children[0].transform;
        assert_relative_eq!(t.position.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(t.position.z, 3.0, epsilon = 1e-5);
        assert_relative_eq!(t.scale.y, 2.0, epsilon = 1e-5);
        let expected = Quat::from_axis_angle(Vec3::Y, radians(90.0));
        assert!(t.rotation.dot(expected).abs() > 0.9999);
    }

    #[test]
    fn test_clumpbegin_inherits_matrix() {
        let (root, _) = run(&["translate 5 0 0", "clumpbegin", "clumpend"]).finish();
        assert_eq!(root.children[0].transform.position, Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_baked_transform_not_reapplied() {
        let mut state = run(&["clumpbegin", "translate 4 0 0"]);
        state.mark_transform_baked();
        assert!(state.is_transform_baked());
        let state = step(state, "clumpend");
        assert!(!state.is_transform_baked());
        let (root, _) = state.finish();
        assert_eq!(root.children[0].transform, Transform::IDENTITY);
    }

    #[test]
    fn test_instance_transform_applies_to_vertices() {
        let mut state = ParseState::default();
        state.set_prototype_open(true);
        state.set_instance_transform(Some(Mat4::from_translation(Vec3::new(0.0, 10.0, 0.0))));
        for line in triangle_lines() {
            state.step(line);
        }
        assert!(state.is_prototype_open());
        let (root, _) = state.finish();
        assert_eq!(root.batches[0].positions[0], [0.0, 10.0, 0.0]);
    }

    #[test]
    fn test_unmatched_scope_ends() {
        let mut state = run(&["translate 1 0 0", "transformend", "clumpend", "jointtransformend"]);
        assert_eq!(*state.transform(), Mat4::IDENTITY);
        assert_eq!(state.diagnostics().unmatched_scope_ends, 3);
        assert_eq!(state.step("clumpend"), StepOutcome::Applied);
        let (root, _) = state.finish();
        assert!(root.children.is_empty());
    }

    #[test]
    fn test_transform_scope_restores_matrix_and_material() {
        let state = run(&[
            "translate 1 0 0",
            "transformbegin",
            "translate 0 5 0",
            "color 1 0 0",
            "transformend",
        ]);
        assert_eq!(state.transform().translation(), Vec3::new(1.0, 0.0, 0.0));
        assert!(!state.material().color_explicit);
    }

    #[test]
    fn test_material_scoped_to_clump() {
        let mut lines = vec!["color 0 1 0", "clumpbegin", "opacity 0.2"];
        lines.extend(triangle_lines());
        lines.push("clumpend");
        let state = run(&lines);
        assert_eq!(state.material().opacity, 1.0);
        let (root, _) = state.finish();
        assert_eq!(root.children[0].batches[0].material.effective_color(), [0.0, 1.0, 0.0, 0.2]);
    }

    #[test]
    fn test_unclosed_scopes_inside_clump_are_discarded() {
        let state = run(&["clumpbegin", "transformbegin", "color 1 0 0", "translate 1 0 0", "clumpend"]);
        assert_eq!(*state.transform(), Mat4::IDENTITY);
        assert!(!state.material().color_explicit);
        assert_eq!(state.clump_depth(), 0);
    }

    #[test]
    fn test_open_clumps_auto_closed() {
        let mut lines = vec!["clumpbegin", "clumpbegin"];
        lines.extend(triangle_lines());
        let (root, diagnostics) = run(&lines).finish();
        assert_eq!(diagnostics.auto_closed_clumps, 2);
        assert_eq!(root.children[0].name, "clump_1");
        assert_eq!(root.children[0].children[0].name, "clump_2");
        assert_eq!(root.children[0].children[0].batches.len(), 1);
    }

    #[test]
    fn test_joint_stack_independent() {
        let state = run(&["jointtransformbegin", "rotatejointtm 0 0 1 90", "translate 1 0 0"]);
        assert_ne!(*state.joint_matrix(), Mat4::IDENTITY);
        assert_eq!(state.transform().translation(), Vec3::new(1.0, 0.0, 0.0));
        let state = step(state, "jointtransformend");
        assert_eq!(*state.joint_matrix(), Mat4::IDENTITY);
        let state = run(&["rotatejointtm 1 0 0 45", "identityjoint"]);
        assert_eq!(*state.joint_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_joint_pose_recorded_on_node() {
        let (root, _) = run(&[
            "clumpbegin",
            "jointtransformbegin",
            "rotatejointtm 0 0 1 90",
            "clumpbegin",
            "clumpend",
            "jointtransformend",
            "clumpend",
        ])
        .finish();
        let outer = &root.children[0];
        let inner = &outer.children[0];
        assert!(outer.joint.is_none());
        let joint = inner.joint.expect("joint pose");
        let x = joint.transform_vector(Vec3::X);
        assert_relative_eq!(x.y, 1.0, epsilon = 1e-6);
        assert!(root.joint.is_none());
    }

    #[test]
    fn test_set_matrix_sanitized() {
        let state = run(&["transform 1 0 0 0 0 1 0 0 0 0 1 1e-9 3 4 5 0"]);
        let m = state.transform().to_cols_array();
        assert_eq!(m[11], 0.0);
        assert_eq!(m[15], 1.0);
        assert_eq!(state.transform().translation(), Vec3::new(3.0, 4.0, 5.0));
        assert_eq!(state.diagnostics().sanitized_matrix_components, 2);
    }

    #[test]
    fn test_sanitize_non_finite() {
        let mut values = Mat4::IDENTITY.to_cols_array();
        values[4] = f32::NAN;
        values[5] = f32::INFINITY;
        let (m, changed) = sanitize_matrix(&values, 1e-6);
        assert_eq!(changed, 2);
        assert!(m.is_finite());
    }

    #[test]
    fn test_left_handed_node_matrix() {
        let config = LoaderConfig { handedness: Handedness::Left, ..Default::default() };
        let state = ["clumpbegin", "translate 2 3 4", "clumpend"]
            .iter()
            .fold(ParseState::new(config), |s, line| step(s, line));
        let (root, _) = state.finish();
        assert_eq!(root.children[0].transform.position, Vec3::new(-2.0, 3.0, 4.0));
    }
}
