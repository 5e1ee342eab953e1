//! Counters for recovered input problems

use serde::{Deserialize, Serialize};

/// What the interpreter skipped, dropped or repaired during one parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Lines fed to the interpreter
    pub lines: usize,
    /// Unknown keywords and malformed arguments
    pub ignored_lines: usize,
    /// Faces referencing vertices outside the clump pool
    pub out_of_range_faces: usize,
    /// Zero-area triangles kept without a face normal
    pub degenerate_triangles: usize,
    /// `transform` components flushed to zero or forced to one
    pub sanitized_matrix_components: usize,
    /// Clump matrices that needed repair to decompose
    pub repaired_matrices: usize,
    /// Scope ends without a matching begin
    pub unmatched_scope_ends: usize,
    /// Clumps still open at end of input
    pub auto_closed_clumps: usize,
    /// Batches exported with per-face vertices
    pub duplicated_batches: usize,
}

impl Diagnostics {
    /// True when nothing had to be recovered
    pub fn is_clean(&self) -> bool {
        Self { lines: self.lines, duplicated_batches: self.duplicated_batches, ..Self::default() }
            == *self
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} lines, {} ignored, {} bad faces, {} degenerate triangles, \
             {} sanitized matrix values, {} repaired matrices, {} unmatched ends, \
             {} auto-closed clumps",
            self.lines,
            self.ignored_lines,
            self.out_of_range_faces,
            self.degenerate_triangles,
            self.sanitized_matrix_components,
            self.repaired_matrices,
            self.unmatched_scope_ends,
            self.auto_closed_clumps,
        )
    }
}
