//! RWX loader front end
//!
//! [`RwxLoader`] turns a whole buffer into an [`RwxModel`] in one call.
//! [`IncrementalLoad`] does the same work in bounded slices so a host can
//! spread a large model over several frames.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::LoaderConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{Result, RwxError};
use crate::scene::{MeshBatch, SceneNode};
use crate::state::{ParseState, StepOutcome};
use crate::validator::{BatchValidator, ValidationResult};

/// Interpreted model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RwxModel {
    /// Asset path, for reporting
    pub path: String,
    pub root: SceneNode,
    pub diagnostics: Diagnostics,
}

impl RwxModel {
    /// Every batch in the scene, depth-first
    pub fn batches(&self) -> impl Iterator<Item = &MeshBatch> + '_ {
        self.root.walk().flat_map(|node| &node.batches)
    }

    /// Check every emitted batch
    pub fn validate(&self) -> ValidationResult {
        BatchValidator::new().validate(&self.root)
    }
}

/// Whole-buffer loader
#[derive(Clone, Debug, Default)]
pub struct RwxLoader {
    config: LoaderConfig,
}

impl RwxLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load a model from file bytes
    pub fn load(&self, data: &[u8], path: &str) -> Result<RwxModel> {
        let text = std::str::from_utf8(data).map_err(|source| RwxError::InvalidUtf8 {
            path: path.to_string(),
            source,
        })?;
        self.load_str(text, path)
    }

    /// Load a model from text
    pub fn load_str(&self, text: &str, path: &str) -> Result<RwxModel> {
        let mut load = self.begin(text, path)?;
        load.advance(usize::MAX);
        Ok(load.finish())
    }

    /// Read and load a file from disk
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<RwxModel> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let data = std::fs::read(path).map_err(|source| RwxError::Io {
            path: name.clone(),
            source,
        })?;
        self.load(&data, &name)
    }

    /// Start an incremental load over `text`
    pub fn begin(&self, text: &str, path: &str) -> Result<IncrementalLoad> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        if text.trim().is_empty() {
            return Err(RwxError::EmptyInput(path.to_string()));
        }
        Ok(IncrementalLoad::new(text.to_string(), path, self.config.clone()))
    }
}

/// A load that advances a bounded number of lines per call
#[derive(Debug, Clone)]
pub struct IncrementalLoad {
    path: String,
    text: String,
    cursor: usize,
    state: ParseState,
    lines: usize,
    ignored: usize,
}

impl IncrementalLoad {
    pub fn new(text: String, path: &str, config: LoaderConfig) -> Self {
        Self {
            path: path.to_string(),
            text,
            cursor: 0,
            state: ParseState::new(config),
            lines: 0,
            ignored: 0,
        }
    }

    /// Interpret up to `max_lines` lines. Returns how many were consumed.
    pub fn advance(&mut self, max_lines: usize) -> usize {
        let mut consumed = 0;
        while consumed < max_lines && !self.is_done() {
            let rest = &self.text[self.cursor..];
            let (line, advance) = match rest.find('\n') {
                Some(end) => (&rest[..end], end + 1),
                None => (rest, rest.len()),
            };
            let line = line.strip_suffix('\r').unwrap_or(line);

            if self.state.step(line) == StepOutcome::Ignored {
                self.ignored += 1;
            }
            self.cursor += advance;
            self.lines += 1;
            consumed += 1;
        }
        consumed
    }

    pub fn is_done(&self) -> bool {
        self.cursor >= self.text.len()
    }

    /// Fraction of input bytes consumed
    pub fn progress(&self) -> f32 {
        if self.text.is_empty() {
            1.0
        } else {
            self.cursor as f32 / self.text.len() as f32
        }
    }

    /// Interpreter state so far
    pub fn state(&self) -> &ParseState {
        &self.state
    }

    /// Interpret whatever is left and produce the model
    pub fn finish(mut self) -> RwxModel {
        self.advance(usize::MAX);
        let (root, mut diagnostics) = self.state.finish();
        diagnostics.lines = self.lines;
        diagnostics.ignored_lines = self.ignored;

        log::info!(
            "Loaded {}: {} nodes, {} batches, {} triangles",
            self.path,
            root.node_count(),
            root.batch_count(),
            root.triangle_count()
        );
        if !diagnostics.is_clean() {
            log::warn!("Recovered problems in {}: {}", self.path, diagnostics);
        }

        RwxModel { path: self.path, root, diagnostics }
    }
}
