//! # RWX Loader
//!
//! Interpreter for the RWX scene description format: a line-oriented text
//! language of vertices, faces, material directives and nested clump and
//! transform scopes. The output is an engine-agnostic [`SceneNode`] tree whose
//! nodes carry self-contained [`MeshBatch`]es, one per run of faces sharing a
//! material.
//!
//! ## Pipeline
//!
//! - [`parser`] turns a line into a typed [`Command`]
//! - [`state`] applies commands to a [`ParseState`]: scope stacks, matrices,
//!   the clump-local vertex pool
//! - [`material`] tracks per-scope attributes and their [`MaterialSignature`]
//! - [`batcher`] triangulates faces and generates normals
//!
//! Malformed input never fails a load. Bad lines are skipped and problems
//! are counted in [`Diagnostics`].
//!
//! ## Example
//!
//! ```
//! use rwx_loader::RwxLoader;
//!
//! let text = "clumpbegin\nvertex 0 0 0\nvertex 1 0 0\nvertex 1 1 0\ntriangle 1 2 3\nclumpend\n";
//! let model = RwxLoader::default().load_str(text, "tri.rwx").unwrap();
//! let batch = &model.root.children[0].batches[0];
//! assert_eq!(batch.indices, vec![0, 1, 2]);
//! ```
//!
//! ## Incremental loading
//!
//! ```
//! use rwx_loader::RwxLoader;
//!
//! let text = "vertex 0 0 0\nvertex 1 0 0\nvertex 1 1 0\ntriangle 1 2 3\n";
//! let mut load = RwxLoader::default().begin(text, "tri.rwx").unwrap();
//! while !load.is_done() {
//!     load.advance(2);
//! }
//! assert_eq!(load.finish().root.triangle_count(), 1);
//! ```

pub mod batcher;
pub mod command;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod loader;
pub mod material;
pub mod parser;
pub mod scene;
pub mod state;
pub mod validator;

pub use command::{Command, CommandKind, Face, FaceKind, MaterialDirective, ScopeOp, TextureRef, TransformOp};
pub use config::{Handedness, LoaderConfig};
pub use diagnostics::Diagnostics;
pub use error::{Result, RwxError};
pub use loader::{IncrementalLoad, RwxLoader, RwxModel};
pub use material::{
    GeometrySampling, LightSampling, MaskHeuristics, MaterialMode, MaterialSignature,
    MaterialState, TextureAddressMode, TextureModes,
};
pub use parser::{parse_line, tokenize_line};
pub use scene::{BatchVertex, MeshBatch, SceneNode};
pub use state::{step, ParseState, StepOutcome};
pub use validator::{BatchValidator, ValidationResult};
