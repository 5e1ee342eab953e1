//! Loader configuration
//!
//! The numeric heuristics used while interpreting RWX text are content-tuned
//! values. They live here so hosts can override them without code changes.
//!
//! # Example Config File
//!
//! ```toml
//! handedness = "left"           # right (authoring space) or left
//! opposing_normal_dot = -0.001  # dot below which two face normals oppose
//! degenerate_normal_epsilon = 1e-8
//! matrix_noise_threshold = 1e-6
//! inverted_mask_substrings = ["_inv"]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RwxError};
use crate::material::MaskHeuristics;

/// Dot product below which two face normals at one vertex count as opposing
pub const DEFAULT_OPPOSING_NORMAL_DOT: f32 = -0.001;

/// Cross products shorter than this make a triangle degenerate for normals
pub const DEFAULT_DEGENERATE_NORMAL_EPSILON: f32 = 1e-8;

/// `transform` matrix components smaller than this are flushed to zero
pub const DEFAULT_MATRIX_NOISE_THRESHOLD: f32 = 1e-6;

/// Coordinate convention of the emitted scene
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    /// Authoring space, no conversion
    #[default]
    Right,
    /// Mirror X on matrices and positions, swap triangle winding
    Left,
}

impl std::fmt::Display for Handedness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Right => write!(f, "right"),
            Self::Left => write!(f, "left"),
        }
    }
}

impl std::str::FromStr for Handedness {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "right" | "rh" | "right-handed" => Ok(Self::Right),
            "left" | "lh" | "left-handed" => Ok(Self::Left),
            _ => Err(format!("Unknown handedness: {}", s)),
        }
    }
}

/// Interpreter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub handedness: Handedness,
    pub opposing_normal_dot: f32,
    pub degenerate_normal_epsilon: f32,
    pub matrix_noise_threshold: f32,
    /// Mask names containing any of these (case-insensitive) are inverted
    pub inverted_mask_substrings: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            handedness: Handedness::default(),
            opposing_normal_dot: DEFAULT_OPPOSING_NORMAL_DOT,
            degenerate_normal_epsilon: DEFAULT_DEGENERATE_NORMAL_EPSILON,
            matrix_noise_threshold: DEFAULT_MATRIX_NOISE_THRESHOLD,
            inverted_mask_substrings: Vec::new(),
        }
    }
}

impl LoaderConfig {
    /// Parse from TOML text; missing keys keep their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RwxError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        log::info!("Loaded loader config from {}", path.display());
        Ok(config)
    }

    pub fn mask_heuristics(&self) -> MaskHeuristics {
        MaskHeuristics {
            inverted_mask_substrings: self.inverted_mask_substrings.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handedness_parse() {
        assert_eq!("LEFT".parse::<Handedness>(), Ok(Handedness::Left));
        assert_eq!("rh".parse::<Handedness>(), Ok(Handedness::Right));
        assert!("up".parse::<Handedness>().is_err());
        assert_eq!(Handedness::Left.to_string(), "left");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LoaderConfig::from_toml_str(
            "handedness = \"left\"\ninverted_mask_substrings = [\"_inv\"]\n",
        )
        .unwrap();
        assert_eq!(config.handedness, Handedness::Left);
        assert_eq!(config.opposing_normal_dot, DEFAULT_OPPOSING_NORMAL_DOT);
        assert_eq!(config.mask_heuristics().inverted_mask_substrings, vec!["_inv"]);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            LoaderConfig::from_toml_str("handedness = \"sideways\""),
            Err(RwxError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            LoaderConfig::from_file("/nonexistent/rwx.toml"),
            Err(RwxError::Io { .. })
        ));
    }
}
