//! Inspector Configuration
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Command line: `rwx-inspect [--json] [--validate] [--left] [--config file.toml] model.rwx`
//! 2. Environment variables: `RWX_HANDEDNESS=left`, `RWX_OPPOSING_DOT=-0.01`,
//!    `RWX_INVERTED_MASKS=_inv,_neg`, `RWX_JSON=1`
//! 3. Config file: `--config <path>`, else `RWX_CONFIG`, else `rwx.toml` in the
//!    working directory when present
//! 4. Built-in defaults

use std::path::{Path, PathBuf};

use rwx_loader::{Handedness, LoaderConfig};

/// Output mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Indented node tree
    #[default]
    Text,
    /// Full model as JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Settings for one inspector run
#[derive(Debug, Clone, Default)]
pub struct InspectConfig {
    pub loader: LoaderConfig,
    pub format: OutputFormat,
    /// Run batch validation and report the result
    pub validate: bool,
    pub input: Option<PathBuf>,
    /// Loader config file that was applied
    pub config_path: Option<PathBuf>,
}

impl InspectConfig {
    /// Load from the process arguments and environment
    pub fn load() -> Result<Self, String> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Build from explicit arguments and an environment lookup
    pub fn from_sources(
        args: &[String],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, String> {
        let mut config = Self::default();

        // 1. Config file
        let explicit = args
            .iter()
            .position(|a| a == "--config")
            .map(|i| {
                args.get(i + 1)
                    .map(PathBuf::from)
                    .ok_or_else(|| "--config requires a path".to_string())
            })
            .transpose()?
            .or_else(|| env("RWX_CONFIG").filter(|p| !p.is_empty()).map(PathBuf::from));
        let candidate = explicit.or_else(|| {
            let local = PathBuf::from("rwx.toml");
            local.exists().then_some(local)
        });
        if let Some(path) = candidate {
            config.loader = load_loader_config(&path)?;
            config.config_path = Some(path);
        }

        // 2. Environment overrides
        if let Some(value) = env("RWX_HANDEDNESS") {
            config.loader.handedness = value.parse()?;
            log::info!("Handedness from env: {}", config.loader.handedness);
        }
        if let Some(value) = env("RWX_OPPOSING_DOT") {
            config.loader.opposing_normal_dot = value
                .parse()
                .map_err(|_| format!("Invalid RWX_OPPOSING_DOT: {}", value))?;
        }
        if let Some(value) = env("RWX_INVERTED_MASKS") {
            config.loader.inverted_mask_substrings = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if env("RWX_JSON").map(|v| v == "1" || v == "true").unwrap_or(false) {
            config.format = OutputFormat::Json;
        }

        // 3. Command line
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--json" => config.format = OutputFormat::Json,
                "--validate" => config.validate = true,
                "--left" => config.loader.handedness = Handedness::Left,
                "--config" => {
                    iter.next();
                }
                flag if flag.starts_with("--") => return Err(format!("Unknown flag: {}", flag)),
                path => {
                    if config.input.is_some() {
                        return Err(format!("Unexpected argument: {}", path));
                    }
                    config.input = Some(PathBuf::from(path));
                }
            }
        }

        Ok(config)
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        log::info!("Inspector configuration:");
        log::info!("  Input: {}", self.input.as_deref().map_or("-".into(), |p| p.display().to_string()));
        log::info!("  Output: {}", self.format);
        log::info!("  Handedness: {}", self.loader.handedness);
        log::info!("  Opposing normal dot: {}", self.loader.opposing_normal_dot);
        if let Some(path) = &self.config_path {
            log::info!("  Config file: {}", path.display());
        }
    }
}

fn load_loader_config(path: &Path) -> Result<LoaderConfig, String> {
    LoaderConfig::from_file(path).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_positional_and_flags() {
        let config = InspectConfig::from_sources(&args(&["--json", "tree.rwx", "--left"]), no_env).unwrap();
        assert_eq!(config.input, Some(PathBuf::from("tree.rwx")));
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.loader.handedness, Handedness::Left);
        assert!(!config.validate);
    }

    #[test]
    fn test_env_overrides() {
        let env = |key: &str| match key {
            "RWX_HANDEDNESS" => Some("left".to_string()),
            "RWX_OPPOSING_DOT" => Some("-0.25".to_string()),
            "RWX_INVERTED_MASKS" => Some("_inv, _neg,".to_string()),
            "RWX_JSON" => Some("1".to_string()),
            _ => None,
        };
        let config = InspectConfig::from_sources(&args(&["a.rwx"]), env).unwrap();
        assert_eq!(config.loader.handedness, Handedness::Left);
        assert_eq!(config.loader.opposing_normal_dot, -0.25);
        assert_eq!(config.loader.inverted_mask_substrings, vec!["_inv", "_neg"]);
        assert_eq!(config.format, OutputFormat::Json);
    }

    #[test]
    fn test_bad_arguments() {
        assert!(InspectConfig::from_sources(&args(&["--frobnicate"]), no_env).is_err());
        assert!(InspectConfig::from_sources(&args(&["a.rwx", "b.rwx"]), no_env).is_err());
        assert!(InspectConfig::from_sources(&args(&["--config"]), no_env).is_err());
        let env = |key: &str| (key == "RWX_HANDEDNESS").then(|| "up".to_string());
        assert!(InspectConfig::from_sources(&args(&[]), env).is_err());
    }

    #[test]
    fn test_missing_config_file() {
        let result = InspectConfig::from_sources(&args(&["--config", "/nonexistent/rwx.toml"]), no_env);
        assert!(result.is_err());
    }
}
