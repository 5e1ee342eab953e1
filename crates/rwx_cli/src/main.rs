//! RWX Inspector
//!
//! Loads an `.rwx` file and prints its node tree, or dumps the whole
//! interpreted model as JSON.
//!
//! Run with: cargo run -p rwx_cli -- model.rwx
//!       or: cargo run --bin rwx-inspect -- --json --validate model.rwx

mod inspect_config;

use std::fmt::Write as _;

use rwx_loader::{BatchValidator, RwxLoader, RwxModel, SceneNode, ValidationResult};
use serde::Serialize;

use inspect_config::{InspectConfig, OutputFormat};

/// JSON report written in `--json` mode
#[derive(Serialize)]
struct Report<'a> {
    model: &'a RwxModel,
    #[serde(skip_serializing_if = "Option::is_none")]
    validation: Option<ValidationReport>,
}

#[derive(Serialize)]
struct ValidationReport {
    valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl From<&ValidationResult> for ValidationReport {
    fn from(result: &ValidationResult) -> Self {
        Self {
            valid: result.is_valid(),
            errors: result.errors.iter().map(|e| format!("{:?}", e)).collect(),
            warnings: result.warnings.clone(),
        }
    }
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).init();

    let config = match InspectConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("usage: rwx-inspect [--json] [--validate] [--left] [--config file.toml] <model.rwx>");
            std::process::exit(2);
        }
    };
    config.print_summary();

    if let Err(e) = run(&config) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(config: &InspectConfig) -> Result<(), Box<dyn std::error::Error>> {
    let input = config.input.as_ref().ok_or("No input file given")?;
    let model = RwxLoader::new(config.loader.clone()).load_file(input)?;
    let validation = config.validate.then(|| BatchValidator::new().validate(&model.root));

    match config.format {
        OutputFormat::Json => {
            let report = Report {
                model: &model,
                validation: validation.as_ref().map(ValidationReport::from),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => {
            print!("{}", render_tree(&model.root));
            println!("{}", model.diagnostics);
            if let Some(result) = &validation {
                print_validation(result);
            }
        }
    }

    if validation.is_some_and(|v| !v.is_valid()) {
        return Err("Validation failed".into());
    }
    Ok(())
}

/// Indented text rendering of a node tree
fn render_tree(root: &SceneNode) -> String {
    let mut out = String::new();
    render_node(root, 0, &mut out);
    out
}

fn render_node(node: &SceneNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let t = &node.transform;
    let _ = writeln!(
        out,
        "{}{} pos=({:.3}, {:.3}, {:.3}) scale=({:.3}, {:.3}, {:.3})",
        indent,
        node.name,
        t.position.x,
        t.position.y,
        t.position.z,
        t.scale.x,
        t.scale.y,
        t.scale.z,
    );
    for (i, batch) in node.batches.iter().enumerate() {
        let textures: Vec<&str> = batch.material.texture_names().collect();
        let _ = writeln!(
            out,
            "{}  [{}] {} vertices, {} triangles, tag {}, color {:?}{}{}",
            indent,
            i,
            batch.vertex_count(),
            batch.triangle_count(),
            batch.tag,
            batch.material.effective_color(),
            if textures.is_empty() { String::new() } else { format!(", textures {}", textures.join("/")) },
            if batch.duplicated { ", two-sided" } else { "" },
        );
    }
    for child in &node.children {
        render_node(child, depth + 1, out);
    }
}

fn print_validation(result: &ValidationResult) {
    let stats = &result.stats;
    println!(
        "validation: {} ({} nodes, {} batches, {} vertices, {} triangles)",
        if result.is_valid() { "ok" } else { "FAILED" },
        stats.node_count,
        stats.batch_count,
        stats.vertex_count,
        stats.triangle_count,
    );
    for error in &result.errors {
        println!("  error: {:?}", error);
    }
    for warning in &result.warnings {
        println!("  warning: {}", warning);
    }
}
