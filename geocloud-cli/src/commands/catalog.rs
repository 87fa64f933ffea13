//! Catalog command - list the configured layers.

use std::path::PathBuf;

use geocloud::layer::{Catalog, FlatSource, LayerDescriptor, Layout};

use super::common::load_catalog;
use crate::error::CliError;
use crate::runner::CliRunner;

pub fn run(runner: &CliRunner, catalog: Option<PathBuf>, json: bool) -> Result<i32, CliError> {
    let mut config = runner.config().clone();
    if let Some(path) = catalog {
        config = config.with_catalog(path);
    }
    let catalog = load_catalog(&config, &[])?;

    if json {
        let text = serde_json::to_string_pretty(catalog.layers())
            .map_err(|e| CliError::Output(e.to_string()))?;
        println!("{}", text);
        return Ok(0);
    }

    print_catalog(&catalog);
    Ok(0)
}

fn print_catalog(catalog: &Catalog) {
    println!("{:<30} {:<7} {:<19} SOURCE", "LAYER", "KIND", "LAYOUT");
    for layer in catalog.iter() {
        println!(
            "{:<30} {:<7} {:<19} {}",
            layer.name,
            layer.kind.to_string(),
            describe_layout(layer),
            layer.source_path.display()
        );
    }
}

fn describe_layout(layer: &LayerDescriptor) -> String {
    match &layer.layout {
        Layout::FlatMulti {
            sub_ids,
            source: FlatSource::SourceIds(_),
        } => format!("{} ({} ids)", layer.layout.label(), sub_ids.len()),
        Layout::FlatMulti { sub_ids, .. } => {
            format!("{} [{}]", layer.layout.label(), sub_ids.join(","))
        }
        Layout::Single | Layout::HierarchicalMulti => layer.layout.label().to_string(),
    }
}
