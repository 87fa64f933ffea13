//! Arguments and helpers shared by the run and plan commands.

use std::path::PathBuf;

use clap::Args;
use geocloud::config::RunConfig;
use geocloud::layer::Catalog;

use crate::error::CliError;

/// Where to read from, where to write to, and what to convert.
#[derive(Debug, Clone, Default, Args)]
pub struct SourceArgs {
    /// Root directory containing the source datasets
    #[arg(long, value_name = "DIR")]
    pub input_root: Option<PathBuf>,

    /// Root directory receiving converted files
    #[arg(long, value_name = "DIR")]
    pub output_root: Option<PathBuf>,

    /// JSON catalog to use instead of the built-in one
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Only process this layer (repeatable)
    #[arg(long = "layer", value_name = "NAME")]
    pub layers: Vec<String>,

    /// Maximum number of concurrent conversions
    #[arg(short, long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub jobs: Option<u32>,

    /// Conversion tool executable
    #[arg(long, value_name = "PROGRAM")]
    pub tool: Option<String>,
}

/// Applies CLI flags over `base` (defaults merged with the config file).
pub fn resolve_config(base: RunConfig, args: &SourceArgs) -> RunConfig {
    let mut config = base;
    if let Some(path) = &args.input_root {
        config = config.with_input_root(path);
    }
    if let Some(path) = &args.output_root {
        config = config.with_output_root(path);
    }
    if let Some(path) = &args.catalog {
        config = config.with_catalog(path);
    }
    if let Some(jobs) = args.jobs {
        config = config.with_max_concurrency(jobs as usize);
    }
    if let Some(tool) = &args.tool {
        config = config.with_tool(tool);
    }
    config
}

/// Loads the configured catalog and narrows it to `layers` if any are named.
pub fn load_catalog(config: &RunConfig, layers: &[String]) -> Result<Catalog, CliError> {
    let catalog = match &config.catalog {
        Some(path) => Catalog::from_json_file(path)?,
        None => Catalog::builtin(),
    };
    if layers.is_empty() {
        return Ok(catalog);
    }
    Ok(catalog.select(layers)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geocloud::error::ConfigurationError;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_flags_override_config() {
        let base = RunConfig::default()
            .with_input_root("/from/file")
            .with_max_concurrency(2);
        let args = SourceArgs {
            output_root: Some(PathBuf::from("/from/flag")),
            jobs: Some(6),
            ..Default::default()
        };

        let config = resolve_config(base, &args);

        assert_eq!(config.input_root, PathBuf::from("/from/file"));
        assert_eq!(config.output_root, PathBuf::from("/from/flag"));
        assert_eq!(config.max_concurrency, 6);
    }

    #[test]
    fn test_builtin_catalog_selection() {
        let config = RunConfig::default();
        let catalog = load_catalog(&config, &["mangrove".to_string()]).unwrap();
        assert_eq!(catalog.len(), 1);

        let err = load_catalog(&config, &["atlantis".to_string()]).unwrap_err();
        assert!(matches!(err, CliError::Config(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn test_catalog_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("layers.json");
        fs::write(
            &path,
            r#"[{"name": "dem", "source_path": "dem.tif", "kind": "raster", "layout": "single"}]"#,
        )
        .unwrap();

        let config = RunConfig::default().with_catalog(&path);
        let catalog = load_catalog(&config, &[]).unwrap();
        assert_eq!(catalog.len(), 1);
    }
}
