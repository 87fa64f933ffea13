//! Run configuration.
//!
//! Settings come from three places, highest precedence first:
//!
//! 1. command-line flags (applied by the CLI through the `with_*` builders)
//! 2. an INI file (`~/.geocloud/config.ini` or `--config PATH`)
//! 3. built-in defaults
//!
//! ```text
//! [paths]
//! input_root = /usr/src/app/data
//! output_root = /usr/src/app/output
//! catalog = /etc/geocloud/layers.json
//!
//! [run]
//! max_concurrency = 8
//! tool = gdal
//! ```

use std::path::{Path, PathBuf};

use ini::Ini;
use tracing::debug;

use crate::convert::DEFAULT_TOOL;
use crate::error::ConfigurationError;
use crate::executor::{default_concurrency, MIN_PERMITS};

/// Default root containing the source datasets.
pub const DEFAULT_INPUT_ROOT: &str = "/usr/src/app/data";

/// Default root receiving converted files.
pub const DEFAULT_OUTPUT_ROOT: &str = "/usr/src/app/output";

/// Everything a run needs besides the catalog itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub max_concurrency: usize,
    pub tool: String,
    /// JSON catalog replacing the built-in one.
    pub catalog: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from(DEFAULT_INPUT_ROOT),
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            max_concurrency: default_concurrency(),
            tool: DEFAULT_TOOL.to_string(),
            catalog: None,
        }
    }
}

impl RunConfig {
    pub fn with_input_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_root = path.into();
        self
    }

    pub fn with_output_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_root = path.into();
        self
    }

    /// Sets the concurrency budget; values below one are clamped to one.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(MIN_PERMITS);
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    pub fn with_catalog(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog = Some(path.into());
        self
    }

    /// Applies every value present in `file` on top of this config.
    pub fn merge_file(mut self, file: &ConfigFile) -> Self {
        if let Some(path) = &file.input_root {
            self.input_root = path.clone();
        }
        if let Some(path) = &file.output_root {
            self.output_root = path.clone();
        }
        if let Some(path) = &file.catalog {
            self.catalog = Some(path.clone());
        }
        if let Some(max) = file.max_concurrency {
            self = self.with_max_concurrency(max);
        }
        if let Some(tool) = &file.tool {
            self.tool = tool.clone();
        }
        self
    }
}

/// Values read from an INI config file. Absent keys stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub input_root: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub max_concurrency: Option<usize>,
    pub tool: Option<String>,
}

impl ConfigFile {
    /// `~/.geocloud/config.ini`, if a home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".geocloud").join("config.ini"))
    }

    /// Loads the default file, or an empty config if it does not exist.
    pub fn load_default() -> Result<Self, ConfigurationError> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Loads and validates `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigurationError::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let file = Self::from_ini(&ini)?;
        debug!(path = %path.display(), ?file, "Loaded config file");
        Ok(file)
    }

    /// Parses INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigurationError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigurationError::ConfigFile {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigurationError> {
        let get = |section: &str, key: &str| -> Option<String> {
            ini.section(Some(section))
                .and_then(|props| props.get(key))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let max_concurrency = match get("run", "max_concurrency") {
            Some(raw) => Some(parse_concurrency("run.max_concurrency", &raw)?),
            None => None,
        };

        Ok(Self {
            input_root: get("paths", "input_root").map(PathBuf::from),
            output_root: get("paths", "output_root").map(PathBuf::from),
            catalog: get("paths", "catalog").map(PathBuf::from),
            max_concurrency,
            tool: get("run", "tool"),
        })
    }
}

/// Parses a positive concurrency value.
pub fn parse_concurrency(key: &str, raw: &str) -> Result<usize, ConfigurationError> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(ConfigurationError::InvalidValue {
            key: key.to_string(),
            reason: "must be at least 1".to_string(),
        }),
        Ok(n) => Ok(n),
        Err(e) => Err(ConfigurationError::InvalidValue {
            key: key.to_string(),
            reason: format!("'{}' is not a number: {}", raw.trim(), e),
        }),
    }
}
