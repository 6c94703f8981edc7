//! Configuration loading and store settings resolution
//!
//! Resolution priority for every setting:
//! 1. Command-line argument (clap, which also reads the `MLENS_*` environment variables)
//! 2. TOML config file
//! 3. Compiled default
//!
//! A missing default config file is not an error: a warning is logged and
//! defaults apply. A config file named explicitly on the command line must exist.

use crate::db::validate_identifier;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_STORE_URI: &str = "sqlite://./data";
pub const DEFAULT_DATABASE: &str = "movielens";
pub const DEFAULT_BATCH_SIZE: usize = 5000;
pub const DEFAULT_DATA_DIR: &str = "data/ml-latest-small";
pub const DEFAULT_OUT_DIR: &str = "features";

const SQLITE_SCHEME: &str = "sqlite://";
const SQLITE_MEMORY: &str = "sqlite::memory:";

/// Contents of `config.toml`
///
/// Every field is optional; absent values fall through to compiled defaults.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub store: StoreSection,
    #[serde(default)]
    pub ingest: IngestSection,
    #[serde(default)]
    pub features: FeaturesSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[store]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreSection {
    pub uri: Option<String>,
    pub database: Option<String>,
    pub batch_size: Option<usize>,
}

/// `[ingest]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct IngestSection {
    pub data_dir: Option<PathBuf>,
}

/// `[features]` section
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FeaturesSection {
    pub out_dir: Option<PathBuf>,
    pub limit: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Read and parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Load an explicitly named config file, or fall back to the default location
    ///
    /// A missing default file logs a warning and yields the defaults; a
    /// missing explicit file is an error.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            let config = Self::load(path)?;
            info!("Loaded configuration from {}", path.display());
            return Ok(config);
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                let config = Self::load(&path)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Some(path) => {
                warn!(
                    "No config file at {}, using built-in defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                warn!("Could not determine config directory, using built-in defaults");
                Ok(Self::default())
            }
        }
    }
}

/// Default config file location: `<config_dir>/mlens/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mlens").join("config.toml"))
}

/// Store connection settings shared by both binaries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// `sqlite://<directory>` or `sqlite::memory:`
    pub uri: String,
    /// Database name; the file is `<directory>/<database>.db`
    pub database: String,
    /// Maximum documents per bulk write
    pub batch_size: usize,
}

/// Where the store lives on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// Command-line overrides for store settings
#[derive(Debug, Clone, Default)]
pub struct StoreOverrides {
    pub uri: Option<String>,
    pub database: Option<String>,
    pub batch_size: Option<usize>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_STORE_URI.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl StoreConfig {
    /// Merge CLI overrides, TOML values and defaults (in that priority)
    pub fn resolve(overrides: &StoreOverrides, toml: &StoreSection) -> Self {
        Self {
            uri: overrides
                .uri
                .clone()
                .or_else(|| toml.uri.clone())
                .unwrap_or_else(|| DEFAULT_STORE_URI.to_string()),
            database: overrides
                .database
                .clone()
                .or_else(|| toml.database.clone())
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            batch_size: overrides
                .batch_size
                .or(toml.batch_size)
                .unwrap_or(DEFAULT_BATCH_SIZE),
        }
    }

    /// In-memory store, used by tests and dry runs
    pub fn in_memory() -> Self {
        Self {
            uri: SQLITE_MEMORY.to_string(),
            ..Self::default()
        }
    }

    /// Reject settings no component can run with
    pub fn validate(&self) -> Result<()> {
        self.location()?;
        validate_identifier(&self.database)
            .map_err(|_| Error::Config(format!("Invalid database name: '{}'", self.database)))?;
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// Resolve the URI + database name into a concrete location
    pub fn location(&self) -> Result<StoreLocation> {
        if self.uri == SQLITE_MEMORY {
            return Ok(StoreLocation::Memory);
        }
        match self.uri.strip_prefix(SQLITE_SCHEME) {
            Some(dir) if !dir.is_empty() => Ok(StoreLocation::File(
                Path::new(dir).join(format!("{}.db", self.database)),
            )),
            _ => Err(Error::Config(format!(
                "Unsupported store URI '{}' (expected {}<directory> or {})",
                self.uri, SQLITE_SCHEME, SQLITE_MEMORY
            ))),
        }
    }
}
