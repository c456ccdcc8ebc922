//! Application configuration for markbatch.
//!
//! User config lives at `~/.markbatch/markbatch.toml`.
//! CLI flags (and their environment variables) override config file values,
//! which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MarkbatchError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "markbatch.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".markbatch";

// ---------------------------------------------------------------------------
// Config structs (matching markbatch.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Row store settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Object store settings.
    #[serde(default)]
    pub object_store: ObjectStoreConfig,

    /// Content filter settings.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Logging defaults.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database holding the `files` table.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

fn default_database_path() -> String {
    "var/markbatch.db".into()
}

/// `[object_store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStoreConfig {
    /// Scheme prefix of location strings (`gs` for `gs://bucket/path`).
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Local directory that holds one subdirectory per container.
    #[serde(default = "default_store_root")]
    pub root: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            root: default_store_root(),
        }
    }
}

fn default_scheme() -> String {
    "gs".into()
}
fn default_store_root() -> String {
    "var/objects".into()
}

/// `[filter]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Reject documents the HTML parser reported errors for.
    /// Off by default: malformed markup is converted best-effort.
    #[serde(default)]
    pub strict_parsing: bool,
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when neither `RUST_LOG` nor `-v` is given.
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
    "info".into()
}

impl AppConfig {
    /// Check that every value the batch depends on is present.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.database.path.trim().is_empty() {
            missing.push("database.path");
        }
        if self.object_store.root.trim().is_empty() {
            missing.push("object_store.root");
        }
        if self.object_store.scheme.trim().is_empty() {
            missing.push("object_store.scheme");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(MarkbatchError::config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Processor config (runtime, immutable)
// ---------------------------------------------------------------------------

/// Runtime settings threaded into the per-file processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Location scheme, without `://`.
    pub scheme: String,
    /// Whether parse errors fail the cleaning stage.
    pub strict_parsing: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ProcessorConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            scheme: config.object_store.scheme.clone(),
            strict_parsing: config.filter.strict_parsing,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.markbatch/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MarkbatchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.markbatch/markbatch.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MarkbatchError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        MarkbatchError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let path = config_file_path()?;
    init_config_at(&path)?;
    Ok(path)
}

/// Write a default config file to `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| MarkbatchError::io(dir, e))?;
    }

    let content = AppConfig::default().to_toml()?;

    std::fs::write(path, content).map_err(|e| MarkbatchError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(())
}

impl AppConfig {
    /// Render as pretty TOML (used by `config init` and `config show`).
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| MarkbatchError::config(e.to_string()))
    }
}
