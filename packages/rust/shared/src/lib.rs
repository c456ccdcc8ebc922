//! Shared types, error model, and configuration for markbatch.
//!
//! This crate is the foundation depended on by all other markbatch crates.
//! It provides:
//! - [`MarkbatchError`]: the unified error type
//! - Domain types ([`FileRecord`], [`FileStatus`])
//! - Configuration ([`AppConfig`], [`ProcessorConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DatabaseConfig, FilterConfig, LoggingConfig, ObjectStoreConfig, ProcessorConfig,
    config_dir, config_file_path, init_config, init_config_at, load_config, load_config_from,
};
pub use error::{MarkbatchError, Result};
pub use types::{FileRecord, FileStatus};
