//! Error types for Gantry

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using GantryError
pub type Result<T> = std::result::Result<T, GantryError>;

/// Main error type for Gantry operations
#[derive(Debug, Error)]
pub enum GantryError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Task resolution errors
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Task resolution errors
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No root manifest in the project directory
    #[error("No package.json found in {0}")]
    NoManifest(PathBuf),

    /// Root manifest could not be parsed
    #[error("Failed to parse {path}: {message}")]
    InvalidManifest { path: PathBuf, message: String },

    /// A workspace glob could not be compiled
    #[error("Invalid workspace pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// None of the requested task names matched anything
    #[error("No tasks matched: {}", .0.join(", "))]
    NoTasks(Vec<String>),
}
