//! # Error Types
//!
//! Failures that can surface from configuration loading and terrain
//! persistence. Numeric settings never fail; they are clamped.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or checking configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The TOML document is malformed or has wrongly typed fields.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be written back out.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Structurally invalid configuration.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while saving or loading terrain.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// File operations failed.
    #[error("terrain file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The JSON document is malformed.
    #[error("terrain document is malformed: {0}")]
    Json(#[from] serde_json::Error),

    /// The compressed block is corrupt.
    #[error("terrain data failed to decompress: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),

    /// The document was written by an incompatible format version.
    #[error("unsupported terrain format version {found} (expected {expected})")]
    Version {
        /// Version stored in the document.
        found: u32,
        /// Version this build reads.
        expected: u32,
    },

    /// The stored configuration is invalid.
    #[error("stored configuration rejected: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;
