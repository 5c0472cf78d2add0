//! Error types for the image indexer.
//!
//! Provides a hierarchy of error types using `thiserror` for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors, detected before any file is touched.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Output transformer name is not one of the known shapes
    #[error("Unknown transformer \"{0}\" specified")]
    UnknownTransformer(String),
    /// Name pattern is not a valid regular expression
    #[error("Invalid name pattern \"{pattern}\": {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    /// Input glob could not be compiled
    #[error("Invalid glob \"{glob}\": {reason}")]
    InvalidGlob { glob: String, reason: String },
    /// Settings file could not be read or parsed
    #[error("Settings file {path}: {reason}")]
    SettingsFile { path: PathBuf, reason: String },
}

/// Failures raised while deriving an entry name.
#[derive(Error, Debug)]
pub enum NameTransformError {
    /// The pattern did not match the file name
    #[error("Name pattern \"{pattern}\" does not match \"{input}\"")]
    NoMatch { pattern: String, input: String },
    /// A caller-supplied transformer failed
    #[error(transparent)]
    Custom(#[from] anyhow::Error),
}

/// Main error type for the converter.
///
/// Every failure of a run is converted to this type before it reaches the
/// caller's error hook.
#[derive(Error, Debug)]
pub enum ConverterError {
    /// Options could not be resolved
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The optimization step failed
    #[error("Optimization error: {0}")]
    Optimization(String),

    /// An entry name could not be derived
    #[error("Name transform error: {0}")]
    NameTransform(#[from] NameTransformError),

    /// No MIME type is known for the file
    #[error("Unknown MIME type for {}", .0.display())]
    UnknownMimeType(PathBuf),

    /// The output document could not be encoded or written
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Convenience result type for converter operations.
pub type ConverterResult<T> = Result<T, ConverterError>;

// Helper methods for error creation
impl ConverterError {
    pub fn optimization<T: Into<String>>(msg: T) -> Self {
        Self::Optimization(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        Self::Serialization(msg.into())
    }

    /// Whether the error was raised before any I/O took place.
    pub fn is_preflight(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl ConfigError {
    pub fn invalid_glob(glob: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidGlob {
            glob: glob.into(),
            reason: reason.to_string(),
        }
    }

    pub fn settings_file(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::SettingsFile {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
