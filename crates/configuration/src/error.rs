//! Errors that can be thrown when processing configuration.

use std::path::PathBuf;

use query_engine_metadata::metadata;
use query_engine_translation::translation;

/// The errors that can be thrown when parsing a configuration directory.
#[derive(Debug, thiserror::Error)]
pub enum ParseConfigurationError {
    #[error("parse error on {file_path}:{line}:{column}: {message}")]
    ParseError {
        file_path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },
    #[error("unsupported configuration version {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("I/O error: {0}")]
    IoErrorButStringified(String),
}

/// The errors that can be thrown when writing a configuration directory.
#[derive(Debug, thiserror::Error)]
pub enum WriteParsedConfigurationError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// The errors that can be thrown when turning a parsed configuration into a
/// runtime configuration. Nothing is served from a configuration that fails.
#[derive(Debug, thiserror::Error)]
pub enum MakeRuntimeConfigurationError {
    #[error("invalid entity declarations: {0}")]
    InvalidEntities(#[from] metadata::Error),
    #[error("invalid value for {variable}: {message}")]
    InvalidEnvironmentVariable { variable: String, message: String },
    #[error(transparent)]
    Environment(#[from] crate::environment::Error),
    #[error("permissions declared for unregistered entity '{0}'")]
    PermissionsForUnknownEntity(String),
    #[error("policy {index} of '{entity}': {error}")]
    InvalidPolicy {
        entity: String,
        index: usize,
        error: translation::error::Error,
    },
    #[error("base filter of '{entity}': {error}")]
    InvalidBaseFilter {
        entity: String,
        error: translation::error::Error,
    },
    #[error("custom queryset '{name}': {error}")]
    InvalidCustomQueryset {
        name: String,
        error: translation::error::Error,
    },
}
