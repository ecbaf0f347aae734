//! Errors for execution.

use query_engine_translation::translation;
use thiserror::Error;

/// Errors raised by a storage provider or while serializing its results.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("no table for entity '{0}'")]
    NoSuchTable(String),
    #[error("a row of '{entity}' has no value for its primary key '{field}'")]
    MissingKey { entity: String, field: String },
    #[error("constraint violated on '{entity}': {message}")]
    ConstraintViolation { entity: String, message: String },
    #[error("no '{entity}' matches the query")]
    NotFound { entity: String },
    #[error("more than one '{entity}' matches the query")]
    MultipleRows { entity: String },
    #[error("no access: the new row of '{entity}' would not be visible to the requester")]
    WriteRejected { entity: String },
    #[error("cannot serialize '{entity}.{field}': {message}")]
    Serialization {
        entity: String,
        field: String,
        message: String,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

/// Everything that can go wrong with a request, from translation to the
/// response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error(transparent)]
    Translation(#[from] translation::error::Error),
    #[error(transparent)]
    Execution(#[from] Error),
}

impl RequestError {
    /// Is the request refused for lack of access, rather than invalid?
    pub fn is_permission_error(&self) -> bool {
        match self {
            RequestError::Translation(err) => {
                err.kind() == translation::error::ErrorKind::Permission
            }
            RequestError::Execution(err) => matches!(err, Error::WriteRejected { .. }),
        }
    }
}
