//! Errors for translation.

use std::fmt;

use query_engine_metadata::metadata::{self, Lookup, ScalarType};
use query_engine_predicate::predicate::ast::AggregateFunction;
use thiserror::Error;

use crate::request::Action;

/// Where in the request an error was found, e.g. `ast.children[1].child`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLocation(String);

impl NodeLocation {
    /// The root of the query tree.
    pub fn ast() -> Self {
        NodeLocation("ast".to_string())
    }

    pub fn root(name: &str) -> Self {
        NodeLocation(name.to_string())
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Self {
        NodeLocation(format!("{}.{name}", self.0))
    }

    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        NodeLocation(format!("{}[{index}]", self.0))
    }

    #[must_use]
    pub fn key(&self, key: &str) -> Self {
        NodeLocation(format!("{}[{key:?}]", self.0))
    }
}

impl fmt::Display for NodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A type for translation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("{location}: no such entity '{entity}'")]
    EntityNotFound {
        location: NodeLocation,
        entity: String,
    },
    #[error("{location}: entity '{entity}' has no field '{field}'")]
    FieldNotFound {
        location: NodeLocation,
        entity: String,
        field: String,
    },
    #[error("{location}: field '{field}' of '{entity}' is not exposed")]
    FieldNotAllowed {
        location: NodeLocation,
        entity: String,
        field: String,
    },
    #[error("{location}: field '{field}' of '{entity}' is not a relation")]
    NotARelation {
        location: NodeLocation,
        entity: String,
        field: String,
    },
    #[error("{location}: '{path}' is not a valid field path")]
    InvalidFieldPath { location: NodeLocation, path: String },
    #[error("{location}: unknown lookup '{lookup}'")]
    UnknownLookup {
        location: NodeLocation,
        lookup: String,
    },
    #[error("{location}: lookup '{lookup}' is not supported on {scalar_type} field '{path}'")]
    LookupNotSupported {
        location: NodeLocation,
        path: String,
        lookup: Lookup,
        scalar_type: ScalarType,
    },
    #[error("{location}: {value} is not a valid {expected}")]
    TypeMismatch {
        location: NodeLocation,
        value: serde_json::Value,
        expected: String,
    },
    #[error("{location}: '{node}' needs at least one child")]
    EmptyCombinator {
        location: NodeLocation,
        node: &'static str,
    },
    #[error("{location}: '{node}' has nothing to filter on")]
    EmptyFilter {
        location: NodeLocation,
        node: &'static str,
    },
    #[error("{location}: a '{node}' node cannot appear inside '{parent}'")]
    MisplacedNode {
        location: NodeLocation,
        node: &'static str,
        parent: &'static str,
    },
    #[error("{location}: field '{field}' of '{entity}' is read-only")]
    ReadOnlyField {
        location: NodeLocation,
        entity: String,
        field: String,
    },
    #[error("{location}: cannot order by '{path}', it crosses the multi-valued relation '{relation}'")]
    UnorderableField {
        location: NodeLocation,
        path: String,
        relation: String,
    },
    #[error("{location}: '{path}' is {depth} relations deep, the maximum is {max_depth}")]
    DepthExceeded {
        location: NodeLocation,
        path: String,
        depth: u32,
        max_depth: u32,
    },
    #[error("{location}: cannot compute {function} over '{path}'")]
    NotAggregatable {
        location: NodeLocation,
        path: String,
        function: AggregateFunction,
    },
    #[error("custom queryset '{name}' is not registered")]
    CustomQuerysetNotFound { name: String },
    #[error("custom queryset '{name}' belongs to '{registered}', not '{requested}'")]
    CustomQuerysetMismatch {
        name: String,
        registered: String,
        requested: String,
    },
    #[error("no access: {action} on '{entity}' is not permitted")]
    PermissionDenied { entity: String, action: Action },
    #[error("{location}: no access: field '{field}' of '{entity}' is not visible")]
    FieldHidden {
        location: NodeLocation,
        entity: String,
        field: String,
    },
    #[error("{location}: no access: field '{field}' of '{entity}' cannot be set")]
    FieldNotCreatable {
        location: NodeLocation,
        entity: String,
        field: String,
    },
    #[error("internal error: {0}")]
    Internal(String),
}

/// The broad classes of translation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request is malformed or refers to something that does not exist
    /// or is not exposed. Nothing was executed.
    Validation,
    /// The request is well formed but the requester may not run it.
    Permission,
    /// An invariant of the engine was violated.
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PermissionDenied { .. }
            | Error::FieldHidden { .. }
            | Error::FieldNotCreatable { .. } => ErrorKind::Permission,
            Error::Internal(_) => ErrorKind::Internal,
            _ => ErrorKind::Validation,
        }
    }

    /// Attach a location to a registry error.
    pub fn from_metadata(error: metadata::Error, location: &NodeLocation) -> Self {
        match error {
            metadata::Error::NoSuchEntity(entity) => Error::EntityNotFound {
                location: location.clone(),
                entity: entity.to_string(),
            },
            metadata::Error::NoSuchField { entity, field } => Error::FieldNotFound {
                location: location.clone(),
                entity: entity.to_string(),
                field: field.to_string(),
            },
            other => Error::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_render_as_paths() {
        let location = NodeLocation::ast().field("children").index(1).field("child");
        assert_eq!(location.to_string(), "ast.children[1].child");
        assert_eq!(
            NodeLocation::ast().field("conditions").key("title").to_string(),
            "ast.conditions[\"title\"]"
        );
    }

    #[test]
    fn permission_errors_are_not_validation_errors() {
        let error = Error::PermissionDenied {
            entity: "blog.post".to_string(),
            action: Action::Create,
        };
        assert_eq!(error.kind(), ErrorKind::Permission);
        assert_eq!(
            error.to_string(),
            "no access: create on 'blog.post' is not permitted"
        );
    }
}
