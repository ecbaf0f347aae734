//! Errors raised while building or querying the registry.

use thiserror::Error;

use super::entities::{EntityName, FieldName};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("no such entity: '{0}'")]
    NoSuchEntity(EntityName),
    #[error("entity '{entity}' has no field named '{field}'")]
    NoSuchField {
        entity: EntityName,
        field: FieldName,
    },
    #[error("field '{field}' of '{entity}' appears more than once in the allow-list")]
    DuplicateAllowedField {
        entity: EntityName,
        field: FieldName,
    },
    #[error(
        "primary key '{field}' of '{entity}' must be a scalar or a single-valued stored relation"
    )]
    InvalidPrimaryKey {
        entity: EntityName,
        field: FieldName,
    },
    #[error("the primary key of '{0}' refers back to itself")]
    PrimaryKeyCycle(EntityName),
    #[error("allow-listed field '{field}' of '{entity}' refers to unregistered entity '{target}'")]
    UnregisteredTarget {
        entity: EntityName,
        field: FieldName,
        target: EntityName,
    },
    #[error(
        "reverse relation '{field}' of '{entity}' expects '{target}.{via}' to be a stored relation back to '{entity}'"
    )]
    InvalidReverseRelation {
        entity: EntityName,
        field: FieldName,
        target: EntityName,
        via: FieldName,
    },
    #[error("searchable field '{field}' of '{entity}' is not a text field")]
    SearchableFieldNotText {
        entity: EntityName,
        field: FieldName,
    },
}
