//! Entities tracked by the engine, their fields and their relations.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::database::ScalarType;

/// The name of a registered entity, e.g. `blog.post`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct EntityName(pub String);

impl EntityName {
    pub fn new(name: impl Into<String>) -> Self {
        EntityName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let EntityName(name) = self;
        write!(f, "{name}")
    }
}

impl Borrow<str> for EntityName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityName {
    fn from(name: &str) -> Self {
        EntityName(name.to_string())
    }
}

/// The name of a field on an entity.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct FieldName(pub String);

impl FieldName {
    pub fn new(name: impl Into<String>) -> Self {
        FieldName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let FieldName(name) = self;
        write!(f, "{name}")
    }
}

impl Borrow<str> for FieldName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldName {
    fn from(name: &str) -> Self {
        FieldName(name.to_string())
    }
}

/// Is a relation single-valued or multi-valued?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    One,
    Many,
}

/// What kind of data a field holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    /// A plain value.
    Scalar {
        #[serde(rename = "type")]
        scalar_type: ScalarType,
    },
    /// A stored reference to a single row of `target`.
    ForeignKey { target: EntityName },
    /// A stored reference to a single row of `target`, unique on this side.
    OneToOne { target: EntityName },
    /// A stored list of references to rows of `target`.
    ManyToMany { target: EntityName },
    /// The rows of `target` whose `via` field references this row. Never stored.
    Reverse { target: EntityName, via: FieldName },
}

impl FieldKind {
    /// The related entity, if this is a relation.
    pub fn target(&self) -> Option<&EntityName> {
        match self {
            FieldKind::Scalar { .. } => None,
            FieldKind::ForeignKey { target }
            | FieldKind::OneToOne { target }
            | FieldKind::ManyToMany { target }
            | FieldKind::Reverse { target, .. } => Some(target),
        }
    }

    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            FieldKind::Scalar { scalar_type } => Some(*scalar_type),
            _ => None,
        }
    }

    pub fn is_reverse(&self) -> bool {
        matches!(self, FieldKind::Reverse { .. })
    }

    /// The cardinality of a stored relation. Reverse relations depend on the
    /// field they are declared through, so they are answered by the registry.
    pub fn forward_cardinality(&self) -> Option<Cardinality> {
        match self {
            FieldKind::ForeignKey { .. } | FieldKind::OneToOne { .. } => Some(Cardinality::One),
            FieldKind::ManyToMany { .. } => Some(Cardinality::Many),
            FieldKind::Scalar { .. } | FieldKind::Reverse { .. } => None,
        }
    }
}

/// Information about a field of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldInfo {
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default = "writable_default")]
    pub writable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn writable_default() -> bool {
    true
}

impl FieldInfo {
    pub fn scalar(scalar_type: ScalarType) -> Self {
        FieldInfo::new(FieldKind::Scalar { scalar_type })
    }

    pub fn new(kind: FieldKind) -> Self {
        FieldInfo {
            kind,
            nullable: false,
            writable: true,
            description: None,
        }
    }

    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Information about a registered entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EntityInfo {
    pub primary_key: FieldName,
    pub fields: IndexMap<FieldName, FieldInfo>,
    /// The fields a client may filter, sort, select or write, in output order.
    pub allowed_fields: Vec<FieldName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub read_only_fields: Vec<FieldName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub searchable_fields: Vec<FieldName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Mapping from an entity name to its information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EntitiesInfo(pub BTreeMap<EntityName, EntityInfo>);

impl EntitiesInfo {
    pub fn empty() -> Self {
        EntitiesInfo(BTreeMap::new())
    }
}

/// A registered entity. Immutable once the registry is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    pub name: EntityName,
    pub info: EntityInfo,
}

/// The alias clients may use for the primary key of any entity.
pub const PRIMARY_KEY_ALIAS: &str = "pk";

impl EntityDescriptor {
    pub fn primary_key(&self) -> &FieldName {
        &self.info.primary_key
    }

    /// Resolve `pk` to the primary key field name, leaving other names untouched.
    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        if name == PRIMARY_KEY_ALIAS {
            self.info.primary_key.as_str()
        } else {
            name
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.info.fields.get(name)
    }

    /// Is the field named in the allow-list? The primary key is always allowed.
    pub fn is_allowed(&self, name: &str) -> bool {
        name == self.info.primary_key.as_str()
            || self.info.allowed_fields.iter().any(|field| field.as_str() == name)
    }

    /// Reverse relations, non-writable fields and configured read-only fields
    /// can never be written.
    pub fn is_read_only(&self, name: &str) -> bool {
        match self.field(name) {
            None => true,
            Some(info) => {
                info.kind.is_reverse()
                    || !info.writable
                    || self
                        .info
                        .read_only_fields
                        .iter()
                        .any(|field| field.as_str() == name)
            }
        }
    }

    /// The allow-listed fields in allow-list order.
    pub fn allowed_fields(&self) -> impl Iterator<Item = (&FieldName, &FieldInfo)> {
        self.info
            .allowed_fields
            .iter()
            .filter_map(|name| self.info.fields.get_key_value(name))
    }

    pub fn searchable_fields(&self) -> &[FieldName] {
        &self.info.searchable_fields
    }
}
