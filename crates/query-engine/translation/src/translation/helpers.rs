//! Helpers for processing requests against the registry and relation graph.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;

use query_engine_metadata::metadata::{
    Cardinality, EntityDescriptor, FieldName, FieldNode, Registry, RelationGraph, ScalarType,
};
use query_engine_predicate::predicate::ast::{FieldPath, PermissionPredicate, Predicate, Restriction};
use query_engine_predicate::predicate::helpers::false_expr;

use super::error::{Error, NodeLocation};
use super::query::PermissionProvider;
use crate::request::{Action, Requester};

/// The requester a client tree is translated for, and who decides what they
/// may see.
#[derive(Clone, Copy)]
pub struct Access<'request> {
    pub permissions: &'request dyn PermissionProvider,
    pub requester: &'request Requester,
}

impl fmt::Debug for Access<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Access")
            .field("requester", self.requester)
            .finish_non_exhaustive()
    }
}

/// The registry and the relation graph of the entity a request is about.
///
/// An `Env` with access checks every field and related entity a path
/// touches against the requester's permissions. Without access, as for
/// configured filters, paths are only checked against the allow-lists.
#[derive(Debug, Clone)]
pub struct Env<'request> {
    pub registry: &'request Registry,
    pub root: &'request EntityDescriptor,
    pub graph: Arc<RelationGraph>,
    pub access: Option<Access<'request>>,
}

/// A field path checked against the allow-lists and the relation graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    /// The path with aliases resolved. A path ending on a relation is
    /// extended with the related primary key.
    pub path: FieldPath,
    pub scalar_type: ScalarType,
    /// The first multi-valued relation crossed, if any.
    pub multi_valued: Option<FieldName>,
}

impl<'request> Env<'request> {
    /// Create a new Env for an entity.
    pub fn new(
        registry: &'request Registry,
        entity: &str,
        location: &NodeLocation,
    ) -> Result<Env<'request>, Error> {
        let root = registry
            .lookup(entity)
            .map_err(|err| Error::from_metadata(err, location))?;
        let graph = registry
            .graph(entity)
            .map_err(|err| Error::from_metadata(err, location))?;
        Ok(Env {
            registry,
            root,
            graph,
            access: None,
        })
    }

    /// The same Env, checking paths against the permissions of a requester.
    #[must_use]
    pub fn with_access(self, access: Access<'request>) -> Env<'request> {
        Env {
            access: Some(access),
            ..self
        }
    }

    /// Can the requester see this field? The primary key is always visible.
    pub fn is_visible(&self, entity: &EntityDescriptor, field: &str) -> bool {
        match &self.access {
            None => true,
            Some(_) if entity.primary_key().as_str() == field => true,
            Some(access) => access
                .permissions
                .visible_fields(entity, access.requester)
                .allows(field),
        }
    }

    pub fn check_visible(
        &self,
        entity: &EntityDescriptor,
        field: &str,
        location: &NodeLocation,
    ) -> Result<(), Error> {
        if self.is_visible(entity, field) {
            Ok(())
        } else {
            Err(Error::FieldHidden {
                location: location.clone(),
                entity: entity.name.to_string(),
                field: field.to_string(),
            })
        }
    }

    pub fn check_creatable(
        &self,
        entity: &EntityDescriptor,
        field: &str,
        location: &NodeLocation,
    ) -> Result<(), Error> {
        match &self.access {
            Some(access)
                if !access
                    .permissions
                    .create_fields(entity, access.requester)
                    .allows(field) =>
            {
                Err(Error::FieldNotCreatable {
                    location: location.clone(),
                    entity: entity.name.to_string(),
                    field: field.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    /// May the requester read rows of this entity?
    pub fn can_read(&self, entity: &EntityDescriptor) -> bool {
        self.access.as_ref().map_or(true, |access| {
            access
                .permissions
                .allowed_actions(entity, access.requester)
                .contains(&Action::Read)
        })
    }

    pub fn check_readable(&self, entity: &EntityDescriptor) -> Result<(), Error> {
        if self.can_read(entity) {
            Ok(())
        } else {
            Err(Error::PermissionDenied {
                entity: entity.name.to_string(),
                action: Action::Read,
            })
        }
    }

    /// The rows of a related entity the requester may see, or `None` when
    /// they may see every row.
    pub fn row_filter(
        &self,
        entity: &EntityDescriptor,
        location: &NodeLocation,
    ) -> Result<Option<Predicate>, Error> {
        let Some(access) = &self.access else {
            return Ok(None);
        };
        let env = Env::new(self.registry, entity.name.as_str(), location)?;
        Ok(match access.permissions.predicate_for(&env, access.requester)? {
            PermissionPredicate::Unrestricted => None,
            PermissionPredicate::Restricted(predicate) => Some(predicate),
            PermissionPredicate::Denied => Some(false_expr()),
        })
    }

    /// A restriction for every relation prefix of `paths` whose related rows
    /// the requester may only partly see.
    pub fn restrictions<'p>(
        &self,
        paths: impl IntoIterator<Item = &'p FieldPath>,
        location: &NodeLocation,
    ) -> Result<Vec<Restriction>, Error> {
        if self.access.is_none() {
            return Ok(vec![]);
        }
        let mut prefixes: IndexSet<&[FieldName]> = IndexSet::new();
        for path in paths {
            let relations = path.relations();
            for end in 1..=relations.len() {
                prefixes.insert(&relations[..end]);
            }
        }

        let mut restrictions = vec![];
        for prefix in prefixes {
            let mut current = self.root;
            for segment in prefix {
                let edge = self.relation_edge(current, segment.as_str(), location)?;
                current = self.lookup_entity(edge.target.as_str(), location)?;
            }
            if let Some(predicate) = self.row_filter(current, location)? {
                restrictions.push(Restriction {
                    relation: FieldPath::new(prefix.to_vec()),
                    entity: current.name.clone(),
                    predicate,
                });
            }
        }
        Ok(restrictions)
    }

    /// Lookup an entity in the registry.
    pub fn lookup_entity(
        &self,
        name: &str,
        location: &NodeLocation,
    ) -> Result<&'request EntityDescriptor, Error> {
        self.registry
            .lookup(name)
            .map_err(|err| Error::from_metadata(err, location))
    }

    /// Lookup the relation edge of an allow-listed relation field. A relation
    /// to an unregistered entity is reported as such; any other missing edge
    /// means the graph and the registry disagree.
    pub fn relation_edge(
        &self,
        entity: &EntityDescriptor,
        field: &str,
        location: &NodeLocation,
    ) -> Result<&FieldNode, Error> {
        if let Some(edge) = self.graph.relation_edge(entity.name.as_str(), field) {
            return Ok(edge);
        }
        match entity.field(field).and_then(|info| info.kind.target()) {
            Some(target) if !self.registry.contains(target.as_str()) => {
                Err(Error::EntityNotFound {
                    location: location.clone(),
                    entity: target.to_string(),
                })
            }
            Some(_) => Err(Error::Internal(format!(
                "the relation graph of '{}' has no edge for '{}.{field}'",
                self.root.name, entity.name
            ))),
            None => Err(Error::NotARelation {
                location: location.clone(),
                entity: entity.name.to_string(),
                field: field.to_string(),
            }),
        }
    }

    /// Check that a field exists on an entity and is exposed.
    pub fn allowed_field(
        &self,
        entity: &EntityDescriptor,
        field: &str,
        location: &NodeLocation,
    ) -> Result<(), Error> {
        if entity.field(field).is_none() {
            return Err(Error::FieldNotFound {
                location: location.clone(),
                entity: entity.name.to_string(),
                field: field.to_string(),
            });
        }
        if !entity.is_allowed(field) {
            return Err(Error::FieldNotAllowed {
                location: location.clone(),
                entity: entity.name.to_string(),
                field: field.to_string(),
            });
        }
        Ok(())
    }

    /// Resolve a `__`-separated field path starting at the root entity. Every
    /// segment must be exposed, and every segment but the last must be a
    /// relation edge of the graph.
    pub fn resolve_path(&self, path: &str, location: &NodeLocation) -> Result<ResolvedPath, Error> {
        let segments: Vec<&str> = path.split("__").collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(Error::InvalidFieldPath {
                location: location.clone(),
                path: path.to_string(),
            });
        }

        let mut current = self.root;
        let mut resolved = vec![];
        let mut multi_valued = None;

        for (index, segment) in segments.iter().enumerate() {
            let name = current.resolve_alias(segment);
            self.allowed_field(current, name, location)?;
            self.check_visible(current, name, location)?;
            resolved.push(FieldName::new(name));

            let is_last = index + 1 == segments.len();
            match current.field(name).and_then(|info| info.kind.scalar_type()) {
                Some(scalar_type) if is_last => {
                    return Ok(ResolvedPath {
                        path: FieldPath::new(resolved),
                        scalar_type,
                        multi_valued,
                    })
                }
                Some(_) => {
                    return Err(Error::NotARelation {
                        location: location.clone(),
                        entity: current.name.to_string(),
                        field: name.to_string(),
                    })
                }
                None => {
                    let edge = self.relation_edge(current, name, location)?;
                    if edge.cardinality == Cardinality::Many && multi_valued.is_none() {
                        multi_valued = Some(edge.field.clone());
                    }
                    current = self.lookup_entity(edge.target.as_str(), location)?;
                    self.check_readable(current)?;
                }
            }
        }

        // the path ends on a relation: compare against the related primary key,
        // following primary keys that are themselves relations.
        for _ in 0..=self.registry.entities().count() {
            let key = current.primary_key();
            resolved.push(key.clone());
            match current.field(key.as_str()).and_then(|info| info.kind.scalar_type()) {
                Some(scalar_type) => {
                    return Ok(ResolvedPath {
                        path: FieldPath::new(resolved),
                        scalar_type,
                        multi_valued,
                    })
                }
                None => {
                    let edge = self.relation_edge(current, key.as_str(), location)?;
                    current = self.lookup_entity(edge.target.as_str(), location)?;
                    self.check_readable(current)?;
                }
            }
        }
        Err(Error::Internal(format!(
            "the primary key of '{}' does not resolve to a stored value",
            current.name
        )))
    }
}
