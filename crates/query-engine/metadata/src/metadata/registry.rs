//! The immutable registry of entities, built once during startup.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

use super::database::ScalarType;
use super::entities::{
    Cardinality, EntitiesInfo, EntityDescriptor, EntityName, FieldKind, FieldName,
};
use super::error::Error;
use super::graph::RelationGraph;

/// A resolved relation between two registered entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub source: EntityName,
    pub field: FieldName,
    pub target: EntityName,
    pub cardinality: Cardinality,
    pub reverse: bool,
}

/// All registered entities, plus a lazily built relation graph per entity.
#[derive(Debug)]
pub struct Registry {
    entities: BTreeMap<EntityName, EntityDescriptor>,
    graphs: BTreeMap<EntityName, OnceLock<Arc<RelationGraph>>>,
}

impl Registry {
    /// Validate the entities and build the registry snapshot.
    pub fn build(entities: EntitiesInfo) -> Result<Registry, Error> {
        let EntitiesInfo(entities) = entities;
        let entities: BTreeMap<EntityName, EntityDescriptor> = entities
            .into_iter()
            .map(|(name, info)| (name.clone(), EntityDescriptor { name, info }))
            .collect();

        let graphs = entities
            .keys()
            .map(|name| (name.clone(), OnceLock::new()))
            .collect();

        let registry = Registry { entities, graphs };
        for descriptor in registry.entities.values() {
            registry.validate(descriptor)?;
        }
        for name in registry.entities.keys() {
            registry.key_type(name.as_str())?;
        }

        tracing::info!(entities = registry.entities.len(), "registry built");
        Ok(registry)
    }

    fn validate(&self, descriptor: &EntityDescriptor) -> Result<(), Error> {
        let entity = &descriptor.name;
        let no_such_field = |field: &FieldName| Error::NoSuchField {
            entity: entity.clone(),
            field: field.clone(),
        };

        let primary_key = descriptor.primary_key();
        let key_info = descriptor
            .field(primary_key.as_str())
            .ok_or_else(|| no_such_field(primary_key))?;
        match &key_info.kind {
            FieldKind::Scalar { .. } => {}
            FieldKind::ForeignKey { target } | FieldKind::OneToOne { target } => {
                if !self.entities.contains_key(target) {
                    return Err(Error::UnregisteredTarget {
                        entity: entity.clone(),
                        field: primary_key.clone(),
                        target: target.clone(),
                    });
                }
            }
            FieldKind::ManyToMany { .. } | FieldKind::Reverse { .. } => {
                return Err(Error::InvalidPrimaryKey {
                    entity: entity.clone(),
                    field: primary_key.clone(),
                })
            }
        }

        let mut seen = BTreeSet::new();
        for field in &descriptor.info.allowed_fields {
            let info = descriptor
                .field(field.as_str())
                .ok_or_else(|| no_such_field(field))?;
            if !seen.insert(field) {
                return Err(Error::DuplicateAllowedField {
                    entity: entity.clone(),
                    field: field.clone(),
                });
            }
            match &info.kind {
                FieldKind::Scalar { .. } | FieldKind::Reverse { .. } => {}
                FieldKind::ForeignKey { target }
                | FieldKind::OneToOne { target }
                | FieldKind::ManyToMany { target } => {
                    if !self.entities.contains_key(target) {
                        return Err(Error::UnregisteredTarget {
                            entity: entity.clone(),
                            field: field.clone(),
                            target: target.clone(),
                        });
                    }
                }
            }
        }

        for (field, info) in &descriptor.info.fields {
            if let FieldKind::Reverse { target, via } = &info.kind {
                // reverse relations to unregistered entities are skipped, not rejected.
                let Some(target_descriptor) = self.entities.get(target) else {
                    continue;
                };
                let points_back = target_descriptor
                    .field(via.as_str())
                    .filter(|via_info| via_info.kind.forward_cardinality().is_some())
                    .and_then(|via_info| via_info.kind.target())
                    .is_some_and(|back| back == entity);
                if !points_back {
                    return Err(Error::InvalidReverseRelation {
                        entity: entity.clone(),
                        field: field.clone(),
                        target: target.clone(),
                        via: via.clone(),
                    });
                }
            }
        }

        for field in &descriptor.info.read_only_fields {
            descriptor
                .field(field.as_str())
                .ok_or_else(|| no_such_field(field))?;
        }

        for field in &descriptor.info.searchable_fields {
            let info = descriptor
                .field(field.as_str())
                .ok_or_else(|| no_such_field(field))?;
            if info.kind.scalar_type() != Some(ScalarType::Text) {
                return Err(Error::SearchableFieldNotText {
                    entity: entity.clone(),
                    field: field.clone(),
                });
            }
        }

        Ok(())
    }

    /// Look up a registered entity by name.
    pub fn lookup(&self, name: &str) -> Result<&EntityDescriptor, Error> {
        self.entities
            .get(name)
            .ok_or_else(|| Error::NoSuchEntity(EntityName::from(name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDescriptor> {
        self.entities.values()
    }

    /// Resolve a relation field. Returns `None` for scalar fields, unknown
    /// fields, and relations whose target is not registered.
    pub fn relation(&self, entity: &str, field: &str) -> Option<Relation> {
        let descriptor = self.entities.get(entity)?;
        let info = descriptor.field(field)?;
        let target = info.kind.target()?;
        let target_descriptor = self.entities.get(target)?;
        let (cardinality, reverse) = match &info.kind {
            FieldKind::Reverse { via, .. } => {
                let via_info = target_descriptor.field(via.as_str())?;
                let cardinality = match via_info.kind {
                    FieldKind::OneToOne { .. } => Cardinality::One,
                    _ => Cardinality::Many,
                };
                (cardinality, true)
            }
            kind => (kind.forward_cardinality()?, false),
        };
        Some(Relation {
            source: descriptor.name.clone(),
            field: FieldName::new(field),
            target: target.clone(),
            cardinality,
            reverse,
        })
    }

    /// The scalar type of the stored identifier of an entity. A primary key
    /// that is itself a relation stores the related entity's key.
    pub fn key_type(&self, entity: &str) -> Result<ScalarType, Error> {
        let mut visited = BTreeSet::new();
        let mut current = self.lookup(entity)?;
        loop {
            if !visited.insert(&current.name) {
                return Err(Error::PrimaryKeyCycle(EntityName::from(entity)));
            }
            let primary_key = current.primary_key();
            let info = current
                .field(primary_key.as_str())
                .ok_or_else(|| Error::NoSuchField {
                    entity: current.name.clone(),
                    field: primary_key.clone(),
                })?;
            match &info.kind {
                FieldKind::Scalar { scalar_type } => return Ok(*scalar_type),
                FieldKind::ForeignKey { target } | FieldKind::OneToOne { target } => {
                    current = self.lookup(target.as_str())?;
                }
                FieldKind::ManyToMany { .. } | FieldKind::Reverse { .. } => {
                    return Err(Error::InvalidPrimaryKey {
                        entity: current.name.clone(),
                        field: primary_key.clone(),
                    })
                }
            }
        }
    }

    /// The stored type of a field: its scalar type, or the key type of the
    /// related entity for relations.
    pub fn stored_type(&self, entity: &str, field: &str) -> Result<ScalarType, Error> {
        let descriptor = self.lookup(entity)?;
        let info = descriptor.field(field).ok_or_else(|| Error::NoSuchField {
            entity: descriptor.name.clone(),
            field: FieldName::new(field),
        })?;
        match &info.kind {
            FieldKind::Scalar { scalar_type } => Ok(*scalar_type),
            FieldKind::ForeignKey { target }
            | FieldKind::OneToOne { target }
            | FieldKind::ManyToMany { target }
            | FieldKind::Reverse { target, .. } => self.key_type(target.as_str()),
        }
    }

    /// The relation graph rooted at an entity, built on first access.
    pub fn graph(&self, entity: &str) -> Result<Arc<RelationGraph>, Error> {
        let descriptor = self.lookup(entity)?;
        let cell = self
            .graphs
            .get(entity)
            .ok_or_else(|| Error::NoSuchEntity(descriptor.name.clone()))?;
        Ok(cell
            .get_or_init(|| Arc::new(RelationGraph::from_descriptor(self, descriptor)))
            .clone())
    }
}
