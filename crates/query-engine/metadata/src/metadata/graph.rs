//! The relation graph of an entity: entity -> field -> related entity edges.
//!
//! Nodes are keyed by identity strings, `entity` for entities and
//! `entity::field` for relation fields. Building stops at nodes that are
//! already present, so cyclic schemas terminate.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use indexmap::IndexSet;

use super::entities::{Cardinality, EntityDescriptor, EntityName, FieldKind, FieldName};
use super::error::Error;
use super::registry::Registry;

/// A relation field in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNode {
    pub entity: EntityName,
    pub field: FieldName,
    pub target: EntityName,
    pub cardinality: Cardinality,
    /// Reverse relations and configured read-only relations.
    pub read_only: bool,
    pub reverse: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Entity(EntityName),
    Field(FieldNode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationGraph {
    root: EntityName,
    nodes: BTreeMap<String, Node>,
    edges: BTreeMap<String, IndexSet<String>>,
}

/// The identity of a field node.
pub fn field_key(entity: &str, field: &str) -> String {
    format!("{entity}::{field}")
}

impl RelationGraph {
    /// Build the graph reachable from `root`.
    pub fn build(registry: &Registry, root: &str) -> Result<RelationGraph, Error> {
        let descriptor = registry.lookup(root)?;
        Ok(RelationGraph::from_descriptor(registry, descriptor))
    }

    pub(crate) fn from_descriptor(registry: &Registry, root: &EntityDescriptor) -> RelationGraph {
        let mut graph = RelationGraph {
            root: root.name.clone(),
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
        };
        graph.ensure_entity(registry, root);
        tracing::debug!(
            root = %root.name,
            nodes = graph.nodes.len(),
            "built relation graph"
        );
        graph
    }

    fn ensure_entity(&mut self, registry: &Registry, descriptor: &EntityDescriptor) {
        let entity_key = descriptor.name.to_string();
        if self.has_node(&entity_key) {
            return;
        }
        self.nodes
            .insert(entity_key.clone(), Node::Entity(descriptor.name.clone()));
        self.edges.entry(entity_key.clone()).or_default();

        for (field, info) in &descriptor.info.fields {
            match &info.kind {
                FieldKind::Scalar { .. } => continue,
                FieldKind::Reverse { .. } if !descriptor.is_allowed(field.as_str()) => {
                    tracing::debug!(
                        entity = %descriptor.name,
                        field = %field,
                        "omitting reverse relation outside the allow-list"
                    );
                    continue;
                }
                _ => {}
            }

            let Some(relation) = registry.relation(descriptor.name.as_str(), field.as_str())
            else {
                tracing::debug!(
                    entity = %descriptor.name,
                    field = %field,
                    "skipping relation to an unregistered entity"
                );
                continue;
            };
            let Ok(target) = registry.lookup(relation.target.as_str()) else {
                continue;
            };

            let key = field_key(descriptor.name.as_str(), field.as_str());
            if !self.has_node(&key) {
                self.nodes.insert(
                    key.clone(),
                    Node::Field(FieldNode {
                        entity: descriptor.name.clone(),
                        field: field.clone(),
                        target: relation.target.clone(),
                        cardinality: relation.cardinality,
                        read_only: descriptor.is_read_only(field.as_str()),
                        reverse: relation.reverse,
                    }),
                );
            }
            self.link(&entity_key, &key);
            self.link(&key, relation.target.as_str());
            self.ensure_entity(registry, target);
        }
    }

    fn link(&mut self, from: &str, to: &str) {
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    pub fn root(&self) -> &EntityName {
        &self.root
    }

    pub fn has_node(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn node(&self, key: &str) -> Option<&Node> {
        self.nodes.get(key)
    }

    /// The relation edge for `entity.field`, if the graph contains one.
    pub fn relation_edge(&self, entity: &str, field: &str) -> Option<&FieldNode> {
        match self.nodes.get(&field_key(entity, field)) {
            Some(Node::Field(node)) => Some(node),
            _ => None,
        }
    }

    /// The nodes directly reachable from `key`.
    pub fn neighbours<'a>(&'a self, key: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .get(key)
            .into_iter()
            .flat_map(|targets| targets.iter().map(String::as_str))
    }

    /// The relation fields of an entity, in declaration order.
    pub fn relations_of<'a>(&'a self, entity: &str) -> impl Iterator<Item = &'a FieldNode> + 'a {
        self.neighbours(entity)
            .filter_map(|key| match self.nodes.get(key) {
                Some(Node::Field(node)) => Some(node),
                _ => None,
            })
    }

    pub fn entity_nodes(&self) -> impl Iterator<Item = &EntityName> {
        self.nodes.values().filter_map(|node| match node {
            Node::Entity(name) => Some(name),
            Node::Field(_) => None,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The entities reachable from the root in at most `depth` relation hops.
    pub fn reachable_within(&self, depth: usize) -> BTreeSet<EntityName> {
        let mut reached = BTreeSet::from([self.root.clone()]);
        let mut queue = VecDeque::from([(self.root.clone(), 0)]);
        while let Some((entity, hops)) = queue.pop_front() {
            if hops == depth {
                continue;
            }
            for relation in self.relations_of(entity.as_str()) {
                if reached.insert(relation.target.clone()) {
                    queue.push_back((relation.target.clone(), hops + 1));
                }
            }
        }
        reached
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::EntitiesInfo;
    use serde_json::json;

    fn registry(value: serde_json::Value) -> Registry {
        let entities: EntitiesInfo = serde_json::from_value(value).unwrap();
        Registry::build(entities).unwrap()
    }

    fn cyclic() -> Registry {
        registry(json!({
            "a": {
                "primary_key": "id",
                "fields": {
                    "id": {"kind": "scalar", "type": "integer"},
                    "b": {"kind": "foreign_key", "target": "b"},
                    "bs": {"kind": "reverse", "target": "b", "via": "a"}
                },
                "allowed_fields": ["id", "b", "bs"]
            },
            "b": {
                "primary_key": "id",
                "fields": {
                    "id": {"kind": "scalar", "type": "integer"},
                    "a": {"kind": "foreign_key", "target": "a"},
                    "as": {"kind": "reverse", "target": "a", "via": "b"},
                    "cs": {"kind": "reverse", "target": "c", "via": "b"}
                },
                "allowed_fields": ["id", "a", "cs"]
            }
        }))
    }

    #[test]
    fn cyclic_schemas_terminate_with_each_entity_once() {
        let registry = cyclic();
        let graph = RelationGraph::build(&registry, "a").unwrap();
        let entities: Vec<&str> = graph.entity_nodes().map(EntityName::as_str).collect();
        assert_eq!(entities, vec!["a", "b"]);
        assert!(graph.has_node("a::b"));
        assert!(graph.has_node("b::a"));
        assert_eq!(graph.neighbours("a::b").collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn reverse_relations_outside_the_allow_list_are_omitted() {
        let registry = cyclic();
        let graph = RelationGraph::build(&registry, "b").unwrap();
        assert!(!graph.has_node("b::as"));
        assert_eq!(graph.relation_edge("b", "as"), None);

        let included = graph.relation_edge("a", "bs").unwrap();
        assert!(included.reverse);
        assert!(included.read_only);
        assert_eq!(included.cardinality, Cardinality::Many);
    }

    #[test]
    fn reverse_relations_to_unregistered_entities_are_skipped() {
        let registry = cyclic();
        let graph = RelationGraph::build(&registry, "b").unwrap();
        assert!(!graph.has_node("b::cs"));
        assert!(!graph.has_node("c"));
    }

    #[test]
    fn unregistered_roots_are_rejected() {
        let registry = cyclic();
        assert_eq!(
            RelationGraph::build(&registry, "c").unwrap_err(),
            Error::NoSuchEntity(EntityName::from("c"))
        );
    }

    #[test]
    fn building_twice_is_idempotent() {
        let registry = cyclic();
        let first = RelationGraph::build(&registry, "a").unwrap();
        let second = RelationGraph::build(&registry, "a").unwrap();
        similar_asserts::assert_eq!(first, second);
    }

    #[test]
    fn traversal_is_bounded_by_depth() {
        let registry = cyclic();
        let graph = RelationGraph::build(&registry, "a").unwrap();
        assert_eq!(graph.reachable_within(0), BTreeSet::from([EntityName::from("a")]));
        assert_eq!(
            graph.reachable_within(5),
            BTreeSet::from([EntityName::from("a"), EntityName::from("b")])
        );
    }
}
