//! Resolve the fields to return for an entity, either up to a relation depth
//! or from an explicit list of field paths.

use indexmap::IndexMap;

use query_engine_metadata::metadata::{EntityDescriptor, FieldName, FieldNode};
use query_engine_predicate::predicate::ast::{FieldSelection, SelectedField};

use crate::translation::error::{Error, NodeLocation};
use crate::translation::helpers::Env;

/// Walk the relation graph from the root entity up to `depth` hops. Scalar
/// fields are always selected; a relation at hop `d` selects its related
/// entity's fields at hop `d + 1`. Only allow-listed fields the requester
/// may see are selected, and only relations to entities they may read.
pub fn resolve_fields(env: &Env, depth: u32) -> Result<FieldSelection, Error> {
    select_entity(env, env.root, depth)
}

fn select_entity(
    env: &Env,
    descriptor: &EntityDescriptor,
    remaining: u32,
) -> Result<FieldSelection, Error> {
    let mut fields = vec![];
    for (name, info) in descriptor.allowed_fields() {
        if !env.is_visible(descriptor, name.as_str()) {
            continue;
        }
        if let Some(scalar_type) = info.kind.scalar_type() {
            fields.push(SelectedField::Scalar {
                name: name.clone(),
                scalar_type,
            });
            continue;
        }
        if remaining == 0 {
            continue;
        }
        let Some(edge) = graph_edge(env, descriptor, name)? else {
            continue;
        };
        let target = related_entity(env, edge)?;
        if !env.can_read(target) {
            tracing::debug!(
                entity = %descriptor.name,
                field = %name,
                related = %target.name,
                "related entity is not readable, relation skipped"
            );
            continue;
        }
        fields.push(SelectedField::Relation {
            name: name.clone(),
            cardinality: edge.cardinality,
            reverse: edge.reverse,
            read_only: edge.read_only,
            row_filter: env.row_filter(target, &NodeLocation::root("fields"))?,
            selection: select_entity(env, target, remaining - 1)?,
        });
    }
    Ok(FieldSelection {
        entity: descriptor.name.clone(),
        primary_key: descriptor.primary_key().clone(),
        fields,
    })
}

/// The graph edge of an allow-listed relation. Relations to unregistered
/// entities are not part of the graph and select nothing.
fn graph_edge<'env>(
    env: &'env Env,
    descriptor: &EntityDescriptor,
    name: &FieldName,
) -> Result<Option<&'env FieldNode>, Error> {
    match env.relation_edge(descriptor, name.as_str(), &NodeLocation::root("fields")) {
        Ok(edge) => Ok(Some(edge)),
        Err(Error::EntityNotFound { entity, .. }) => {
            tracing::debug!(
                entity = %descriptor.name,
                field = %name,
                related = %entity,
                "relation to an unregistered entity selects nothing"
            );
            Ok(None)
        }
        Err(error) => Err(error),
    }
}

fn related_entity<'env>(env: &Env<'env>, edge: &FieldNode) -> Result<&'env EntityDescriptor, Error> {
    env.registry.lookup(edge.target.as_str()).map_err(|_| {
        Error::Internal(format!(
            "relation '{}.{}' points at unregistered entity '{}'",
            edge.entity, edge.field, edge.target
        ))
    })
}

/// Requested paths merged into a tree. A path ending on a relation selects
/// every scalar field of the related entity.
#[derive(Debug, Default)]
struct FieldTree {
    all_scalars: bool,
    fields: IndexMap<String, (NodeLocation, FieldTree)>,
}

/// Select exactly the requested field paths, plus the primary key of every
/// entity visited. A path may cross at most `max_depth` relations, and
/// asking for a hidden field or an unreadable entity is an error.
pub fn resolve_explicit_fields(
    env: &Env,
    paths: &[String],
    max_depth: u32,
    location: &NodeLocation,
) -> Result<FieldSelection, Error> {
    let mut tree = FieldTree::default();
    for (index, path) in paths.iter().enumerate() {
        let location = location.index(index);
        let segments: Vec<&str> = path.split("__").collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(Error::InvalidFieldPath {
                location,
                path: path.clone(),
            });
        }
        let depth = u32::try_from(segments.len() - 1).unwrap_or(u32::MAX);
        if depth > max_depth {
            return Err(Error::DepthExceeded {
                location,
                path: path.clone(),
                depth,
                max_depth,
            });
        }
        let mut node = &mut tree;
        for segment in segments {
            node = &mut node
                .fields
                .entry(segment.to_string())
                .or_insert_with(|| (location.clone(), FieldTree::default()))
                .1;
        }
        node.all_scalars = true;
    }
    select_tree(env, env.root, &tree)
}

fn select_tree(
    env: &Env,
    descriptor: &EntityDescriptor,
    tree: &FieldTree,
) -> Result<FieldSelection, Error> {
    let mut fields: Vec<SelectedField> = vec![];

    for (segment, (location, subtree)) in &tree.fields {
        let name = descriptor.resolve_alias(segment);
        env.allowed_field(descriptor, name, location)?;
        env.check_visible(descriptor, name, location)?;
        let Some(info) = descriptor.field(name) else {
            continue;
        };
        match info.kind.scalar_type() {
            Some(scalar_type) => {
                if !subtree.fields.is_empty() {
                    return Err(Error::NotARelation {
                        location: location.clone(),
                        entity: descriptor.name.to_string(),
                        field: name.to_string(),
                    });
                }
                fields.push(SelectedField::Scalar {
                    name: FieldName::new(name),
                    scalar_type,
                });
            }
            None => {
                let edge = env.relation_edge(descriptor, name, location)?;
                let target = related_entity(env, edge)?;
                env.check_readable(target)?;
                let mut selection = select_tree(env, target, subtree)?;
                if subtree.all_scalars {
                    let scalars = select_entity(env, target, 0)?;
                    for field in scalars.fields {
                        if selection.field(field.name().as_str()).is_none() {
                            selection.fields.push(field);
                        }
                    }
                }
                fields.push(SelectedField::Relation {
                    name: FieldName::new(name),
                    cardinality: edge.cardinality,
                    reverse: edge.reverse,
                    read_only: edge.read_only,
                    row_filter: env.row_filter(target, location)?,
                    selection,
                });
            }
        }
    }

    // the same field may be requested through its name and through `pk`.
    let mut seen = std::collections::BTreeSet::new();
    fields.retain(|field| seen.insert(field.name().clone()));

    Ok(FieldSelection {
        entity: descriptor.name.clone(),
        primary_key: descriptor.primary_key().clone(),
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_engine_metadata::metadata::Cardinality;

    fn with_env<T>(entity: &str, f: impl FnOnce(&Env) -> T) -> T {
        let registry = tests_common::blog_registry();
        let env = Env::new(&registry, entity, &NodeLocation::ast()).unwrap();
        f(&env)
    }

    #[test]
    fn depth_zero_selects_scalar_fields_only() {
        let selection = with_env("blog.post", |env| resolve_fields(env, 0)).unwrap();
        assert_eq!(
            selection.paths(),
            vec!["id", "title", "body", "published", "rating", "created", "metadata"]
        );
        assert_eq!(selection.depth(), 0);
    }

    #[test]
    fn depth_one_adds_direct_relations() {
        let selection = with_env("blog.post", |env| resolve_fields(env, 1)).unwrap();
        assert_eq!(
            selection.paths(),
            vec![
                "id",
                "title",
                "body",
                "published",
                "rating",
                "created",
                "metadata",
                "author",
                "author__id",
                "author__name",
                "author__email",
                "tags",
                "tags__id",
                "tags__name",
            ]
        );
    }

    #[test]
    fn cyclic_relations_stop_at_the_requested_depth() {
        let selection = with_env("blog.author", |env| resolve_fields(env, 3)).unwrap();
        assert_eq!(selection.depth(), 3);
        let Some(SelectedField::Relation { selection: posts, cardinality, reverse, read_only, .. }) =
            selection.field("posts")
        else {
            panic!("posts should be selected");
        };
        assert_eq!(*cardinality, Cardinality::Many);
        assert!(*reverse);
        assert!(*read_only);
        assert!(posts.field("author").is_some());
    }

    #[test]
    fn reverse_relations_to_unregistered_entities_select_nothing() {
        let selection = with_env("org.user", |env| resolve_fields(env, 1)).unwrap();
        assert!(selection.field("audits").is_none());
        assert!(selection.field("groups").is_some());
    }

    #[test]
    fn explicit_fields_select_only_what_was_asked() {
        let paths = vec!["title".to_string(), "author__name".to_string(), "tags".to_string()];
        let selection = with_env("blog.post", |env| {
            resolve_explicit_fields(env, &paths, 3, &NodeLocation::root("fields"))
        })
        .unwrap();
        assert_eq!(
            selection.paths(),
            vec!["title", "author", "author__name", "tags", "tags__id", "tags__name"]
        );
        assert_eq!(selection.primary_key, FieldName::from("id"));
    }

    #[test]
    fn explicit_fields_must_be_exposed() {
        let paths = vec!["comments__body".to_string()];
        let error = with_env("blog.post", |env| {
            resolve_explicit_fields(env, &paths, 3, &NodeLocation::root("fields"))
        })
        .unwrap_err();
        assert_eq!(
            error,
            Error::FieldNotAllowed {
                location: NodeLocation::root("fields").index(0),
                entity: "blog.post".to_string(),
                field: "comments".to_string(),
            }
        );
    }

    #[test]
    fn explicit_fields_respect_the_maximum_depth() {
        let paths = vec!["author__posts__tags__name".to_string()];
        let error = with_env("blog.post", |env| {
            resolve_explicit_fields(env, &paths, 2, &NodeLocation::root("fields"))
        })
        .unwrap_err();
        assert!(matches!(error, Error::DepthExceeded { depth: 3, max_depth: 2, .. }));
    }
}
