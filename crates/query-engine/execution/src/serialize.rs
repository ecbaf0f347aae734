//! Project fetched rows into the response payload.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use query_engine_metadata::metadata::{Cardinality, EntityDescriptor, Registry};
use query_engine_predicate::predicate::ast::{FieldSelection, SelectedField};

use crate::error::Error;
use crate::provider::StorageProvider;
use crate::record::{key_string, Record};

/// The response to a request: the keys of the root rows, and every
/// serialized object keyed by entity and then by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    pub data: Vec<Value>,
    pub included: BTreeMap<String, IndexMap<String, Value>>,
    pub model_name: String,
}

/// Serialize rows of `selection.entity` and the rows they relate to, as far
/// as the selection reaches.
///
/// Every object starts with its primary key, read from the stored row, so a
/// primary key that is a relation is emitted as the raw related key. A
/// relation is rendered as the key of the related row, or null, and a
/// multi-valued relation as the list of keys; the related rows are
/// serialized into `included` under their own entity. Related rows outside
/// the row filter of their relation are left out, as if they did not exist.
pub async fn serialize(
    provider: &dyn StorageProvider,
    registry: &Registry,
    selection: &FieldSelection,
    rows: Vec<Record>,
) -> Result<ResponsePayload, Error> {
    let root = descriptor(registry, selection)?;
    let data = rows
        .iter()
        .map(|row| row.key(root).cloned())
        .collect::<Result<Vec<_>, _>>()?;

    let mut included: BTreeMap<String, IndexMap<String, Value>> = BTreeMap::new();
    let mut seen = BTreeSet::new();
    let mut pending: VecDeque<(&FieldSelection, Record)> =
        rows.into_iter().map(|row| (selection, row)).collect();

    while let Some((selection, record)) = pending.pop_front() {
        let entity = descriptor(registry, selection)?;
        let key = record.key(entity)?.clone();
        let key_text = key_string(&key);
        // the same row may be reached through several relations.
        if !seen.insert((std::ptr::from_ref(selection) as usize, key_text.clone())) {
            continue;
        }

        let primary_key = entity.primary_key().as_str();
        let mut object = serde_json::Map::new();
        object.insert(primary_key.to_string(), key);

        for field in &selection.fields {
            match field {
                SelectedField::Scalar { name, .. } => {
                    if name.as_str() != primary_key {
                        let value = record.get(name.as_str()).cloned().unwrap_or(Value::Null);
                        object.insert(name.to_string(), value);
                    }
                }
                SelectedField::Relation {
                    name,
                    cardinality,
                    row_filter,
                    selection: related_selection,
                    ..
                } => {
                    let relation = registry
                        .relation(entity.name.as_str(), name.as_str())
                        .ok_or_else(|| Error::Serialization {
                            entity: entity.name.to_string(),
                            field: name.to_string(),
                            message: "not a relation to a registered entity".to_string(),
                        })?;
                    let related = provider
                        .related(&relation, &record, row_filter.as_ref())
                        .await?;
                    let target = descriptor(registry, related_selection)?;
                    let keys = related
                        .iter()
                        .map(|row| row.key(target).cloned())
                        .collect::<Result<Vec<_>, _>>()?;
                    if name.as_str() != primary_key {
                        let value = match cardinality {
                            Cardinality::One => keys.into_iter().next().unwrap_or(Value::Null),
                            Cardinality::Many => Value::Array(keys),
                        };
                        object.insert(name.to_string(), value);
                    }
                    pending.extend(related.into_iter().map(|row| (related_selection, row)));
                }
            }
        }

        let objects = included.entry(entity.name.to_string()).or_default();
        match objects.get_mut(&key_text) {
            // reached again with a different selection: keep what is there,
            // add what is new.
            Some(Value::Object(existing)) => {
                for (field, value) in object {
                    existing.entry(field).or_insert(value);
                }
            }
            _ => {
                objects.insert(key_text, Value::Object(object));
            }
        }
    }

    Ok(ResponsePayload {
        data,
        included,
        model_name: selection.entity.to_string(),
    })
}

fn descriptor<'a>(
    registry: &'a Registry,
    selection: &FieldSelection,
) -> Result<&'a EntityDescriptor, Error> {
    registry
        .lookup(selection.entity.as_str())
        .map_err(|err| Error::Serialization {
            entity: selection.entity.to_string(),
            field: selection.primary_key.to_string(),
            message: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_engine_metadata::metadata::{EntityName, FieldName, Lookup, ScalarType};
    use query_engine_predicate::predicate::ast::Literal;
    use query_engine_predicate::predicate::helpers::{compare, path_from_str};
    use serde_json::json;

    use crate::in_memory::InMemoryStore;

    fn scalar(name: &str, scalar_type: ScalarType) -> SelectedField {
        SelectedField::Scalar {
            name: FieldName::from(name),
            scalar_type,
        }
    }

    #[tokio::test]
    async fn relation_primary_keys_are_raw_ids() {
        let registry = tests_common::blog_registry();
        let store =
            InMemoryStore::from_json(registry.clone(), tests_common::blog_dataset()).unwrap();
        let selection = FieldSelection {
            entity: EntityName::from("org.profile"),
            primary_key: FieldName::from("user"),
            fields: vec![scalar("bio", ScalarType::Text)],
        };
        let rows = store.rows("org.profile").unwrap();
        let payload = serialize(&store, &registry, &selection, rows).await.unwrap();

        assert_eq!(
            payload.data,
            vec![json!(tests_common::ALICE), json!(tests_common::BOB)]
        );
        assert_eq!(
            payload.included["org.profile"][tests_common::ALICE],
            json!({"user": tests_common::ALICE, "bio": "Runs the platform team"})
        );
        assert_eq!(payload.model_name, "org.profile");
    }

    #[tokio::test]
    async fn related_rows_are_included_under_their_entity() {
        let registry = tests_common::blog_registry();
        let store =
            InMemoryStore::from_json(registry.clone(), tests_common::blog_dataset()).unwrap();
        let tag_selection = FieldSelection {
            entity: EntityName::from("blog.tag"),
            primary_key: FieldName::from("id"),
            fields: vec![
                scalar("id", ScalarType::Integer),
                scalar("name", ScalarType::Text),
            ],
        };
        let selection = FieldSelection {
            entity: EntityName::from("blog.post"),
            primary_key: FieldName::from("id"),
            fields: vec![
                scalar("id", ScalarType::Integer),
                scalar("title", ScalarType::Text),
                SelectedField::Relation {
                    name: FieldName::from("tags"),
                    cardinality: Cardinality::Many,
                    reverse: false,
                    read_only: false,
                    row_filter: None,
                    selection: tag_selection,
                },
            ],
        };
        let rows = store.rows("blog.post").unwrap();
        let payload = serialize(&store, &registry, &selection, rows).await.unwrap();

        assert_eq!(payload.data, vec![json!(1), json!(2), json!(3), json!(4)]);
        similar_asserts::assert_eq!(
            payload.included["blog.post"]["1"],
            json!({"id": 1, "title": "Rust ownership", "tags": [1, 2]})
        );
        assert_eq!(payload.included["blog.post"]["2"]["tags"], json!([]));
        assert_eq!(payload.included["blog.tag"].len(), 2);
        assert_eq!(
            payload.included["blog.tag"]["2"],
            json!({"id": 2, "name": "async"})
        );
    }

    #[tokio::test]
    async fn row_filters_leave_related_rows_out() {
        let registry = tests_common::blog_registry();
        let store =
            InMemoryStore::from_json(registry.clone(), tests_common::blog_dataset()).unwrap();
        let post_selection = FieldSelection {
            entity: EntityName::from("blog.post"),
            primary_key: FieldName::from("id"),
            fields: vec![scalar("id", ScalarType::Integer)],
        };
        let selection = FieldSelection {
            entity: EntityName::from("blog.author"),
            primary_key: FieldName::from("id"),
            fields: vec![
                scalar("id", ScalarType::Integer),
                SelectedField::Relation {
                    name: FieldName::from("posts"),
                    cardinality: Cardinality::Many,
                    reverse: true,
                    read_only: true,
                    row_filter: Some(compare(
                        path_from_str("published"),
                        Lookup::Exact,
                        Literal::Bool(true),
                    )),
                    selection: post_selection,
                },
            ],
        };
        let rows = store.rows("blog.author").unwrap();
        let payload = serialize(&store, &registry, &selection, rows).await.unwrap();

        assert_eq!(payload.included["blog.author"]["1"]["posts"], json!([1]));
        assert_eq!(payload.included["blog.author"]["2"]["posts"], json!([3]));
        let mut included: Vec<&String> = payload.included["blog.post"].keys().collect();
        included.sort();
        assert_eq!(included, vec!["1", "3"]);
    }
}
