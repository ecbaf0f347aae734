//! Translate a `create` node into a write operation.

use indexmap::IndexMap;
use serde_json::Value;

use query_engine_metadata::metadata::{FieldKind, FieldName, ScalarType};
use query_engine_predicate::predicate::ast::{Literal, WriteOperation};

use super::error::{Error, NodeLocation};
use super::helpers::Env;
use super::query::values::translate_json_value;

/// Check every value of a create against the root entity. Fields must exist,
/// be exposed and be writable; reverse relations never are. With access, the
/// requester must also be allowed to set them. Relations take the primary
/// key of the related row, or a list of keys for many-to-many.
pub fn translate_create(
    env: &Env,
    data: &IndexMap<String, Value>,
    location: &NodeLocation,
) -> Result<WriteOperation, Error> {
    let entity = env.root;
    let mut values = IndexMap::new();

    for (key, value) in data {
        let location = location.key(key);
        let name = entity.resolve_alias(key);
        env.allowed_field(entity, name, &location)?;
        if entity.is_read_only(name) {
            return Err(Error::ReadOnlyField {
                location,
                entity: entity.name.to_string(),
                field: name.to_string(),
            });
        }
        env.check_creatable(entity, name, &location)?;
        let Some(info) = entity.field(name) else {
            continue;
        };

        let literal = match (&info.kind, value) {
            (_, Value::Null) if info.nullable => Literal::Null,
            (_, Value::Null) => {
                return Err(Error::TypeMismatch {
                    location,
                    value: Value::Null,
                    expected: format!("non-null value for '{name}'"),
                })
            }
            (FieldKind::Scalar { scalar_type }, value) => {
                translate_json_value(value, *scalar_type, &location)?
            }
            (FieldKind::ForeignKey { target } | FieldKind::OneToOne { target }, value) => {
                let key_type = key_type(env, target.as_str(), &location)?;
                translate_json_value(value, key_type, &location)?
            }
            (FieldKind::ManyToMany { target }, Value::Array(items)) => {
                let key_type = key_type(env, target.as_str(), &location)?;
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| translate_json_value(item, key_type, &location.index(index)))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Literal::List)?
            }
            (FieldKind::ManyToMany { target }, value) => {
                return Err(Error::TypeMismatch {
                    location,
                    value: value.clone(),
                    expected: format!("list of '{target}' keys"),
                })
            }
            (FieldKind::Reverse { .. }, _) => {
                return Err(Error::ReadOnlyField {
                    location,
                    entity: entity.name.to_string(),
                    field: name.to_string(),
                })
            }
        };
        values.insert(FieldName::new(name), literal);
    }

    Ok(WriteOperation {
        entity: entity.name.clone(),
        values,
        guard: vec![],
    })
}

fn key_type(env: &Env, target: &str, location: &NodeLocation) -> Result<ScalarType, Error> {
    env.registry
        .key_type(target)
        .map_err(|err| Error::from_metadata(err, location))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create(entity: &str, data: Value) -> Result<WriteOperation, Error> {
        let registry = tests_common::blog_registry();
        let env = Env::new(&registry, entity, &NodeLocation::ast())?;
        let data: IndexMap<String, Value> = serde_json::from_value(data).unwrap();
        translate_create(&env, &data, &NodeLocation::ast().field("data"))
    }

    #[test]
    fn relations_take_the_related_key() {
        let write = create(
            "blog.post",
            json!({"title": "New", "published": false, "created": "2024-05-01T10:00:00Z", "author": 1, "tags": [1, 2]}),
        )
        .unwrap();
        assert_eq!(write.values["author"], Literal::Int(1));
        assert_eq!(
            write.values["tags"],
            Literal::List(vec![Literal::Int(1), Literal::Int(2)])
        );
        assert!(write.guard.is_empty());
    }

    #[test]
    fn relation_keys_are_typed_by_the_related_key() {
        let error = create("org.profile", json!({"user": 7, "bio": "hi"})).unwrap_err();
        assert!(matches!(error, Error::TypeMismatch { ref expected, .. } if expected == "uuid"));
    }

    #[test]
    fn reverse_relations_are_read_only() {
        let error = create("blog.author", json!({"name": "Cy", "posts": [1]})).unwrap_err();
        assert_eq!(
            error,
            Error::ReadOnlyField {
                location: NodeLocation::ast().field("data").key("posts"),
                entity: "blog.author".to_string(),
                field: "posts".to_string(),
            }
        );
    }

    #[test]
    fn configured_read_only_and_generated_fields_cannot_be_written() {
        let error = create("org.user", json!({"username": "eve", "role": "admin"})).unwrap_err();
        assert!(matches!(error, Error::ReadOnlyField { ref field, .. } if field == "role"));
        let error = create("blog.tag", json!({"pk": 9, "name": "x"})).unwrap_err();
        assert!(matches!(error, Error::ReadOnlyField { ref field, .. } if field == "id"));
    }

    #[test]
    fn nulls_need_nullable_fields() {
        let write = create("blog.author", json!({"name": "Cy", "email": null})).unwrap();
        assert_eq!(write.values["email"], Literal::Null);
        let error = create("blog.author", json!({"name": null})).unwrap_err();
        assert!(matches!(error, Error::TypeMismatch { .. }));
    }

    #[test]
    fn unexposed_fields_cannot_be_written() {
        let error = create("blog.post", json!({"comments": [1]})).unwrap_err();
        assert!(matches!(error, Error::FieldNotAllowed { .. }));
    }
}
