//! Convert a parsed configuration into the runtime configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use query_engine_metadata::metadata::Registry;
use query_engine_translation::request::Requester;
use query_engine_translation::translation::error::{Error, NodeLocation};
use query_engine_translation::translation::helpers::Env;
use query_engine_translation::translation::query::{
    BaseQueryProvider, CustomQueryset, EngineSettings,
};

use crate::base_queries::{ConfiguredBaseQueries, ConfiguredQueryset};
use crate::configuration::Configuration;
use crate::environment::{Environment, DEFAULT_LIMIT_VARIABLE, MAX_DEPTH_VARIABLE};
use crate::error::MakeRuntimeConfigurationError;
use crate::permissions::{ConfiguredPermissions, Policy};
use crate::version1::ParsedConfiguration;

/// Build the registry and check every filter of the configuration against
/// it, so that a configuration mistake fails at startup rather than on the
/// first request that touches it.
pub fn make_runtime_configuration(
    parsed_config: ParsedConfiguration,
    environment: impl Environment,
) -> Result<Configuration, MakeRuntimeConfigurationError> {
    let settings = apply_environment(parsed_config.settings, &environment)?;
    let registry = Arc::new(Registry::build(parsed_config.entities)?);

    for (entity, policies) in &parsed_config.permissions {
        if !registry.contains(entity.as_str()) {
            return Err(MakeRuntimeConfigurationError::PermissionsForUnknownEntity(
                entity.to_string(),
            ));
        }
        let env = env_for(&registry, entity.as_str()).map_err(|error| {
            MakeRuntimeConfigurationError::InvalidPolicy {
                entity: entity.to_string(),
                index: 0,
                error,
            }
        })?;
        for (index, policy) in policies.iter().enumerate() {
            check_policy(&env, policy, index).map_err(|error| {
                MakeRuntimeConfigurationError::InvalidPolicy {
                    entity: entity.to_string(),
                    index,
                    error,
                }
            })?;
        }
    }

    let base_queries = ConfiguredBaseQueries::new(parsed_config.base_filters.clone());
    for entity in parsed_config.base_filters.keys() {
        env_for(&registry, entity.as_str())
            .and_then(|env| base_queries.default_query(&env))
            .map_err(|error| MakeRuntimeConfigurationError::InvalidBaseFilter {
                entity: entity.to_string(),
                error,
            })?;
    }

    let mut custom_querysets: BTreeMap<String, Box<dyn CustomQueryset>> = BTreeMap::new();
    for (name, config) in parsed_config.custom_querysets {
        let queryset = ConfiguredQueryset {
            name: name.clone(),
            entity: config.entity,
            ast: config.ast,
        };
        env_for(&registry, queryset.entity.as_str())
            .and_then(|env| queryset.custom_query(&env, &Requester::anonymous()))
            .map_err(|error| MakeRuntimeConfigurationError::InvalidCustomQueryset {
                name: name.clone(),
                error,
            })?;
        custom_querysets.insert(name, Box::new(queryset));
    }

    tracing::info!(
        entities = registry.entities().count(),
        custom_querysets = custom_querysets.len(),
        max_depth = settings.max_depth,
        "runtime configuration ready"
    );

    Ok(Configuration {
        registry,
        settings,
        permissions: ConfiguredPermissions::new(parsed_config.permissions),
        base_queries,
        custom_querysets,
    })
}

/// Translate the filter and exclude of a policy, and check that the fields
/// it names exist on the entity.
fn check_policy(env: &Env, policy: &Policy, index: usize) -> Result<(), Error> {
    for (part, node) in [("filter", &policy.filter), ("exclude", &policy.exclude)] {
        let Some(node) = node else {
            continue;
        };
        // `$requester.id` stands in as null here; only its type can be wrong.
        match ConfiguredPermissions::policy_predicate(env, node, index, part, &Requester::anonymous())
        {
            Ok(_) | Err(Error::TypeMismatch { .. }) => {}
            Err(error) => return Err(error),
        }
    }
    for (part, fields) in [
        ("visible_fields", &policy.visible_fields),
        ("create_fields", &policy.create_fields),
    ] {
        for field in fields.iter().flatten() {
            if env.root.field(field.as_str()).is_none() {
                return Err(Error::FieldNotFound {
                    location: NodeLocation::root("permissions")
                        .key(env.root.name.as_str())
                        .index(index)
                        .field(part),
                    entity: env.root.name.to_string(),
                    field: field.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn env_for<'a>(registry: &'a Registry, entity: &str) -> Result<Env<'a>, Error> {
    Env::new(registry, entity, &NodeLocation::root("entities"))
}

/// Override the configured settings with the environment. The default limit
/// may be set to `none` to return every row by default.
fn apply_environment(
    mut settings: EngineSettings,
    environment: &impl Environment,
) -> Result<EngineSettings, MakeRuntimeConfigurationError> {
    if let Some(value) = environment.read(MAX_DEPTH_VARIABLE)? {
        settings.max_depth = parse_u32(MAX_DEPTH_VARIABLE, &value)?;
    }
    if let Some(value) = environment.read(DEFAULT_LIMIT_VARIABLE)? {
        settings.default_limit = if value.trim().eq_ignore_ascii_case("none") {
            None
        } else {
            Some(parse_u32(DEFAULT_LIMIT_VARIABLE, &value)?)
        };
    }
    Ok(settings)
}

fn parse_u32(variable: &str, value: &str) -> Result<u32, MakeRuntimeConfigurationError> {
    value
        .trim()
        .parse()
        .map_err(|err: std::num::ParseIntError| {
            MakeRuntimeConfigurationError::InvalidEnvironmentVariable {
                variable: variable.to_string(),
                message: err.to_string(),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::FixedEnvironment;
    use crate::version1::parse_configuration;
    use serde_json::json;

    async fn fixture() -> ParsedConfiguration {
        parse_configuration(tests_common::blog_configuration_dir())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn builds_the_fixture_configuration() {
        let configuration =
            make_runtime_configuration(fixture().await, FixedEnvironment::default()).unwrap();
        assert_eq!(configuration.settings.max_depth, 3);
        assert_eq!(configuration.custom_querysets.len(), 2);
    }

    #[tokio::test]
    async fn the_environment_overrides_settings() {
        let environment = FixedEnvironment::from([
            (MAX_DEPTH_VARIABLE.to_string(), "1".to_string()),
            (DEFAULT_LIMIT_VARIABLE.to_string(), "none".to_string()),
        ]);
        let configuration = make_runtime_configuration(fixture().await, environment).unwrap();
        assert_eq!(configuration.settings.max_depth, 1);
        assert_eq!(configuration.settings.default_limit, None);

        let environment =
            FixedEnvironment::from([(MAX_DEPTH_VARIABLE.to_string(), "deep".to_string())]);
        let error = make_runtime_configuration(fixture().await, environment).unwrap_err();
        assert!(matches!(
            error,
            MakeRuntimeConfigurationError::InvalidEnvironmentVariable { .. }
        ));
    }

    #[tokio::test]
    async fn policies_must_refer_to_exposed_fields() {
        let mut parsed = fixture().await;
        parsed.permissions.insert(
            "blog.tag".into(),
            vec![serde_json::from_value(json!({
                "actions": ["read"],
                "filter": {"type": "compare", "field": "posts__title", "value": "x"}
            }))
            .unwrap()],
        );
        let error = make_runtime_configuration(parsed, FixedEnvironment::default()).unwrap_err();
        assert!(matches!(
            error,
            MakeRuntimeConfigurationError::InvalidPolicy { index: 0, .. }
        ));
    }

    #[tokio::test]
    async fn policy_excludes_and_field_lists_are_checked() {
        let mut parsed = fixture().await;
        parsed.permissions.insert(
            "blog.tag".into(),
            vec![serde_json::from_value(json!({
                "actions": ["read"],
                "exclude": {"type": "compare", "field": "colour", "value": "red"}
            }))
            .unwrap()],
        );
        assert!(make_runtime_configuration(parsed, FixedEnvironment::default()).is_err());

        let mut parsed = fixture().await;
        parsed.permissions.insert(
            "blog.tag".into(),
            vec![
                serde_json::from_value(json!({"actions": ["read"]})).unwrap(),
                serde_json::from_value(json!({
                    "actions": ["read"],
                    "visible_fields": ["id", "colour"]
                }))
                .unwrap(),
            ],
        );
        let error = make_runtime_configuration(parsed, FixedEnvironment::default()).unwrap_err();
        let MakeRuntimeConfigurationError::InvalidPolicy { index, error, .. } = error else {
            panic!("expected an invalid policy, got {error:?}");
        };
        assert_eq!(index, 1);
        assert_eq!(
            error,
            Error::FieldNotFound {
                location: NodeLocation::root("permissions")
                    .key("blog.tag")
                    .index(1)
                    .field("visible_fields"),
                entity: "blog.tag".to_string(),
                field: "colour".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn custom_querysets_are_checked_against_their_entity() {
        let mut parsed = fixture().await;
        parsed.custom_querysets.insert(
            "broken".to_string(),
            serde_json::from_value(json!({
                "entity": "blog.tag",
                "ast": {"type": "filter", "conditions": {"rating__gte": 1}}
            }))
            .unwrap(),
        );
        let error = make_runtime_configuration(parsed, FixedEnvironment::default()).unwrap_err();
        assert!(matches!(
            error,
            MakeRuntimeConfigurationError::InvalidCustomQueryset { ref name, .. } if name == "broken"
        ));
    }

    #[tokio::test]
    async fn permissions_for_unknown_entities_are_rejected() {
        let mut parsed = fixture().await;
        parsed.permissions.insert("audit.entry".into(), vec![]);
        let error = make_runtime_configuration(parsed, FixedEnvironment::default()).unwrap_err();
        assert!(matches!(
            error,
            MakeRuntimeConfigurationError::PermissionsForUnknownEntity(_)
        ));
    }
}
