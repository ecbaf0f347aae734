//! Base filters and custom querysets read from the configuration.

use std::collections::BTreeMap;

use query_engine_metadata::metadata::EntityName;
use query_engine_predicate::predicate::ast::{PassOrigin, Query};
use query_engine_predicate::predicate::helpers::simple_query;
use query_engine_translation::ast::Node;
use query_engine_translation::request::Requester;
use query_engine_translation::translation::error::{Error, NodeLocation};
use query_engine_translation::translation::helpers::Env;
use query_engine_translation::translation::query::filtering::translate_query;
use query_engine_translation::translation::query::{BaseQueryProvider, CustomQueryset};

/// Every query of an entity starts from its configured base filter, or
/// from all rows when it has none.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredBaseQueries {
    filters: BTreeMap<EntityName, Node>,
}

impl ConfiguredBaseQueries {
    pub fn new(filters: BTreeMap<EntityName, Node>) -> Self {
        ConfiguredBaseQueries { filters }
    }
}

impl BaseQueryProvider for ConfiguredBaseQueries {
    fn default_query(&self, env: &Env) -> Result<Query, Error> {
        let mut query = simple_query(env.root.name.clone());
        if let Some(filter) = self.filters.get(&env.root.name) {
            let translated = translate_query(
                env,
                filter,
                &PassOrigin::Base,
                &NodeLocation::root("base_filters").key(env.root.name.as_str()),
            )?;
            query.passes = translated.passes;
            if let Some(order_by) = translated.order_by {
                query.order_by = order_by;
            }
        }
        Ok(query)
    }
}

/// A custom queryset declared in the configuration.
#[derive(Debug, Clone)]
pub struct ConfiguredQueryset {
    pub name: String,
    pub entity: EntityName,
    pub ast: Node,
}

impl CustomQueryset for ConfiguredQueryset {
    fn entity(&self) -> &EntityName {
        &self.entity
    }

    fn custom_query(&self, env: &Env, _requester: &Requester) -> Result<Query, Error> {
        let translated = translate_query(
            env,
            &self.ast,
            &PassOrigin::Custom(self.name.clone()),
            &NodeLocation::root("custom_querysets").key(&self.name).field("ast"),
        )?;
        let mut query = simple_query(env.root.name.clone());
        query.passes = translated.passes;
        if let Some(order_by) = translated.order_by {
            query.order_by = order_by;
        }
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_engine_predicate::predicate::ast::PassKind;
    use serde_json::json;

    #[test]
    fn base_filters_start_the_query() {
        let registry = tests_common::blog_registry();
        let filters = BTreeMap::from([(
            EntityName::from("blog.comment"),
            serde_json::from_value(json!({"type": "exclude", "conditions": {"hidden": true}}))
                .unwrap(),
        )]);
        let base = ConfiguredBaseQueries::new(filters);

        let env = Env::new(&registry, "blog.comment", &NodeLocation::ast()).unwrap();
        let query = base.default_query(&env).unwrap();
        assert_eq!(query.passes.len(), 1);
        assert_eq!(query.passes[0].kind, PassKind::Exclude);
        assert_eq!(query.passes[0].origin, PassOrigin::Base);

        let env = Env::new(&registry, "blog.post", &NodeLocation::ast()).unwrap();
        assert!(base.default_query(&env).unwrap().passes.is_empty());
    }

    #[test]
    fn custom_querysets_carry_their_ordering() {
        let registry = tests_common::blog_registry();
        let queryset = ConfiguredQueryset {
            name: "highly_rated".to_string(),
            entity: EntityName::from("blog.post"),
            ast: serde_json::from_value(json!({"type": "chain", "children": [
                {"type": "filter", "conditions": {"rating__gte": 4.0}},
                {"type": "sort", "fields": ["-rating"]}
            ]}))
            .unwrap(),
        };
        let env = Env::new(&registry, "blog.post", &NodeLocation::ast()).unwrap();
        let query = queryset
            .custom_query(&env, &Requester::anonymous())
            .unwrap();
        assert_eq!(query.to_string(), "FROM blog.post\nFILTER [custom:highly_rated] rating gte 4\nORDER BY -rating");
    }
}
