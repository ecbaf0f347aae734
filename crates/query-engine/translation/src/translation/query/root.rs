//! Assemble an authorized query from the base query, a custom queryset, the
//! permission predicate and the client's query tree.

use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use query_engine_metadata::metadata::{EntityDescriptor, EntityName, FieldName, Registry};
use query_engine_predicate::predicate::ast::{
    Aggregate, FieldSelection, OrderByElement, OrderDirection, PassOrigin, PermissionPredicate,
    Query, WriteOperation,
};
use query_engine_predicate::predicate::helpers::{empty_limit, permission_pass, simple_query};

use super::{aggregates, fields, filtering, search};
use crate::ast::Node;
use crate::request::{Action, Operation, QueryRequest, Requester, SerializerOptions};
use crate::translation::error::{Error, NodeLocation};
use crate::translation::helpers::{Access, Env};
use crate::translation::mutation;

/// Decides what a requester may see and do.
pub trait PermissionProvider: Send + Sync {
    /// The condition rows of `entity` must satisfy to be visible to `requester`.
    fn predicate_for(
        &self,
        env: &Env,
        requester: &Requester,
    ) -> Result<PermissionPredicate, Error>;

    /// The actions `requester` may perform on `entity`.
    fn allowed_actions(&self, entity: &EntityDescriptor, requester: &Requester) -> BTreeSet<Action>;

    /// The fields of `entity` the requester may read, filter and sort on.
    fn visible_fields(&self, _entity: &EntityDescriptor, _requester: &Requester) -> FieldAccess {
        FieldAccess::All
    }

    /// The fields the requester may set when creating a row of `entity`.
    fn create_fields(&self, _entity: &EntityDescriptor, _requester: &Requester) -> FieldAccess {
        FieldAccess::All
    }
}

/// A set of fields a requester has access to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldAccess {
    #[default]
    All,
    Only(BTreeSet<FieldName>),
}

impl FieldAccess {
    pub fn allows(&self, field: &str) -> bool {
        match self {
            FieldAccess::All => true,
            FieldAccess::Only(fields) => fields.iter().any(|name| name.as_str() == field),
        }
    }

    #[must_use]
    pub fn union(self, other: FieldAccess) -> FieldAccess {
        match (self, other) {
            (FieldAccess::Only(mut left), FieldAccess::Only(right)) => {
                left.extend(right);
                FieldAccess::Only(left)
            }
            _ => FieldAccess::All,
        }
    }
}

/// Supplies the query every request for an entity starts from.
pub trait BaseQueryProvider: Send + Sync {
    fn default_query(&self, env: &Env) -> Result<Query, Error>;
}

/// A named query a request may opt into, narrowing the base query.
pub trait CustomQueryset: Send + Sync {
    /// The entity the queryset applies to.
    fn entity(&self) -> &EntityName;

    fn custom_query(&self, env: &Env, requester: &Requester) -> Result<Query, Error>;
}

/// Every row of the entity.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBaseQuery;

impl BaseQueryProvider for DefaultBaseQuery {
    fn default_query(&self, env: &Env) -> Result<Query, Error> {
        Ok(simple_query(env.root.name.clone()))
    }
}

/// Limits applied to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EngineSettings {
    /// The deepest relation traversal a request may ask for.
    #[serde(default = "max_depth_default")]
    pub max_depth: u32,
    /// The number of rows returned when a request sets no limit.
    #[serde(default = "default_limit_default")]
    pub default_limit: Option<u32>,
}

fn max_depth_default() -> u32 {
    3
}

#[allow(clippy::unnecessary_wraps)]
fn default_limit_default() -> Option<u32> {
    Some(100)
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            max_depth: max_depth_default(),
            default_limit: default_limit_default(),
        }
    }
}

/// How many rows a read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    List,
    /// Exactly one row must match. The query fetches two to tell.
    Get,
    First,
    Last,
}

/// What to run for a request, and what to return.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Plan {
    Read {
        query: Query,
        selection: FieldSelection,
        mode: ReadMode,
    },
    Exists {
        query: Query,
    },
    Aggregate {
        query: Query,
        aggregates: Vec<Aggregate>,
        /// Return the value of the only aggregate instead of an object
        /// keyed by alias.
        single_value: bool,
    },
    Create {
        write: WriteOperation,
        selection: FieldSelection,
    },
}

impl Plan {
    /// The fields to return, for plans that return rows.
    pub fn selection(&self) -> Option<&FieldSelection> {
        match self {
            Plan::Read { selection, .. } | Plan::Create { selection, .. } => Some(selection),
            Plan::Exists { .. } | Plan::Aggregate { .. } => None,
        }
    }
}

/// Combines the layers of a query. Each layer narrows the result; none can
/// widen it.
pub struct Assembler<'a> {
    pub registry: &'a Registry,
    pub permissions: &'a dyn PermissionProvider,
    pub base: &'a dyn BaseQueryProvider,
    pub custom_querysets: &'a BTreeMap<String, Box<dyn CustomQueryset>>,
    pub settings: EngineSettings,
}

impl<'a> Assembler<'a> {
    /// Translate a request into a plan. A root `create` node plans a write,
    /// anything else plans a read shaped by the requested operation.
    pub fn plan(&self, request: &QueryRequest, requester: &Requester) -> Result<Plan, Error> {
        let env = Env::new(self.registry, &request.entity, &NodeLocation::root("entity"))?;
        let client = self.client_env(&env, requester);
        match (&request.ast, &request.operation) {
            (Some(Node::Create { data }), Operation::List) => {
                let write = self.assemble_create(&env, &client, data, requester)?;
                let selection = self.resolve_selection(&client, &request.serializer_options)?;
                Ok(Plan::Create { write, selection })
            }
            (Some(Node::Create { .. }), operation) => Err(Error::MisplacedNode {
                location: NodeLocation::ast(),
                node: "create",
                parent: operation.name(),
            }),
            (ast, operation) => {
                let query = self.assemble_read(&env, request, ast.as_ref(), requester)?;
                self.shape_read(&env, &client, query, request, operation)
            }
        }
    }

    /// The root entity's Env, checking the client's paths against the
    /// requester's permissions.
    fn client_env<'e>(&self, env: &Env<'e>, requester: &'e Requester) -> Env<'e>
    where
        'a: 'e,
    {
        env.clone().with_access(Access {
            permissions: self.permissions,
            requester,
        })
    }

    fn check_action(&self, env: &Env, requester: &Requester, action: Action) -> Result<(), Error> {
        if self
            .permissions
            .allowed_actions(env.root, requester)
            .contains(&action)
        {
            Ok(())
        } else {
            tracing::info!(entity = %env.root.name, %action, "action not permitted");
            Err(Error::PermissionDenied {
                entity: env.root.name.to_string(),
                action,
            })
        }
    }

    fn permission(
        &self,
        env: &Env,
        requester: &Requester,
        action: Action,
    ) -> Result<PermissionPredicate, Error> {
        match self.permissions.predicate_for(env, requester)? {
            PermissionPredicate::Denied => Err(Error::PermissionDenied {
                entity: env.root.name.to_string(),
                action,
            }),
            permission => Ok(permission),
        }
    }

    /// Resolution order: the default query, then the custom queryset, then
    /// the permission predicate, then the client's tree, then search.
    ///
    /// The default query, the queryset and the permission predicate are
    /// trusted. The client's tree and search only reach the fields and
    /// related rows the requester may see.
    pub fn assemble_read(
        &self,
        env: &Env,
        request: &QueryRequest,
        ast: Option<&Node>,
        requester: &Requester,
    ) -> Result<Query, Error> {
        self.check_action(env, requester, Action::Read)?;

        let mut query = self.base.default_query(env)?;
        if query.entity != env.root.name {
            return Err(Error::Internal(format!(
                "the default query of '{}' is for '{}'",
                env.root.name, query.entity
            )));
        }

        if let Some(name) = &request.custom_queryset {
            let custom = self.custom_querysets.get(name).ok_or_else(|| {
                Error::CustomQuerysetNotFound {
                    name: name.clone(),
                }
            })?;
            if custom.entity() != &env.root.name {
                return Err(Error::CustomQuerysetMismatch {
                    name: name.clone(),
                    registered: custom.entity().to_string(),
                    requested: env.root.name.to_string(),
                });
            }
            let custom_query = custom.custom_query(env, requester)?;
            let origin = PassOrigin::Custom(name.clone());
            query
                .passes
                .extend(custom_query.passes.into_iter().map(|mut pass| {
                    pass.origin = origin.clone();
                    pass
                }));
            if !custom_query.order_by.elements.is_empty() {
                query.order_by = custom_query.order_by;
            }
        }

        let permission = self.permission(env, requester, Action::Read)?;
        query.passes.push(permission_pass(&permission));

        let client = self.client_env(env, requester);
        if let Some(ast) = ast {
            let translated =
                filtering::translate_query(&client, ast, &PassOrigin::Client, &NodeLocation::ast())?;
            query.passes.extend(translated.passes);
            if let Some(order_by) = translated.order_by {
                query.order_by = order_by;
            }
        }

        if let Some(search) = &request.search {
            query.passes.extend(search::translate_search(&client, search));
        }

        let options = &request.serializer_options;
        query.limit.limit = options.limit.or(self.settings.default_limit);
        query.limit.offset = options.offset;

        if !query.has_permission_pass() {
            return Err(Error::Internal(format!(
                "the query for '{}' lost its permission pass",
                env.root.name
            )));
        }

        tracing::debug!(query = %query, "assembled query");
        Ok(query)
    }

    /// Fit an assembled read to its operation. `get` fetches two rows so a
    /// second match can be told apart; `first` and `last` fall back to the
    /// primary key when nothing orders the rows; `exists` needs one row;
    /// aggregates summarize every row, ignoring limit and offset.
    fn shape_read(
        &self,
        env: &Env,
        client: &Env,
        mut query: Query,
        request: &QueryRequest,
        operation: &Operation,
    ) -> Result<Plan, Error> {
        let location = NodeLocation::root("operation");
        if let Some(requested) = operation.aggregates() {
            let aggregates = aggregates::translate_aggregates(client, &requested, &location)?;
            query.limit = empty_limit();
            return Ok(Plan::Aggregate {
                query,
                aggregates,
                single_value: !matches!(operation, Operation::Aggregate { .. }),
            });
        }

        let mode = match operation {
            Operation::Exists => {
                query.limit.limit = Some(1);
                query.limit.offset = None;
                return Ok(Plan::Exists { query });
            }
            Operation::Get => {
                query.limit.limit = Some(2);
                query.limit.offset = None;
                ReadMode::Get
            }
            Operation::First | Operation::Last => {
                if query.order_by.elements.is_empty() {
                    let key = env.resolve_path(env.root.primary_key().as_str(), &location)?;
                    query.order_by.elements.push(OrderByElement {
                        path: key.path,
                        direction: OrderDirection::Asc,
                    });
                }
                if *operation == Operation::Last {
                    for element in &mut query.order_by.elements {
                        element.direction = match element.direction {
                            OrderDirection::Asc => OrderDirection::Desc,
                            OrderDirection::Desc => OrderDirection::Asc,
                        };
                    }
                }
                query.limit.limit = Some(1);
                if *operation == Operation::First {
                    ReadMode::First
                } else {
                    ReadMode::Last
                }
            }
            _ => ReadMode::List,
        };
        let selection = self.resolve_selection(client, &request.serializer_options)?;
        Ok(Plan::Read {
            query,
            selection,
            mode,
        })
    }

    /// Validate a create and guard it with the permission predicate: the new
    /// row must be visible to the requester, otherwise it is not written.
    /// Only the fields the requester may create with can be set.
    pub fn assemble_create(
        &self,
        env: &Env,
        client: &Env,
        data: &indexmap::IndexMap<String, serde_json::Value>,
        requester: &Requester,
    ) -> Result<WriteOperation, Error> {
        self.check_action(env, requester, Action::Create)?;
        let mut write =
            mutation::translate_create(client, data, &NodeLocation::ast().field("data"))?;
        let permission = self.permission(env, requester, Action::Create)?;
        write.guard.push(permission_pass(&permission));
        tracing::debug!(write = %write, "assembled write");
        Ok(write)
    }

    /// The fields to return: the explicit list when given, otherwise every
    /// visible field up to the requested depth, clamped to the maximum.
    pub fn resolve_selection(
        &self,
        env: &Env,
        options: &SerializerOptions,
    ) -> Result<FieldSelection, Error> {
        match &options.fields {
            Some(paths) => fields::resolve_explicit_fields(
                env,
                paths,
                self.settings.max_depth,
                &NodeLocation::root("serializerOptions").field("fields"),
            ),
            None => {
                let requested = options.depth.unwrap_or(0);
                let depth = requested.min(self.settings.max_depth);
                if depth < requested {
                    tracing::debug!(requested, depth, "clamped requested depth");
                }
                fields::resolve_fields(env, depth)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_engine_metadata::metadata::Lookup;
    use query_engine_predicate::predicate::ast::{Literal, PassKind, Predicate};
    use query_engine_predicate::predicate::helpers::{compare, filter_pass, path_from_str};
    use serde_json::json;

    /// Grants `actions` and places `predicate` on every entity.
    struct Fixed {
        predicate: PermissionPredicate,
        actions: BTreeSet<Action>,
    }

    impl PermissionProvider for Fixed {
        fn predicate_for(&self, _: &Env, _: &Requester) -> Result<PermissionPredicate, Error> {
            Ok(self.predicate.clone())
        }

        fn allowed_actions(&self, _: &EntityDescriptor, _: &Requester) -> BTreeSet<Action> {
            self.actions.clone()
        }
    }

    fn published() -> PermissionPredicate {
        PermissionPredicate::Restricted(compare(
            path_from_str("published"),
            Lookup::Exact,
            Literal::Bool(true),
        ))
    }

    fn read_only(predicate: PermissionPredicate) -> Fixed {
        Fixed {
            predicate,
            actions: BTreeSet::from([Action::Read]),
        }
    }

    struct Rated(EntityName);

    impl CustomQueryset for Rated {
        fn entity(&self) -> &EntityName {
            &self.0
        }

        fn custom_query(&self, env: &Env, _: &Requester) -> Result<Query, Error> {
            let mut query = simple_query(env.root.name.clone());
            query.passes.push(filter_pass(
                PassOrigin::Base,
                compare(path_from_str("rating"), Lookup::GreaterThanOrEqualTo, Literal::Float(4.0)),
            ));
            Ok(query)
        }
    }

    fn plan(permissions: &Fixed, request: serde_json::Value) -> Result<Plan, Error> {
        let registry = tests_common::blog_registry();
        let mut custom: BTreeMap<String, Box<dyn CustomQueryset>> = BTreeMap::new();
        custom.insert(
            "rated".to_string(),
            Box::new(Rated(EntityName::from("blog.post"))),
        );
        let assembler = Assembler {
            registry: &registry,
            permissions,
            base: &DefaultBaseQuery,
            custom_querysets: &custom,
            settings: EngineSettings::default(),
        };
        let request: QueryRequest = serde_json::from_value(request).unwrap();
        assembler.plan(&request, &Requester::anonymous())
    }

    fn read_query(plan: Plan) -> Query {
        match plan {
            Plan::Read { query, .. } | Plan::Exists { query } | Plan::Aggregate { query, .. } => {
                query
            }
            Plan::Create { .. } => panic!("expected a read plan"),
        }
    }

    #[test]
    fn layers_are_applied_in_order() {
        let query = read_query(
            plan(
                &read_only(published()),
                json!({
                    "entity": "blog.post",
                    "custom_queryset": "rated",
                    "ast": {"type": "filter", "conditions": {"title__icontains": "rust"}},
                    "search": {"searchQuery": "async"}
                }),
            )
            .unwrap(),
        );
        let origins: Vec<String> = query.passes.iter().map(|pass| pass.origin.to_string()).collect();
        assert_eq!(origins, vec!["custom:rated", "permission", "client", "search"]);
        assert_eq!(query.limit.limit, Some(100));
    }

    #[test]
    fn unrestricted_requesters_still_get_a_permission_pass() {
        let query = read_query(
            plan(
                &read_only(PermissionPredicate::Unrestricted),
                json!({"entity": "blog.post"}),
            )
            .unwrap(),
        );
        assert!(query.has_permission_pass());
        assert_eq!(query.passes[0].predicate, Predicate::And(vec![]));
        assert_eq!(query.passes[0].kind, PassKind::Filter);
    }

    #[test]
    fn denied_requesters_are_refused() {
        let error = plan(
            &read_only(PermissionPredicate::Denied),
            json!({"entity": "blog.post"}),
        )
        .unwrap_err();
        assert!(matches!(error, Error::PermissionDenied { action: Action::Read, .. }));
    }

    #[test]
    fn creates_need_the_create_action() {
        let error = plan(
            &read_only(PermissionPredicate::Unrestricted),
            json!({"entity": "blog.tag", "ast": {"type": "create", "data": {"name": "go"}}}),
        )
        .unwrap_err();
        assert_eq!(
            error,
            Error::PermissionDenied {
                entity: "blog.tag".to_string(),
                action: Action::Create,
            }
        );
    }

    #[test]
    fn creates_are_guarded_by_the_permission_predicate() {
        let permissions = Fixed {
            predicate: published(),
            actions: BTreeSet::from([Action::Read, Action::Create]),
        };
        let plan = plan(
            &permissions,
            json!({"entity": "blog.tag", "ast": {"type": "create", "data": {"name": "go"}}}),
        )
        .unwrap();
        let Plan::Create { write, .. } = plan else {
            panic!("expected a create plan");
        };
        assert_eq!(write.guard.len(), 1);
        assert_eq!(write.guard[0].origin, PassOrigin::Permission);
    }

    #[test]
    fn custom_querysets_must_exist_and_match_the_entity() {
        let permissions = read_only(PermissionPredicate::Unrestricted);
        let error = plan(
            &permissions,
            json!({"entity": "blog.post", "custom_queryset": "missing"}),
        )
        .unwrap_err();
        assert!(matches!(error, Error::CustomQuerysetNotFound { .. }));
        let error = plan(
            &permissions,
            json!({"entity": "blog.tag", "custom_queryset": "rated"}),
        )
        .unwrap_err();
        assert!(matches!(error, Error::CustomQuerysetMismatch { .. }));
    }

    #[test]
    fn requested_depth_is_clamped() {
        let plan = plan(
            &read_only(PermissionPredicate::Unrestricted),
            json!({"entity": "blog.author", "serializerOptions": {"depth": 10}}),
        )
        .unwrap();
        assert_eq!(plan.selection().unwrap().depth(), 3);
    }

    #[test]
    fn first_and_last_order_by_the_key_when_unordered() {
        let permissions = read_only(PermissionPredicate::Unrestricted);
        let first = read_query(
            plan(
                &permissions,
                json!({"entity": "blog.post", "operation": {"type": "first"}}),
            )
            .unwrap(),
        );
        assert_eq!(first.order_by.elements[0].to_string(), "id");
        assert_eq!(first.limit.limit, Some(1));

        let last = read_query(
            plan(
                &permissions,
                json!({
                    "entity": "blog.post",
                    "ast": {"type": "sort", "fields": ["-created", "title"]},
                    "operation": {"type": "last"}
                }),
            )
            .unwrap(),
        );
        let order: Vec<String> = last.order_by.elements.iter().map(ToString::to_string).collect();
        assert_eq!(order, vec!["created", "-title"]);
    }

    #[test]
    fn aggregates_ignore_limits_and_select_nothing() {
        let plan = plan(
            &read_only(PermissionPredicate::Unrestricted),
            json!({
                "entity": "blog.post",
                "operation": {"type": "count"},
                "serializerOptions": {"limit": 1}
            }),
        )
        .unwrap();
        assert!(plan.selection().is_none());
        let Plan::Aggregate { query, aggregates, single_value } = plan else {
            panic!("expected an aggregate plan");
        };
        assert_eq!(query.limit.limit, None);
        assert_eq!(aggregates[0].to_string(), "count(*) AS count");
        assert!(single_value);
    }

    #[test]
    fn get_fetches_two_rows_to_detect_duplicates() {
        let plan = plan(
            &read_only(PermissionPredicate::Unrestricted),
            json!({"entity": "blog.post", "operation": {"type": "get"}}),
        )
        .unwrap();
        let Plan::Read { query, mode, .. } = plan else {
            panic!("expected a read plan");
        };
        assert_eq!(mode, ReadMode::Get);
        assert_eq!(query.limit.limit, Some(2));
    }

    #[test]
    fn creates_cannot_be_combined_with_other_operations() {
        let error = plan(
            &read_only(PermissionPredicate::Unrestricted),
            json!({
                "entity": "blog.tag",
                "ast": {"type": "create", "data": {"name": "go"}},
                "operation": {"type": "exists"}
            }),
        )
        .unwrap_err();
        assert!(matches!(error, Error::MisplacedNode { node: "create", parent: "exists", .. }));
    }

    /// Hides `published` and the authors of posts from everyone.
    struct HidesAuthors;

    impl PermissionProvider for HidesAuthors {
        fn predicate_for(&self, _: &Env, _: &Requester) -> Result<PermissionPredicate, Error> {
            Ok(PermissionPredicate::Unrestricted)
        }

        fn allowed_actions(&self, entity: &EntityDescriptor, _: &Requester) -> BTreeSet<Action> {
            if entity.name.as_str() == "blog.author" {
                BTreeSet::new()
            } else {
                BTreeSet::from([Action::Read])
            }
        }

        fn visible_fields(&self, entity: &EntityDescriptor, _: &Requester) -> FieldAccess {
            if entity.name.as_str() == "blog.post" {
                FieldAccess::Only(["title", "author", "tags"].into_iter().map(FieldName::from).collect())
            } else {
                FieldAccess::All
            }
        }
    }

    fn plan_hiding_authors(request: serde_json::Value) -> Result<Plan, Error> {
        let registry = tests_common::blog_registry();
        let custom = BTreeMap::new();
        let assembler = Assembler {
            registry: &registry,
            permissions: &HidesAuthors,
            base: &DefaultBaseQuery,
            custom_querysets: &custom,
            settings: EngineSettings::default(),
        };
        let request: QueryRequest = serde_json::from_value(request).unwrap();
        assembler.plan(&request, &Requester::anonymous())
    }

    #[test]
    fn hidden_fields_cannot_be_filtered_or_sorted_on() {
        let error = plan_hiding_authors(json!({
            "entity": "blog.post",
            "ast": {"type": "sort", "fields": ["-published"]}
        }))
        .unwrap_err();
        assert_eq!(
            error,
            Error::FieldHidden {
                location: NodeLocation::ast().field("fields").index(0),
                entity: "blog.post".to_string(),
                field: "published".to_string(),
            }
        );
        assert_eq!(error.kind(), crate::translation::error::ErrorKind::Permission);
    }

    #[test]
    fn unreadable_related_entities_cannot_be_crossed_or_selected() {
        let error = plan_hiding_authors(json!({
            "entity": "blog.post",
            "ast": {"type": "filter", "conditions": {"author__name": "Ann Lee"}}
        }))
        .unwrap_err();
        assert!(matches!(error, Error::PermissionDenied { ref entity, .. } if entity == "blog.author"));

        let plan = plan_hiding_authors(json!({
            "entity": "blog.post",
            "serializerOptions": {"depth": 1}
        }))
        .unwrap();
        assert_eq!(
            plan.selection().unwrap().paths(),
            vec!["id", "title", "tags", "tags__id", "tags__name"]
        );
    }
}
