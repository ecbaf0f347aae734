//! The request envelope and the requester it is made on behalf of.

use std::collections::BTreeSet;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use query_engine_predicate::predicate::ast::AggregateFunction;

use crate::ast::Node;

/// A read or create request against one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QueryRequest {
    pub entity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ast: Option<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_queryset: Option<String>,
    #[serde(default, rename = "serializerOptions")]
    pub serializer_options: SerializerOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<Search>,
    /// What to return from the rows a read selects.
    #[serde(default, skip_serializing_if = "Operation::is_list")]
    pub operation: Operation,
}

impl QueryRequest {
    pub fn new(entity: impl Into<String>) -> Self {
        QueryRequest {
            entity: entity.into(),
            ast: None,
            custom_queryset: None,
            serializer_options: SerializerOptions::default(),
            search: None,
            operation: Operation::List,
        }
    }

    #[must_use]
    pub fn with_ast(mut self, ast: Node) -> Self {
        self.ast = Some(ast);
        self
    }
}

/// How much of the result to return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SerializerOptions {
    /// Relation hops to follow when `fields` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    /// Explicit field paths to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u32>,
}

/// A free text search over the searchable fields of the entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Search {
    #[serde(rename = "searchQuery")]
    pub query: String,
    /// Restrict the search to these fields. Absent means every searchable field.
    #[serde(
        default,
        rename = "searchFields",
        skip_serializing_if = "Option::is_none"
    )]
    pub fields: Option<Vec<String>>,
}

/// The terminal of a read. `list` returns the selected rows; the others
/// return one row, whether a row exists, or summaries of the rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    #[default]
    List,
    /// Exactly one row, or an error.
    Get,
    /// The first row in query order, by primary key when unordered.
    First,
    /// The last row in query order, by primary key when unordered.
    Last,
    Exists,
    /// The number of rows, or of non-null values of `field`.
    Count {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
    Sum {
        field: String,
    },
    Avg {
        field: String,
    },
    Min {
        field: String,
    },
    Max {
        field: String,
    },
    /// Several summaries at once, keyed by alias.
    Aggregate {
        aggregates: Vec<AggregateRequest>,
    },
}

/// One summary of an `aggregate` operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AggregateRequest {
    pub function: AggregateFunction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Defaults to `<field>__<function>`, or `count` for a row count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl AggregateRequest {
    pub fn alias(&self) -> String {
        match (&self.alias, &self.field) {
            (Some(alias), _) => alias.clone(),
            (None, Some(field)) => format!("{field}__{}", self.function),
            (None, None) => self.function.to_string(),
        }
    }
}

impl Operation {
    pub fn is_list(&self) -> bool {
        *self == Operation::List
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Get => "get",
            Operation::First => "first",
            Operation::Last => "last",
            Operation::Exists => "exists",
            Operation::Count { .. } => "count",
            Operation::Sum { .. } => "sum",
            Operation::Avg { .. } => "avg",
            Operation::Min { .. } => "min",
            Operation::Max { .. } => "max",
            Operation::Aggregate { .. } => "aggregate",
        }
    }

    /// The summaries an aggregating operation computes, `None` for the
    /// others.
    pub fn aggregates(&self) -> Option<Vec<AggregateRequest>> {
        let single = |function, field: &Option<String>| {
            Some(vec![AggregateRequest {
                function,
                field: field.clone(),
                alias: None,
            }])
        };
        match self {
            Operation::Count { field } => single(AggregateFunction::Count, field),
            Operation::Sum { field } => single(AggregateFunction::Sum, &Some(field.clone())),
            Operation::Avg { field } => single(AggregateFunction::Avg, &Some(field.clone())),
            Operation::Min { field } => single(AggregateFunction::Min, &Some(field.clone())),
            Operation::Max { field } => single(AggregateFunction::Max, &Some(field.clone())),
            Operation::Aggregate { aggregates } => Some(aggregates.clone()),
            Operation::List
            | Operation::Get
            | Operation::First
            | Operation::Last
            | Operation::Exists => None,
        }
    }
}

/// What a request wants to do with an entity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Create,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Read => write!(f, "read"),
            Action::Create => write!(f, "create"),
        }
    }
}

/// Who a request is made for. Authentication happens before a request reaches
/// the engine; an anonymous requester has no id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub roles: BTreeSet<String>,
}

impl Requester {
    pub fn anonymous() -> Self {
        Requester::default()
    }

    pub fn user(id: impl Into<serde_json::Value>) -> Self {
        Requester {
            id: Some(id.into()),
            roles: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_full_envelope() {
        let request: QueryRequest = serde_json::from_value(json!({
            "entity": "blog.post",
            "ast": {"type": "sort", "fields": ["-created"]},
            "custom_queryset": "published_only",
            "serializerOptions": {"depth": 1, "fields": ["title"], "limit": 20, "offset": 0},
            "search": {"searchQuery": "rust"}
        }))
        .unwrap();
        assert_eq!(request.entity, "blog.post");
        assert_eq!(request.serializer_options.depth, Some(1));
        assert_eq!(request.serializer_options.limit, Some(20));
        assert_eq!(request.search.unwrap().fields, None);
    }

    #[test]
    fn operations_are_tagged_by_type() {
        let request: QueryRequest = serde_json::from_value(json!({
            "entity": "blog.post",
            "operation": {"type": "avg", "field": "rating"}
        }))
        .unwrap();
        let aggregates = request.operation.aggregates().unwrap();
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].alias(), "rating__avg");

        let request: QueryRequest = serde_json::from_value(json!({
            "entity": "blog.post",
            "operation": {"type": "count"}
        }))
        .unwrap();
        assert_eq!(request.operation, Operation::Count { field: None });
        assert_eq!(request.operation.aggregates().unwrap()[0].alias(), "count");
        assert_eq!(Operation::First.aggregates(), None);
    }

    #[test]
    fn everything_but_the_entity_is_optional() {
        let request: QueryRequest = serde_json::from_value(json!({"entity": "blog.tag"})).unwrap();
        assert_eq!(request, QueryRequest::new("blog.tag"));
    }
}
