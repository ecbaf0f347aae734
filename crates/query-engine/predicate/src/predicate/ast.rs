//! Type definitions of the provider-neutral query representation.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use query_engine_metadata::metadata::{Cardinality, EntityName, FieldName, Lookup, ScalarType};

/// A `__`-separated path from an entity to one of its fields, possibly
/// crossing relations, e.g. `author__name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "String")]
pub struct FieldPath(pub Vec<FieldName>);

impl FieldPath {
    pub fn new(segments: Vec<FieldName>) -> Self {
        FieldPath(segments)
    }

    pub fn segments(&self) -> &[FieldName] {
        &self.0
    }

    /// The relation segments, everything but the final field.
    pub fn relations(&self) -> &[FieldName] {
        match self.0.split_last() {
            Some((_, init)) => init,
            None => &[],
        }
    }

    pub fn field(&self) -> Option<&FieldName> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

/// A literal value, already checked against the type of the field it is
/// compared with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    List(Vec<Literal>),
}

impl Literal {
    /// The JSON representation of the literal.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Literal::Null => serde_json::Value::Null,
            Literal::Bool(b) => serde_json::Value::Bool(*b),
            Literal::Int(i) => serde_json::Value::from(*i),
            Literal::Float(f) => serde_json::Value::from(*f),
            Literal::String(s) => serde_json::Value::String(s.clone()),
            Literal::Uuid(uuid) => serde_json::Value::String(uuid.to_string()),
            Literal::Json(value) => value.clone(),
            Literal::List(items) => {
                serde_json::Value::Array(items.iter().map(Literal::to_json).collect())
            }
        }
    }
}

/// An atomic comparison of the field at the end of `path` with a value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub path: FieldPath,
    pub lookup: Lookup,
    pub value: Literal,
}

/// A boolean tree evaluated in one filter pass. An empty `And` is true and an
/// empty `Or` is false.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
    Compare(Comparison),
}

impl Predicate {
    /// The path of every comparison, negated ones included.
    pub fn paths(&self) -> Vec<&FieldPath> {
        let mut paths = vec![];
        self.collect_paths(&mut paths);
        paths
    }

    fn collect_paths<'a>(&'a self, paths: &mut Vec<&'a FieldPath>) {
        match self {
            Predicate::And(terms) | Predicate::Or(terms) => {
                for term in terms {
                    term.collect_paths(paths);
                }
            }
            Predicate::Not(inner) => inner.collect_paths(paths),
            Predicate::Compare(comparison) => paths.push(&comparison.path),
        }
    }
}

/// Does a pass keep the rows matching its predicate, or remove them?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    Filter,
    Exclude,
}

/// Which layer of query assembly contributed a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOrigin {
    /// The default query of the entity.
    Base,
    /// A named custom queryset.
    Custom(String),
    /// The permission predicate of the requester.
    Permission,
    /// A free text search.
    Search,
    /// The client's query.
    Client,
}

/// One filter pass. Every multi-valued relation crossed by the predicate is
/// bound once per pass, so all the comparisons of a pass talk about the same
/// related row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterPass {
    pub kind: PassKind,
    pub origin: PassOrigin,
    pub predicate: Predicate,
    /// Rows of crossed relations the predicate may see. A related row outside
    /// its restriction does not exist as far as the pass is concerned.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restrictions: Vec<Restriction>,
}

/// Narrows the rows reachable through a relation path to those matching a
/// predicate over the related entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Restriction {
    /// The relation segments leading to the related entity, e.g. `author__posts`.
    pub relation: FieldPath,
    pub entity: EntityName,
    pub predicate: Predicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderByElement {
    pub path: FieldPath,
    pub direction: OrderDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBy {
    pub elements: Vec<OrderByElement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub restrictions: Vec<Restriction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limit {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// A read query against one entity: its filter passes are applied in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub entity: EntityName,
    pub passes: Vec<FilterPass>,
    pub order_by: OrderBy,
    pub limit: Limit,
}

impl Query {
    pub fn passes_from(&self, origin: &PassOrigin) -> impl Iterator<Item = &FilterPass> {
        let origin = origin.clone();
        self.passes.iter().filter(move |pass| pass.origin == origin)
    }

    pub fn has_permission_pass(&self) -> bool {
        self.passes
            .iter()
            .any(|pass| pass.origin == PassOrigin::Permission && pass.kind == PassKind::Filter)
    }
}

/// The condition a permission collaborator places on an entity for a requester.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionPredicate {
    /// Every row is visible.
    Unrestricted,
    /// Only rows matching the predicate are visible.
    Restricted(Predicate),
    /// Nothing is visible.
    Denied,
}

/// An authorized write of a new row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteOperation {
    pub entity: EntityName,
    pub values: IndexMap<FieldName, Literal>,
    /// Passes the created row must satisfy, otherwise the write is undone.
    pub guard: Vec<FilterPass>,
}

/// A summary computed over every row of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Aggregate {
    pub function: AggregateFunction,
    /// The field summarized. Only `count` may go without one, and then
    /// counts rows.
    pub path: Option<FieldPath>,
    /// The key of the result, e.g. `rating__avg`.
    pub alias: String,
}

/// The fields to read for an entity and, for relations, for its related entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSelection {
    pub entity: EntityName,
    pub primary_key: FieldName,
    pub fields: Vec<SelectedField>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectedField {
    Scalar {
        name: FieldName,
        scalar_type: ScalarType,
    },
    Relation {
        name: FieldName,
        cardinality: Cardinality,
        reverse: bool,
        read_only: bool,
        /// Related rows outside this predicate are left out.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        row_filter: Option<Predicate>,
        selection: FieldSelection,
    },
}

impl SelectedField {
    pub fn name(&self) -> &FieldName {
        match self {
            SelectedField::Scalar { name, .. } | SelectedField::Relation { name, .. } => name,
        }
    }
}

impl FieldSelection {
    pub fn field(&self, name: &str) -> Option<&SelectedField> {
        self.fields.iter().find(|field| field.name().as_str() == name)
    }

    /// Every selected path, relations before the fields of their related entity.
    pub fn paths(&self) -> Vec<String> {
        let mut paths = vec![];
        self.collect_paths("", &mut paths);
        paths
    }

    fn collect_paths(&self, prefix: &str, paths: &mut Vec<String>) {
        for field in &self.fields {
            let path = format!("{prefix}{}", field.name());
            if let SelectedField::Relation { selection, .. } = field {
                paths.push(path.clone());
                selection.collect_paths(&format!("{path}__"), paths);
            } else {
                paths.push(path);
            }
        }
    }

    /// How many relation hops the selection reaches.
    pub fn depth(&self) -> usize {
        self.fields
            .iter()
            .filter_map(|field| match field {
                SelectedField::Relation { selection, .. } => Some(selection.depth() + 1),
                SelectedField::Scalar { .. } => None,
            })
            .max()
            .unwrap_or(0)
    }
}
