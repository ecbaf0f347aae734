//! The query description a client sends, one tree per request.

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A node of the query tree, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    /// Keep the rows matching the body.
    Filter(FilterBody),
    /// Remove the rows matching the body.
    Exclude(FilterBody),
    /// All children hold for the same related rows.
    And { children: Vec<Node> },
    Or { children: Vec<Node> },
    /// Each child is applied on its own, one after the other.
    Chain { children: Vec<Node> },
    Not { child: Box<Node> },
    Compare {
        field: String,
        #[serde(default = "default_lookup")]
        lookup: String,
        value: serde_json::Value,
    },
    /// Field paths to order by, `-` prefixed for descending order.
    Sort { fields: Vec<String> },
    Create {
        data: IndexMap<String, serde_json::Value>,
    },
}

fn default_lookup() -> String {
    "exact".to_string()
}

/// The body of a `filter` or `exclude` node. Conditions are ANDed, each
/// entry of `Q` is an AND of its conditions and the entries are ORed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FilterBody {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub conditions: IndexMap<String, serde_json::Value>,
    #[serde(default, rename = "Q", skip_serializing_if = "Vec::is_empty")]
    pub q: Vec<IndexMap<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<Box<Node>>,
}

impl FilterBody {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.q.is_empty() && self.child.is_none()
    }
}

impl Node {
    /// The `type` tag of the node.
    pub fn type_name(&self) -> &'static str {
        match self {
            Node::Filter(_) => "filter",
            Node::Exclude(_) => "exclude",
            Node::And { .. } => "and",
            Node::Or { .. } => "or",
            Node::Chain { .. } => "chain",
            Node::Not { .. } => "not",
            Node::Compare { .. } => "compare",
            Node::Sort { .. } => "sort",
            Node::Create { .. } => "create",
        }
    }
}
