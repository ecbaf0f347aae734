//! Describe compiled queries as query trees, for explaining what a request
//! was compiled to.

use query_engine_predicate::predicate::ast::{FilterPass, PassKind, PassOrigin, Predicate, Query};

use crate::ast::{FilterBody, Node};

/// The query tree of a predicate. `TRUE` and `FALSE` describe as an empty
/// `and` and an empty `or`, which do not translate back.
pub fn describe_predicate(predicate: &Predicate) -> Node {
    match predicate {
        Predicate::And(terms) => Node::And {
            children: terms.iter().map(describe_predicate).collect(),
        },
        Predicate::Or(terms) => Node::Or {
            children: terms.iter().map(describe_predicate).collect(),
        },
        Predicate::Not(inner) => Node::Not {
            child: Box::new(describe_predicate(inner)),
        },
        Predicate::Compare(comparison) => Node::Compare {
            field: comparison.path.to_string(),
            lookup: comparison.lookup.name().to_string(),
            value: comparison.value.to_json(),
        },
    }
}

fn describe_pass(pass: &FilterPass) -> Node {
    let body = FilterBody {
        child: Some(Box::new(describe_predicate(&pass.predicate))),
        ..FilterBody::default()
    };
    match pass.kind {
        PassKind::Filter => Node::Filter(body),
        PassKind::Exclude => Node::Exclude(body),
    }
}

/// The query tree of the passes of a query, one chain step per pass,
/// followed by its ordering. Only passes from `origin` are described when
/// it is given.
pub fn describe_query(query: &Query, origin: Option<&PassOrigin>) -> Node {
    let mut children: Vec<Node> = query
        .passes
        .iter()
        .filter(|pass| origin.map_or(true, |origin| &pass.origin == origin))
        .map(describe_pass)
        .collect();
    if !query.order_by.elements.is_empty() {
        children.push(Node::Sort {
            fields: query
                .order_by
                .elements
                .iter()
                .map(ToString::to_string)
                .collect(),
        });
    }
    Node::Chain { children }
}
