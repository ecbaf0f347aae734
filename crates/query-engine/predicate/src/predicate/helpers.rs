//! Helpers for building predicate::ast types in certain shapes and patterns.

use super::ast::*;
use query_engine_metadata::metadata::{EntityName, FieldName, Lookup};

// Empty clauses //

/// An empty `ORDER BY` clause.
pub fn empty_order_by() -> OrderBy {
    OrderBy {
        elements: vec![],
        restrictions: vec![],
    }
}

/// Empty `LIMIT` and `OFFSET` clauses.
pub fn empty_limit() -> Limit {
    Limit {
        limit: None,
        offset: None,
    }
}

/// A query over every row of an entity.
pub fn simple_query(entity: EntityName) -> Query {
    Query {
        entity,
        passes: vec![],
        order_by: empty_order_by(),
        limit: empty_limit(),
    }
}

// Predicates //

/// A `true` predicate.
pub fn true_expr() -> Predicate {
    Predicate::And(vec![])
}

/// A `false` predicate.
pub fn false_expr() -> Predicate {
    Predicate::Or(vec![])
}

/// Combine predicates with AND, flattening nested conjunctions.
pub fn mk_and(predicates: Vec<Predicate>) -> Predicate {
    let mut terms = vec![];
    for predicate in predicates {
        match predicate {
            Predicate::And(inner) => terms.extend(inner),
            other => terms.push(other),
        }
    }
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        Predicate::And(terms)
    }
}

/// Combine predicates with OR, flattening nested disjunctions.
pub fn mk_or(predicates: Vec<Predicate>) -> Predicate {
    let mut terms = vec![];
    for predicate in predicates {
        match predicate {
            Predicate::Or(inner) => terms.extend(inner),
            other => terms.push(other),
        }
    }
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        Predicate::Or(terms)
    }
}

/// Negate a predicate, removing double negation.
pub fn mk_not(predicate: Predicate) -> Predicate {
    match predicate {
        Predicate::Not(inner) => *inner,
        other => Predicate::Not(Box::new(other)),
    }
}

/// An atomic comparison.
pub fn compare(path: FieldPath, lookup: Lookup, value: Literal) -> Predicate {
    Predicate::Compare(Comparison {
        path,
        lookup,
        value,
    })
}

/// Build a field path from `__`-separated text. Empty segments are kept so
/// callers can reject them.
pub fn path_from_str(path: &str) -> FieldPath {
    FieldPath(path.split("__").map(FieldName::from).collect())
}

// Passes //

pub fn filter_pass(origin: PassOrigin, predicate: Predicate) -> FilterPass {
    FilterPass {
        kind: PassKind::Filter,
        origin,
        predicate,
        restrictions: vec![],
    }
}

pub fn exclude_pass(origin: PassOrigin, predicate: Predicate) -> FilterPass {
    FilterPass {
        kind: PassKind::Exclude,
        origin,
        predicate,
        restrictions: vec![],
    }
}

/// The filter pass a permission predicate turns into. A denied requester
/// gets a pass that matches nothing.
pub fn permission_pass(permission: &PermissionPredicate) -> FilterPass {
    let predicate = match permission {
        PermissionPredicate::Unrestricted => true_expr(),
        PermissionPredicate::Restricted(predicate) => predicate.clone(),
        PermissionPredicate::Denied => false_expr(),
    };
    filter_pass(PassOrigin::Permission, predicate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title_is(value: &str) -> Predicate {
        compare(
            path_from_str("title"),
            Lookup::Exact,
            Literal::String(value.to_string()),
        )
    }

    #[test]
    fn and_flattens_nested_conjunctions() {
        let predicate = mk_and(vec![
            title_is("a"),
            mk_and(vec![title_is("b"), title_is("c")]),
        ]);
        assert_eq!(
            predicate,
            Predicate::And(vec![title_is("a"), title_is("b"), title_is("c")])
        );
    }

    #[test]
    fn single_terms_are_unwrapped() {
        assert_eq!(mk_or(vec![title_is("a")]), title_is("a"));
        assert_eq!(mk_and(vec![true_expr()]), true_expr());
    }

    #[test]
    fn double_negation_is_removed() {
        assert_eq!(mk_not(mk_not(title_is("a"))), title_is("a"));
    }

    #[test]
    fn denied_permissions_match_nothing() {
        let pass = permission_pass(&PermissionPredicate::Denied);
        assert_eq!(pass.kind, PassKind::Filter);
        assert_eq!(pass.predicate, false_expr());
    }
}
