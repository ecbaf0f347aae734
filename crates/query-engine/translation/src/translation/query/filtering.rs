//! Compile filter, exclude and sort nodes into filter passes and ordering.
//!
//! A `chain` is a sequence of independent steps: each of its children becomes
//! its own filter pass, so every step binds its own rows of the multi-valued
//! relations it crosses. Everything below a `filter` or `exclude` (`and`,
//! `or`, `not`, nested filters) is compiled into one predicate, evaluated in
//! a single pass.

use indexmap::IndexMap;

use query_engine_metadata::metadata::Lookup;
use query_engine_predicate::predicate::ast::{FilterPass, OrderBy, PassOrigin, Predicate};
use query_engine_predicate::predicate::helpers::{
    compare, exclude_pass, filter_pass, mk_and, mk_not, mk_or,
};

use super::sorting;
use super::values;
use crate::ast::{FilterBody, Node};
use crate::translation::error::{Error, NodeLocation};
use crate::translation::helpers::Env;

/// The passes and ordering contributed by one query tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Translated {
    pub passes: Vec<FilterPass>,
    /// The last `sort` of the tree, if any.
    pub order_by: Option<OrderBy>,
}

/// Translate a query tree into filter passes tagged with `origin`.
pub fn translate_query(
    env: &Env,
    node: &Node,
    origin: &PassOrigin,
    location: &NodeLocation,
) -> Result<Translated, Error> {
    let mut translated = Translated::default();
    translate_step(env, node, origin, "query", location, &mut translated)?;
    Ok(translated)
}

fn translate_step(
    env: &Env,
    node: &Node,
    origin: &PassOrigin,
    parent: &'static str,
    location: &NodeLocation,
    translated: &mut Translated,
) -> Result<(), Error> {
    match node {
        // nested chains flatten into the same sequence of passes.
        Node::Chain { children } => {
            if children.is_empty() {
                return Err(Error::EmptyCombinator {
                    location: location.clone(),
                    node: "chain",
                });
            }
            for (index, child) in children.iter().enumerate() {
                translate_step(
                    env,
                    child,
                    origin,
                    "chain",
                    &location.field("children").index(index),
                    translated,
                )?;
            }
        }
        Node::Filter(body) => {
            let predicate = translate_body(env, body, "filter", location)?;
            let pass = restricted(env, filter_pass(origin.clone(), predicate), location)?;
            translated.passes.push(pass);
        }
        Node::Exclude(body) => {
            let predicate = translate_body(env, body, "exclude", location)?;
            let pass = restricted(env, exclude_pass(origin.clone(), predicate), location)?;
            translated.passes.push(pass);
        }
        Node::Sort { fields } => {
            let location = location.field("fields");
            let elements = sorting::translate_sort(env, fields, &location)?;
            let restrictions =
                env.restrictions(elements.iter().map(|element| &element.path), &location)?;
            translated.order_by = Some(OrderBy {
                elements,
                restrictions,
            });
        }
        Node::Create { .. } => {
            return Err(Error::MisplacedNode {
                location: location.clone(),
                node: "create",
                parent,
            })
        }
        Node::And { .. } | Node::Or { .. } | Node::Not { .. } | Node::Compare { .. } => {
            let predicate = translate_predicate(env, node, parent, location)?;
            let pass = restricted(env, filter_pass(origin.clone(), predicate), location)?;
            translated.passes.push(pass);
        }
    }
    Ok(())
}

/// Limit the related rows a pass sees to those the requester may see.
fn restricted(env: &Env, mut pass: FilterPass, location: &NodeLocation) -> Result<FilterPass, Error> {
    pass.restrictions = env.restrictions(pass.predicate.paths(), location)?;
    Ok(pass)
}

/// Compile a node into one predicate. Nodes that would need their own pass
/// cannot appear here.
pub fn translate_predicate(
    env: &Env,
    node: &Node,
    parent: &'static str,
    location: &NodeLocation,
) -> Result<Predicate, Error> {
    match node {
        Node::And { children } => Ok(mk_and(translate_children(
            env, children, "and", location,
        )?)),
        Node::Or { children } => Ok(mk_or(translate_children(env, children, "or", location)?)),
        Node::Not { child } => Ok(mk_not(translate_predicate(
            env,
            child,
            "not",
            &location.field("child"),
        )?)),
        Node::Compare {
            field,
            lookup,
            value,
        } => translate_comparison(env, field, lookup, value, location),
        Node::Filter(body) => translate_body(env, body, "filter", location),
        // an exclude inside a predicate negates its body within the same pass.
        Node::Exclude(body) => Ok(mk_not(translate_body(env, body, "exclude", location)?)),
        Node::Chain { .. } | Node::Sort { .. } | Node::Create { .. } => {
            Err(Error::MisplacedNode {
                location: location.clone(),
                node: node.type_name(),
                parent,
            })
        }
    }
}

fn translate_children(
    env: &Env,
    children: &[Node],
    node: &'static str,
    location: &NodeLocation,
) -> Result<Vec<Predicate>, Error> {
    if children.is_empty() {
        return Err(Error::EmptyCombinator {
            location: location.clone(),
            node,
        });
    }
    children
        .iter()
        .enumerate()
        .map(|(index, child)| {
            translate_predicate(env, child, node, &location.field("children").index(index))
        })
        .collect()
}

/// Conditions are ANDed, the `Q` alternatives are ORed, and the child joins
/// them as one more AND term.
fn translate_body(
    env: &Env,
    body: &FilterBody,
    node: &'static str,
    location: &NodeLocation,
) -> Result<Predicate, Error> {
    if body.is_empty() {
        return Err(Error::EmptyFilter {
            location: location.clone(),
            node,
        });
    }

    let mut terms = translate_conditions(env, &body.conditions, &location.field("conditions"))?;

    if !body.q.is_empty() {
        let alternatives = body
            .q
            .iter()
            .enumerate()
            .map(|(index, conditions)| {
                let location = location.field("Q").index(index);
                if conditions.is_empty() {
                    return Err(Error::EmptyFilter { location, node });
                }
                Ok(mk_and(translate_conditions(env, conditions, &location)?))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        terms.push(mk_or(alternatives));
    }

    if let Some(child) = &body.child {
        terms.push(translate_predicate(
            env,
            child,
            node,
            &location.field("child"),
        )?);
    }

    Ok(mk_and(terms))
}

fn translate_conditions(
    env: &Env,
    conditions: &IndexMap<String, serde_json::Value>,
    location: &NodeLocation,
) -> Result<Vec<Predicate>, Error> {
    conditions
        .iter()
        .map(|(key, value)| {
            let (path, lookup) = split_condition_key(key);
            translate_comparison(env, path, lookup, value, &location.key(key))
        })
        .collect()
}

/// Split `author__name__icontains` into the path and the lookup. A key
/// without a trailing lookup compares exactly.
pub fn split_condition_key(key: &str) -> (&str, &str) {
    match key.rsplit_once("__") {
        Some((path, last)) if Lookup::from_name(last).is_some() => (path, last),
        _ => (key, Lookup::Exact.name()),
    }
}

fn translate_comparison(
    env: &Env,
    field: &str,
    lookup: &str,
    value: &serde_json::Value,
    location: &NodeLocation,
) -> Result<Predicate, Error> {
    let lookup = Lookup::from_name(lookup).ok_or_else(|| Error::UnknownLookup {
        location: location.clone(),
        lookup: lookup.to_string(),
    })?;
    let resolved = env.resolve_path(field, location)?;
    if !resolved.scalar_type.supports(lookup) {
        return Err(Error::LookupNotSupported {
            location: location.clone(),
            path: field.to_string(),
            lookup,
            scalar_type: resolved.scalar_type,
        });
    }
    let value = values::translate_lookup_value(value, lookup, resolved.scalar_type, location)?;
    Ok(compare(resolved.path, lookup, value))
}
