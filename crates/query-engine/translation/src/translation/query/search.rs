//! Translate a free text search into a filter pass.

use query_engine_metadata::metadata::{FieldName, Lookup};
use query_engine_predicate::predicate::ast::{FieldPath, FilterPass, Literal, PassOrigin};
use query_engine_predicate::predicate::helpers::{compare, filter_pass, mk_or};

use crate::request::Search;
use crate::translation::helpers::Env;

/// A row matches when any term of the query appears in any searched field,
/// case insensitively: one `icontains` comparison per field and term, all
/// ORed together. The searched fields are the requested ones that are
/// configured as searchable and visible to the requester, or every such
/// field when none are requested. Returns `None` when there is nothing to
/// search for or nowhere to search.
pub fn translate_search(env: &Env, search: &Search) -> Option<FilterPass> {
    let terms: Vec<&str> = search.query.split_whitespace().collect();
    if terms.is_empty() {
        return None;
    }

    let searchable: Vec<&FieldName> = env
        .root
        .searchable_fields()
        .iter()
        .filter(|field| env.is_visible(env.root, field.as_str()))
        .collect();
    let fields: Vec<&FieldName> = match &search.fields {
        None => searchable,
        Some(requested) => requested
            .iter()
            .filter_map(|name| searchable.iter().copied().find(|field| field.as_str() == name))
            .collect(),
    };
    if fields.is_empty() {
        tracing::debug!(entity = %env.root.name, "no searchable fields, search skipped");
        return None;
    }

    let comparisons = fields
        .iter()
        .flat_map(|field| {
            terms.iter().map(|term| {
                compare(
                    FieldPath::new(vec![(*field).clone()]),
                    Lookup::CaseInsensitiveContains,
                    Literal::String((*term).to_string()),
                )
            })
        })
        .collect();
    Some(filter_pass(PassOrigin::Search, mk_or(comparisons)))
}
