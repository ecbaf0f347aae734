//! Access policies read from the configuration.

use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use query_engine_metadata::metadata::{EntityDescriptor, EntityName, FieldName};
use query_engine_predicate::predicate::ast::{PermissionPredicate, Predicate};
use query_engine_predicate::predicate::helpers::{mk_and, mk_not, mk_or, true_expr};
use query_engine_translation::ast::Node;
use query_engine_translation::request::{Action, Requester};
use query_engine_translation::translation::error::{Error, NodeLocation};
use query_engine_translation::translation::helpers::Env;
use query_engine_translation::translation::query::filtering::translate_predicate;
use query_engine_translation::translation::query::{FieldAccess, PermissionProvider};

/// Placeholder in policy filters for the id of the requester.
pub const REQUESTER_ID: &str = "$requester.id";

/// Who a policy applies to, what it lets them do, and which rows and fields
/// it lets them see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Policy {
    /// The policy applies to requesters with any of these roles. Empty means
    /// every requester.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub roles: BTreeSet<String>,
    /// The policy only applies to authenticated requesters.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub authenticated: bool,
    pub actions: BTreeSet<Action>,
    /// Rows visible under this policy. Absent means every row. The string
    /// `$requester.id` is replaced by the id of the requester.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Node>,
    /// Rows hidden from the requester whatever the filters of other
    /// policies let through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Node>,
    /// Fields readable under this policy when it grants `read`. Absent means
    /// every field. The primary key is always readable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_fields: Option<BTreeSet<FieldName>>,
    /// Fields settable under this policy when it grants `create`. Absent
    /// means every writable field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_fields: Option<BTreeSet<FieldName>>,
}

impl Policy {
    /// Does the policy apply to the requester at all?
    pub fn applies_to(&self, requester: &Requester) -> bool {
        if self.authenticated && !requester.is_authenticated() {
            return false;
        }
        if !self.roles.is_empty() && self.roles.is_disjoint(&requester.roles) {
            return false;
        }
        // a filter on the requester's id says nothing about anonymous requesters.
        match &self.filter {
            Some(filter) if requester.id.is_none() => !mentions_requester(filter),
            _ => true,
        }
    }

    fn field_access(fields: Option<&BTreeSet<FieldName>>) -> FieldAccess {
        fields.map_or(FieldAccess::All, |fields| FieldAccess::Only(fields.clone()))
    }
}

/// The configured policies of every entity. A requester sees the rows
/// visible under any policy that applies to them, minus the rows any of
/// those policies excludes, and nothing when no policy applies.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredPermissions {
    policies: BTreeMap<EntityName, Vec<Policy>>,
}

impl ConfiguredPermissions {
    pub fn new(policies: BTreeMap<EntityName, Vec<Policy>>) -> Self {
        ConfiguredPermissions { policies }
    }

    fn applicable<'a>(
        &'a self,
        entity: &EntityName,
        requester: &'a Requester,
    ) -> impl Iterator<Item = (usize, &'a Policy)> + 'a {
        self.policies
            .get(entity)
            .into_iter()
            .flatten()
            .enumerate()
            .filter(move |(_, policy)| policy.applies_to(requester))
    }

    /// Translate the `filter` or `exclude` of a policy for a requester.
    pub fn policy_predicate(
        env: &Env,
        node: &Node,
        index: usize,
        part: &str,
        requester: &Requester,
    ) -> Result<Predicate, Error> {
        let node = substitute_requester(node, requester)?;
        translate_predicate(
            env,
            &node,
            "permissions",
            &NodeLocation::root("permissions")
                .key(env.root.name.as_str())
                .index(index)
                .field(part),
        )
    }

    /// The union of the fields granted by the applicable policies that
    /// grant `action`.
    fn fields_for(
        &self,
        entity: &EntityDescriptor,
        requester: &Requester,
        action: Action,
        fields: impl Fn(&Policy) -> Option<&BTreeSet<FieldName>>,
    ) -> FieldAccess {
        self.applicable(&entity.name, requester)
            .filter(|(_, policy)| policy.actions.contains(&action))
            .map(|(_, policy)| Policy::field_access(fields(policy)))
            .reduce(FieldAccess::union)
            .unwrap_or_else(|| FieldAccess::Only(BTreeSet::new()))
    }
}

impl PermissionProvider for ConfiguredPermissions {
    fn predicate_for(
        &self,
        env: &Env,
        requester: &Requester,
    ) -> Result<PermissionPredicate, Error> {
        let mut filters = vec![];
        let mut excludes = vec![];
        let mut any = false;
        let mut unfiltered = false;
        for (index, policy) in self.applicable(&env.root.name, requester) {
            any = true;
            match &policy.filter {
                None => unfiltered = true,
                Some(filter) => {
                    filters.push(Self::policy_predicate(env, filter, index, "filter", requester)?);
                }
            }
            if let Some(exclude) = &policy.exclude {
                excludes.push(Self::policy_predicate(env, exclude, index, "exclude", requester)?);
            }
        }
        if !any {
            tracing::debug!(entity = %env.root.name, "no policy applies");
            return Ok(PermissionPredicate::Denied);
        }

        let visible = if unfiltered { true_expr() } else { mk_or(filters) };
        if excludes.is_empty() {
            if unfiltered {
                return Ok(PermissionPredicate::Unrestricted);
            }
            return Ok(PermissionPredicate::Restricted(visible));
        }
        Ok(PermissionPredicate::Restricted(mk_and(vec![
            visible,
            mk_not(mk_or(excludes)),
        ])))
    }

    fn allowed_actions(&self, entity: &EntityDescriptor, requester: &Requester) -> BTreeSet<Action> {
        self.applicable(&entity.name, requester)
            .flat_map(|(_, policy)| policy.actions.iter().copied())
            .collect()
    }

    fn visible_fields(&self, entity: &EntityDescriptor, requester: &Requester) -> FieldAccess {
        self.fields_for(entity, requester, Action::Read, |policy| {
            policy.visible_fields.as_ref()
        })
    }

    fn create_fields(&self, entity: &EntityDescriptor, requester: &Requester) -> FieldAccess {
        self.fields_for(entity, requester, Action::Create, |policy| {
            policy.create_fields.as_ref()
        })
    }
}

fn mentions_requester(node: &Node) -> bool {
    serde_json::to_value(node).is_ok_and(|value| mentions_placeholder(&value))
}

fn mentions_placeholder(value: &Value) -> bool {
    match value {
        Value::String(s) => s == REQUESTER_ID,
        Value::Array(items) => items.iter().any(mentions_placeholder),
        Value::Object(map) => map.values().any(mentions_placeholder),
        Value::Null | Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Replace every `$requester.id` value of a filter by the requester's id.
fn substitute_requester(node: &Node, requester: &Requester) -> Result<Node, Error> {
    let mut value =
        serde_json::to_value(node).map_err(|err| Error::Internal(err.to_string()))?;
    let id = requester.id.clone().unwrap_or(Value::Null);
    replace_placeholder(&mut value, &id);
    serde_json::from_value(value).map_err(|err| Error::Internal(err.to_string()))
}

fn replace_placeholder(value: &mut Value, id: &Value) {
    match value {
        Value::String(s) if s == REQUESTER_ID => *value = id.clone(),
        Value::Array(items) => items.iter_mut().for_each(|item| replace_placeholder(item, id)),
        Value::Object(map) => map
            .values_mut()
            .for_each(|item| replace_placeholder(item, id)),
        _ => {}
    }
}
