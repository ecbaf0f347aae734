//! A storage provider that keeps rows in memory.
//!
//! Filter passes are evaluated the way a relational ORM joins: within one
//! pass, every multi-valued relation the predicate crosses is bound to a
//! single related row, and the pass holds when some binding satisfies the
//! whole predicate. A relation with no related rows binds to nothing, so
//! its fields read as null. Separate passes bind separately. `NOT` opens a
//! scope of its own, as does an exclude pass.
//!
//! A pass may restrict the rows reachable through a relation path. Related
//! rows outside the restriction are treated as if they did not exist.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use query_engine_metadata::metadata::{
    Cardinality, EntityDescriptor, EntityName, FieldKind, FieldName, Lookup, Registry, Relation,
    ScalarType,
};
use query_engine_predicate::predicate::ast::{
    Aggregate, AggregateFunction, FieldPath, FilterPass, Literal, OrderByElement, OrderDirection,
    PassKind, Predicate, Query, Restriction, WriteOperation,
};

use crate::error::Error;
use crate::provider::StorageProvider;
use crate::record::{compare_values, values_equal, Record};

type Tables = BTreeMap<EntityName, Vec<Record>>;

/// Rows of every registered entity, held in memory.
#[derive(Debug)]
pub struct InMemoryStore {
    registry: Arc<Registry>,
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    /// An empty store with a table per registered entity.
    pub fn new(registry: Arc<Registry>) -> Self {
        let tables = registry
            .entities()
            .map(|entity| (entity.name.clone(), vec![]))
            .collect();
        InMemoryStore {
            registry,
            tables: RwLock::new(tables),
        }
    }

    /// A store loaded from a JSON object mapping entity names to lists of rows.
    pub fn from_json(registry: Arc<Registry>, dataset: Value) -> Result<Self, Error> {
        let store = InMemoryStore::new(registry);
        let Value::Object(dataset) = dataset else {
            return Err(Error::Storage(
                "a dataset must map entity names to lists of rows".to_string(),
            ));
        };
        {
            let mut tables = store
                .tables
                .write()
                .map_err(|_| Error::Storage("the store lock is poisoned".to_string()))?;
            for (entity, rows) in dataset {
                let table = tables
                    .get_mut(entity.as_str())
                    .ok_or_else(|| Error::NoSuchTable(entity.clone()))?;
                let rows: Vec<Record> = serde_json::from_value(rows).map_err(|err| {
                    Error::Storage(format!("invalid rows for '{entity}': {err}"))
                })?;
                table.extend(rows);
            }
        }
        tracing::debug!("loaded dataset");
        Ok(store)
    }

    /// A copy of every row of an entity, in insertion order.
    pub fn rows(&self, entity: &str) -> Result<Vec<Record>, Error> {
        let tables = self.read()?;
        Ok(Evaluator::new(&self.registry, &tables).table(entity)?.to_vec())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, Error> {
        self.tables
            .read()
            .map_err(|_| Error::Storage("the store lock is poisoned".to_string()))
    }

    fn generate_key(
        &self,
        evaluator: &Evaluator<'_, '_>,
        entity: &EntityDescriptor,
    ) -> Result<Value, Error> {
        let key_type = self
            .registry
            .key_type(entity.name.as_str())
            .map_err(|err| Error::Storage(err.to_string()))?;
        match key_type {
            ScalarType::Integer => {
                let max = evaluator
                    .table(entity.name.as_str())?
                    .iter()
                    .filter_map(|row| row.get(entity.primary_key().as_str()))
                    .filter_map(Value::as_i64)
                    .max()
                    .unwrap_or(0);
                let next = max.checked_add(1).ok_or_else(|| Error::ConstraintViolation {
                    entity: entity.name.to_string(),
                    message: format!("no integer key left after {max}"),
                })?;
                Ok(Value::from(next))
            }
            ScalarType::Uuid => Ok(Value::String(uuid::Uuid::new_v4().to_string())),
            _ => Err(Error::ConstraintViolation {
                entity: entity.name.to_string(),
                message: format!("a value for '{}' is required", entity.primary_key()),
            }),
        }
    }

    /// Check the values of a new row against the entity and lay them out in
    /// field order.
    fn build_row(
        &self,
        evaluator: &Evaluator<'_, '_>,
        entity: &EntityDescriptor,
        values: &IndexMap<String, Value>,
    ) -> Result<Record, Error> {
        let violation = |message: String| Error::ConstraintViolation {
            entity: entity.name.to_string(),
            message,
        };
        let mut row = IndexMap::new();
        for (name, info) in &entity.info.fields {
            let value = values.get(name.as_str()).cloned().unwrap_or(Value::Null);
            match &info.kind {
                FieldKind::Reverse { .. } => continue,
                FieldKind::ManyToMany { target } => {
                    let keys = match value {
                        Value::Null => vec![],
                        Value::Array(keys) => keys,
                        other => return Err(violation(format!("'{name}' takes a list of keys, not {other}"))),
                    };
                    for key in &keys {
                        if !evaluator.key_exists(target, key)? {
                            return Err(violation(format!("'{name}' refers to missing '{target}' {key}")));
                        }
                    }
                    row.insert(name.to_string(), Value::Array(keys));
                }
                kind => {
                    if value.is_null() {
                        if !info.nullable {
                            return Err(violation(format!("'{name}' may not be null")));
                        }
                    } else if let Some(target) = kind.target() {
                        if !evaluator.key_exists(target, &value)? {
                            return Err(violation(format!(
                                "'{name}' refers to missing '{target}' {value}"
                            )));
                        }
                    }
                    row.insert(name.to_string(), value);
                }
            }
        }
        Ok(Record(row))
    }
}

#[async_trait]
impl StorageProvider for InMemoryStore {
    async fn fetch(&self, query: &Query) -> Result<Vec<Record>, Error> {
        let tables = self.read()?;
        let rows = Evaluator::new(&self.registry, &tables).select(query)?;

        let offset = query.limit.offset.map_or(0, |offset| offset as usize);
        let limit = query.limit.limit.map_or(usize::MAX, |limit| limit as usize);
        let rows: Vec<Record> = rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        tracing::debug!(entity = %query.entity, rows = rows.len(), "fetched rows");
        Ok(rows)
    }

    async fn related(
        &self,
        relation: &Relation,
        record: &Record,
        row_filter: Option<&Predicate>,
    ) -> Result<Vec<Record>, Error> {
        let tables = self.read()?;
        let evaluator = Evaluator::new(&self.registry, &tables);
        let mut rows = vec![];
        for row in evaluator.related(relation, record)? {
            if let Some(filter) = row_filter {
                if !evaluator.exists(&relation.target, row, filter)? {
                    continue;
                }
            }
            rows.push(row.clone());
        }
        Ok(rows)
    }

    async fn aggregate(
        &self,
        query: &Query,
        aggregates: &[Aggregate],
    ) -> Result<IndexMap<String, Value>, Error> {
        let tables = self.read()?;
        let rows = Evaluator::new(&self.registry, &tables).select(query)?;
        tracing::debug!(entity = %query.entity, rows = rows.len(), "aggregating rows");
        Ok(aggregates
            .iter()
            .map(|aggregate| (aggregate.alias.clone(), summarize(aggregate, &rows)))
            .collect())
    }

    async fn create(&self, write: &WriteOperation) -> Result<Record, Error> {
        let entity = self
            .registry
            .lookup(write.entity.as_str())
            .map_err(|_| Error::NoSuchTable(write.entity.to_string()))?;
        let primary_key = entity.primary_key().as_str();

        let mut tables = self
            .tables
            .write()
            .map_err(|_| Error::Storage("the store lock is poisoned".to_string()))?;

        let row = {
            let evaluator = Evaluator::new(&self.registry, &tables);
            let mut values: IndexMap<String, Value> = write
                .values
                .iter()
                .map(|(field, value)| (field.to_string(), value.to_json()))
                .collect();
            if values.get(primary_key).map_or(true, Value::is_null) {
                let key = self.generate_key(&evaluator, entity)?;
                values.insert(primary_key.to_string(), key);
            }
            if let Some(key) = values.get(primary_key) {
                if evaluator.key_exists(&entity.name, key)? {
                    return Err(Error::ConstraintViolation {
                        entity: entity.name.to_string(),
                        message: format!("a row with key {key} already exists"),
                    });
                }
            }
            self.build_row(&evaluator, entity, &values)?
        };

        let table = tables
            .get_mut(&entity.name)
            .ok_or_else(|| Error::NoSuchTable(entity.name.to_string()))?;
        table.push(row.clone());
        let index = table.len() - 1;

        // the new row must be visible through the guard, otherwise it is undone.
        let visible = {
            let evaluator = Evaluator::new(&self.registry, &tables);
            evaluator
                .table(entity.name.as_str())
                .and_then(|table| evaluator.passes(&entity.name, &table[index], &write.guard))
        };
        if !matches!(visible, Ok(true)) {
            if let Some(table) = tables.get_mut(&entity.name) {
                table.truncate(index);
            }
            tracing::info!(entity = %entity.name, "write rejected by its guard");
            visible?;
            return Err(Error::WriteRejected {
                entity: entity.name.to_string(),
            });
        }

        tracing::debug!(entity = %entity.name, "created row");
        Ok(row)
    }
}

/// Compare sort keys: nulls sort after every value in ascending order and
/// before every value in descending order.
fn order(elements: &[OrderByElement], left: &[Value], right: &[Value]) -> Ordering {
    for ((element, left), right) in elements.iter().zip(left).zip(right) {
        let ordering = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => compare_values(left, right).unwrap_or(Ordering::Equal),
        };
        let ordering = match element.direction {
            OrderDirection::Asc => ordering,
            OrderDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Compute one aggregate over the selected rows. Nulls are skipped, and
/// every function but `count` gives null over no values.
fn summarize(aggregate: &Aggregate, rows: &[&Record]) -> Value {
    let Some(field) = aggregate.path.as_ref().and_then(FieldPath::field) else {
        return Value::from(rows.len());
    };
    let values: Vec<&Value> = rows
        .iter()
        .filter_map(|row| row.get(field.as_str()))
        .filter(|value| !value.is_null())
        .collect();
    let by_order = |left: &&Value, right: &&Value| {
        compare_values(left, right).unwrap_or(Ordering::Equal)
    };
    match aggregate.function {
        AggregateFunction::Count => Value::from(values.len()),
        AggregateFunction::Sum => sum(&values),
        AggregateFunction::Avg if values.is_empty() => Value::Null,
        AggregateFunction::Avg => {
            let total: f64 = values.iter().filter_map(|value| value.as_f64()).sum();
            #[allow(clippy::cast_precision_loss)]
            let count = values.len() as f64;
            Value::from(total / count)
        }
        AggregateFunction::Min => values.into_iter().min_by(by_order).cloned().unwrap_or(Value::Null),
        AggregateFunction::Max => values.into_iter().max_by(by_order).cloned().unwrap_or(Value::Null),
    }
}

/// Integers add up as integers while they fit, anything else as floats.
fn sum(values: &[&Value]) -> Value {
    if values.is_empty() {
        return Value::Null;
    }
    let integers = values
        .iter()
        .map(|value| value.as_i64())
        .try_fold(0_i64, |total, value| total.checked_add(value?));
    match integers {
        Some(total) => Value::from(total),
        None => Value::from(values.iter().filter_map(|value| value.as_f64()).sum::<f64>()),
    }
}

/// The related row each multi-valued relation of a scope is bound to,
/// keyed by the path of the relation. `None` binds an empty relation.
type Bindings<'a> = BTreeMap<String, Option<&'a Record>>;

/// Evaluates predicates over a borrowed set of tables, seeing related rows
/// through `restrictions`.
#[derive(Clone, Copy)]
struct Evaluator<'a, 'r> {
    registry: &'a Registry,
    tables: &'a Tables,
    restrictions: &'r [Restriction],
}

impl<'a> Evaluator<'a, 'static> {
    fn new(registry: &'a Registry, tables: &'a Tables) -> Self {
        Evaluator {
            registry,
            tables,
            restrictions: &[],
        }
    }
}

impl<'a, 'r> Evaluator<'a, 'r> {
    fn restricted<'s>(&self, restrictions: &'s [Restriction]) -> Evaluator<'a, 's> {
        Evaluator {
            registry: self.registry,
            tables: self.tables,
            restrictions,
        }
    }

    /// The rows of the query's entity that pass every pass, sorted but not
    /// limited.
    fn select(&self, query: &Query) -> Result<Vec<&'a Record>, Error> {
        let sorter = self.restricted(&query.order_by.restrictions);
        let mut rows = vec![];
        for record in self.table(query.entity.as_str())? {
            if self.passes(&query.entity, record, &query.passes)? {
                let sort_key = query
                    .order_by
                    .elements
                    .iter()
                    .map(|element| sorter.sort_value(&query.entity, record, &element.path))
                    .collect::<Result<Vec<_>, _>>()?;
                rows.push((sort_key, record));
            }
        }
        rows.sort_by(|(left, _), (right, _)| order(&query.order_by.elements, left, right));
        Ok(rows.into_iter().map(|(_, record)| record).collect())
    }

    fn table(&self, entity: &str) -> Result<&'a [Record], Error> {
        self.tables
            .get(entity)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::NoSuchTable(entity.to_string()))
    }

    fn descriptor(&self, entity: &str) -> Result<&'a EntityDescriptor, Error> {
        self.registry
            .lookup(entity)
            .map_err(|_| Error::NoSuchTable(entity.to_string()))
    }

    fn relation(&self, entity: &EntityName, field: &str) -> Result<Relation, Error> {
        self.registry.relation(entity.as_str(), field).ok_or_else(|| {
            Error::Storage(format!(
                "'{entity}.{field}' is not a relation to a registered entity"
            ))
        })
    }

    fn key_exists(&self, entity: &EntityName, key: &Value) -> Result<bool, Error> {
        let descriptor = self.descriptor(entity.as_str())?;
        Ok(self
            .table(entity.as_str())?
            .iter()
            .any(|row| row.key(descriptor).is_ok_and(|row_key| values_equal(row_key, key))))
    }

    /// The rows related to `record` through `relation`.
    fn related(&self, relation: &Relation, record: &Record) -> Result<Vec<&'a Record>, Error> {
        let source = self.descriptor(relation.source.as_str())?;
        let target = self.descriptor(relation.target.as_str())?;
        let table = self.table(relation.target.as_str())?;
        let info = source.field(relation.field.as_str()).ok_or_else(|| {
            Error::Storage(format!("'{}' has no field '{}'", source.name, relation.field))
        })?;
        let has_key = |row: &Record, key: &Value| row.key(target).is_ok_and(|k| values_equal(k, key));

        match &info.kind {
            FieldKind::ForeignKey { .. } | FieldKind::OneToOne { .. } => {
                match record.get(relation.field.as_str()) {
                    None | Some(Value::Null) => Ok(vec![]),
                    Some(key) => Ok(table.iter().filter(|row| has_key(row, key)).collect()),
                }
            }
            FieldKind::ManyToMany { .. } => match record.get(relation.field.as_str()) {
                None | Some(Value::Null) => Ok(vec![]),
                Some(Value::Array(keys)) => Ok(keys
                    .iter()
                    .filter_map(|key| table.iter().find(|row| has_key(row, key)))
                    .collect()),
                Some(other) => Err(Error::Storage(format!(
                    "'{}.{}' holds {other}, not a list of keys",
                    source.name, relation.field
                ))),
            },
            FieldKind::Reverse { via, .. } => {
                let key = record.key(source)?;
                let via_is_many = matches!(
                    target.field(via.as_str()).map(|info| &info.kind),
                    Some(FieldKind::ManyToMany { .. })
                );
                Ok(table
                    .iter()
                    .filter(|row| match row.get(via.as_str()) {
                        Some(Value::Array(keys)) if via_is_many => {
                            keys.iter().any(|k| values_equal(k, key))
                        }
                        Some(value) if !via_is_many => values_equal(value, key),
                        _ => false,
                    })
                    .collect())
            }
            FieldKind::Scalar { .. } => Err(Error::Storage(format!(
                "'{}.{}' is not a relation",
                source.name, relation.field
            ))),
        }
    }

    /// The related rows reachable through the relation path `path`: those
    /// matching its restriction, if it has one.
    fn visible_related(
        &self,
        relation: &Relation,
        record: &'a Record,
        path: &str,
    ) -> Result<Vec<&'a Record>, Error> {
        let rows = self.related(relation, record)?;
        let Some(restriction) = self
            .restrictions
            .iter()
            .find(|restriction| restriction.relation.to_string() == path)
        else {
            return Ok(rows);
        };
        let unrestricted = self.restricted(&[]);
        let mut visible = vec![];
        for row in rows {
            if unrestricted.exists(&restriction.entity, row, &restriction.predicate)? {
                visible.push(row);
            }
        }
        Ok(visible)
    }

    /// Does the record pass every filter pass?
    fn passes(
        &self,
        entity: &EntityName,
        record: &'a Record,
        passes: &[FilterPass],
    ) -> Result<bool, Error> {
        for pass in passes {
            let holds = self
                .restricted(&pass.restrictions)
                .exists(entity, record, &pass.predicate)?;
            let keep = match pass.kind {
                PassKind::Filter => holds,
                PassKind::Exclude => !holds,
            };
            if !keep {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Is there a binding of the multi-valued relations of the predicate
    /// under which it holds?
    fn exists(
        &self,
        entity: &EntityName,
        record: &'a Record,
        predicate: &Predicate,
    ) -> Result<bool, Error> {
        let mut prefixes = IndexSet::new();
        self.multi_valued_prefixes(entity, predicate, &mut prefixes)?;
        let prefixes: Vec<String> = prefixes.into_iter().collect();
        let mut bindings = Bindings::new();
        self.bind(entity, record, predicate, &prefixes, &mut bindings)
    }

    /// The paths of the multi-valued relations crossed by the comparisons of
    /// a predicate, parents before children. `NOT` scopes are left out, they
    /// bind on their own.
    fn multi_valued_prefixes(
        &self,
        entity: &EntityName,
        predicate: &Predicate,
        prefixes: &mut IndexSet<String>,
    ) -> Result<(), Error> {
        match predicate {
            Predicate::And(terms) | Predicate::Or(terms) => {
                for term in terms {
                    self.multi_valued_prefixes(entity, term, prefixes)?;
                }
            }
            Predicate::Not(_) => {}
            Predicate::Compare(comparison) => {
                let mut current = entity.clone();
                let relations = comparison.path.relations();
                for (index, segment) in relations.iter().enumerate() {
                    let relation = self.relation(&current, segment.as_str())?;
                    if relation.cardinality == Cardinality::Many {
                        prefixes.insert(prefix(relations, index));
                    }
                    current = relation.target;
                }
            }
        }
        Ok(())
    }

    fn bind(
        &self,
        entity: &EntityName,
        record: &'a Record,
        predicate: &Predicate,
        prefixes: &[String],
        bindings: &mut Bindings<'a>,
    ) -> Result<bool, Error> {
        let Some((first, rest)) = prefixes.split_first() else {
            return self.eval(entity, record, predicate, bindings);
        };
        let candidates = self.prefix_rows(entity, record, first, bindings)?;
        if candidates.is_empty() {
            bindings.insert(first.clone(), None);
            return self.bind(entity, record, predicate, rest, bindings);
        }
        for candidate in candidates {
            bindings.insert(first.clone(), Some(candidate));
            if self.bind(entity, record, predicate, rest, bindings)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// The candidate rows of a multi-valued relation path, given the
    /// bindings of its parents.
    fn prefix_rows(
        &self,
        entity: &EntityName,
        record: &'a Record,
        path: &str,
        bindings: &Bindings<'a>,
    ) -> Result<Vec<&'a Record>, Error> {
        let segments: Vec<&str> = path.split("__").collect();
        let mut current_entity = entity.clone();
        let mut current = record;
        for (index, segment) in segments.iter().enumerate() {
            let relation = self.relation(&current_entity, segment)?;
            if index + 1 == segments.len() {
                return self.visible_related(&relation, current, path);
            }
            match self.step(&relation, current, &segments[..=index].join("__"), bindings)? {
                Some(next) => current = next,
                None => return Ok(vec![]),
            }
            current_entity = relation.target;
        }
        Ok(vec![])
    }

    /// Follow one relation: single-valued relations to their row,
    /// multi-valued ones to the row bound in this scope.
    fn step(
        &self,
        relation: &Relation,
        record: &'a Record,
        path: &str,
        bindings: &Bindings<'a>,
    ) -> Result<Option<&'a Record>, Error> {
        match relation.cardinality {
            Cardinality::One => Ok(self
                .visible_related(relation, record, path)?
                .into_iter()
                .next()),
            Cardinality::Many => bindings.get(path).copied().ok_or_else(|| {
                Error::Storage(format!("the relation '{path}' is not bound in this scope"))
            }),
        }
    }

    fn value_at(
        &self,
        entity: &EntityName,
        record: &'a Record,
        path: &FieldPath,
        bindings: &Bindings<'a>,
    ) -> Result<Value, Error> {
        let relations = path.relations();
        let mut current_entity = entity.clone();
        let mut current = record;
        for (index, segment) in relations.iter().enumerate() {
            let relation = self.relation(&current_entity, segment.as_str())?;
            match self.step(&relation, current, &prefix(relations, index), bindings)? {
                Some(next) => current = next,
                None => return Ok(Value::Null),
            }
            current_entity = relation.target;
        }
        Ok(path
            .field()
            .and_then(|field| current.get(field.as_str()))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// The value to sort a row by. Sort paths never cross multi-valued
    /// relations.
    fn sort_value(
        &self,
        entity: &EntityName,
        record: &'a Record,
        path: &FieldPath,
    ) -> Result<Value, Error> {
        self.value_at(entity, record, path, &Bindings::new())
    }

    fn eval(
        &self,
        entity: &EntityName,
        record: &'a Record,
        predicate: &Predicate,
        bindings: &Bindings<'a>,
    ) -> Result<bool, Error> {
        match predicate {
            Predicate::And(terms) => {
                for term in terms {
                    if !self.eval(entity, record, term, bindings)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Predicate::Or(terms) => {
                for term in terms {
                    if self.eval(entity, record, term, bindings)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Predicate::Not(inner) => Ok(!self.exists(entity, record, inner)?),
            Predicate::Compare(comparison) => {
                let value = self.value_at(entity, record, &comparison.path, bindings)?;
                matches(&value, comparison.lookup, &comparison.value)
            }
        }
    }
}

fn prefix(relations: &[FieldName], index: usize) -> String {
    relations[..=index]
        .iter()
        .map(|segment| segment.as_str())
        .collect::<Vec<_>>()
        .join("__")
}

/// Does a stored value satisfy a lookup? Comparisons with null only hold
/// for `exact` null and `isnull`.
fn matches(value: &Value, lookup: Lookup, literal: &Literal) -> Result<bool, Error> {
    let expected = literal.to_json();
    let strings = || match (value, &expected) {
        (Value::String(value), Value::String(expected)) => Some((value.as_str(), expected.as_str())),
        _ => None,
    };
    let ordered = |bound: &Value, test: fn(Ordering) -> bool| {
        compare_values(value, bound).is_some_and(test)
    };

    Ok(match lookup {
        Lookup::Exact if expected.is_null() => value.is_null(),
        Lookup::Exact => values_equal(value, &expected),
        Lookup::CaseInsensitiveExact => {
            strings().is_some_and(|(v, e)| v.to_lowercase() == e.to_lowercase())
        }
        Lookup::Contains => strings().is_some_and(|(v, e)| v.contains(e)),
        Lookup::CaseInsensitiveContains => {
            strings().is_some_and(|(v, e)| v.to_lowercase().contains(&e.to_lowercase()))
        }
        Lookup::StartsWith => strings().is_some_and(|(v, e)| v.starts_with(e)),
        Lookup::CaseInsensitiveStartsWith => {
            strings().is_some_and(|(v, e)| v.to_lowercase().starts_with(&e.to_lowercase()))
        }
        Lookup::EndsWith => strings().is_some_and(|(v, e)| v.ends_with(e)),
        Lookup::CaseInsensitiveEndsWith => {
            strings().is_some_and(|(v, e)| v.to_lowercase().ends_with(&e.to_lowercase()))
        }
        Lookup::LessThan => ordered(&expected, Ordering::is_lt),
        Lookup::LessThanOrEqualTo => ordered(&expected, Ordering::is_le),
        Lookup::GreaterThan => ordered(&expected, Ordering::is_gt),
        Lookup::GreaterThanOrEqualTo => ordered(&expected, Ordering::is_ge),
        Lookup::In => expected
            .as_array()
            .is_some_and(|items| items.iter().any(|item| values_equal(value, item))),
        Lookup::Range => match expected.as_array().map(Vec::as_slice) {
            Some([low, high]) => ordered(low, Ordering::is_ge) && ordered(high, Ordering::is_le),
            _ => false,
        },
        Lookup::IsNull => expected.as_bool() == Some(value.is_null()),
        Lookup::Regex | Lookup::CaseInsensitiveRegex => {
            let Some((value, pattern)) = strings() else {
                return Ok(false);
            };
            let pattern = if lookup == Lookup::CaseInsensitiveRegex {
                format!("(?i){pattern}")
            } else {
                pattern.to_string()
            };
            regex::Regex::new(&pattern)
                .map_err(|err| Error::Storage(err.to_string()))?
                .is_match(value)
        }
    })
}
