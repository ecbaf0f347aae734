//! The seam between the engine and the store that holds the rows.

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;

use query_engine_metadata::metadata::Relation;
use query_engine_predicate::predicate::ast::{Aggregate, Predicate, Query, WriteOperation};

use crate::error::Error;
use crate::record::Record;

/// A store that can run assembled queries. Providers receive only
/// provider-neutral structures, already validated and authorized.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// The rows of `query.entity` that pass every filter pass, ordered and
    /// limited as the query says.
    async fn fetch(&self, query: &Query) -> Result<Vec<Record>, Error>;

    /// The rows related to `record` through `relation`, keeping only those
    /// matching `row_filter` when there is one.
    async fn related(
        &self,
        relation: &Relation,
        record: &Record,
        row_filter: Option<&Predicate>,
    ) -> Result<Vec<Record>, Error>;

    /// Does the query match any row?
    async fn exists(&self, query: &Query) -> Result<bool, Error> {
        Ok(!self.fetch(query).await?.is_empty())
    }

    /// Summarize every row passing the filter passes of the query, keyed by
    /// alias. The limit of the query is ignored.
    async fn aggregate(
        &self,
        query: &Query,
        aggregates: &[Aggregate],
    ) -> Result<IndexMap<String, Value>, Error>;

    /// Insert a row. The row must satisfy every pass of `write.guard`,
    /// otherwise nothing is written.
    async fn create(&self, write: &WriteOperation) -> Result<Record, Error>;
}
