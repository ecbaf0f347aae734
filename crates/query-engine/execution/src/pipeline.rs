//! Run a request end to end: plan it, execute it against a storage
//! provider, and serialize the result.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info_span, Instrument};

use query_engine_predicate::predicate::ast::FieldSelection;
use query_engine_translation::request::{QueryRequest, Requester};
use query_engine_translation::translation::query::{Assembler, Plan, ReadMode};

use crate::error::{Error, RequestError};
use crate::provider::StorageProvider;
use crate::record::Record;
use crate::serialize::{serialize, ResponsePayload};

/// What a request answers with: serialized rows, or a single value for
/// `exists` and the aggregating operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Rows(ResponsePayload),
    Value { data: Value, model_name: String },
}

impl Response {
    pub fn rows(self) -> Option<ResponsePayload> {
        match self {
            Response::Rows(payload) => Some(payload),
            Response::Value { .. } => None,
        }
    }
}

/// Process a request
///
/// A read returns the rows the requester may see. `get` fails unless exactly
/// one row is visible. A create returns the new row as the only row of the
/// response.
pub async fn process_request(
    assembler: &Assembler<'_>,
    provider: &dyn StorageProvider,
    request: &QueryRequest,
    requester: &Requester,
) -> Result<Response, RequestError> {
    tracing::info!(entity = %request.entity, operation = request.operation.name(), "processing request");
    tracing::debug!("{:?}", request);

    // Compile the request.
    let plan = async {
        assembler.plan(request, requester).map_err(|err| {
            tracing::error!("{}", err);
            RequestError::from(err)
        })
    }
    .instrument(info_span!("Plan query"))
    .await?;

    // Execute the plan.
    let model_name = request.entity.to_string();
    let executed = async {
        match &plan {
            Plan::Read {
                query,
                selection,
                mode,
            } => {
                let rows = provider.fetch(query).await?;
                if *mode == ReadMode::Get {
                    match rows.len() {
                        0 => return Err(Error::NotFound { entity: model_name.clone() }),
                        1 => {}
                        _ => return Err(Error::MultipleRows { entity: model_name.clone() }),
                    }
                }
                Ok(Executed::Rows(selection, rows))
            }
            Plan::Create { write, selection } => {
                let row = provider.create(write).await?;
                Ok(Executed::Rows(selection, vec![row]))
            }
            Plan::Exists { query } => Ok(Executed::Value(Value::Bool(provider.exists(query).await?))),
            Plan::Aggregate {
                query,
                aggregates,
                single_value,
            } => {
                let summary = provider.aggregate(query, aggregates).await?;
                let value = if *single_value {
                    summary.into_values().next().unwrap_or(Value::Null)
                } else {
                    Value::Object(summary.into_iter().collect())
                };
                Ok(Executed::Value(value))
            }
        }
    }
    .instrument(info_span!("Execute query"))
    .await
    .map_err(|err| {
        tracing::error!("{}", err);
        RequestError::from(err)
    })?;

    match executed {
        Executed::Rows(selection, rows) => {
            let payload = serialize(provider, assembler.registry, selection, rows)
                .instrument(info_span!("Create response"))
                .await?;
            Ok(Response::Rows(payload))
        }
        Executed::Value(data) => Ok(Response::Value { data, model_name }),
    }
}

enum Executed<'a> {
    Rows(&'a FieldSelection, Vec<Record>),
    Value(Value),
}
