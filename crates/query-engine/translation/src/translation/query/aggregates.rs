//! Translate the summaries of an aggregating operation.

use query_engine_metadata::metadata::ScalarType;
use query_engine_predicate::predicate::ast::{Aggregate, AggregateFunction};

use crate::request::AggregateRequest;
use crate::translation::error::{Error, NodeLocation};
use crate::translation::helpers::Env;

/// Aggregates summarize scalar fields of the root entity. `sum` and `avg`
/// need numbers; `min` and `max` need values with an order.
pub fn translate_aggregates(
    env: &Env,
    requested: &[AggregateRequest],
    location: &NodeLocation,
) -> Result<Vec<Aggregate>, Error> {
    if requested.is_empty() {
        return Err(Error::EmptyCombinator {
            location: location.clone(),
            node: "aggregate",
        });
    }
    requested
        .iter()
        .enumerate()
        .map(|(index, request)| {
            let location = location.field("aggregates").index(index);
            let path = match &request.field {
                None if request.function == AggregateFunction::Count => None,
                None => {
                    return Err(Error::NotAggregatable {
                        location,
                        path: String::new(),
                        function: request.function,
                    })
                }
                Some(field) => {
                    let resolved = env.resolve_path(field, &location)?;
                    let not_aggregatable = || Error::NotAggregatable {
                        location: location.clone(),
                        path: field.clone(),
                        function: request.function,
                    };
                    if resolved.path.len() != 1 {
                        return Err(not_aggregatable());
                    }
                    let supported = match request.function {
                        AggregateFunction::Count => true,
                        AggregateFunction::Sum | AggregateFunction::Avg => {
                            matches!(resolved.scalar_type, ScalarType::Integer | ScalarType::Float)
                        }
                        AggregateFunction::Min | AggregateFunction::Max => !matches!(
                            resolved.scalar_type,
                            ScalarType::Boolean | ScalarType::Json
                        ),
                    };
                    if !supported {
                        return Err(not_aggregatable());
                    }
                    Some(resolved.path)
                }
            };
            Ok(Aggregate {
                function: request.function,
                path,
                alias: request.alias(),
            })
        })
        .collect()
}
