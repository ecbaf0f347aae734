//! Translate a `sort` node into ORDER BY elements.

use query_engine_predicate::predicate::ast::{OrderByElement, OrderDirection};

use crate::translation::error::{Error, NodeLocation};
use crate::translation::helpers::Env;

/// Convert the field paths of a sort into order by elements. A leading `-`
/// sorts in descending order. A path crossing a multi-valued relation has no
/// single value per row and is rejected.
pub fn translate_sort(
    env: &Env,
    fields: &[String],
    location: &NodeLocation,
) -> Result<Vec<OrderByElement>, Error> {
    fields
        .iter()
        .enumerate()
        .map(|(index, field)| {
            let location = location.index(index);
            let (path, direction) = match field.strip_prefix('-') {
                Some(path) => (path, OrderDirection::Desc),
                None => (field.as_str(), OrderDirection::Asc),
            };
            let resolved = env.resolve_path(path, &location)?;
            if let Some(relation) = resolved.multi_valued {
                return Err(Error::UnorderableField {
                    location,
                    path: path.to_string(),
                    relation: relation.to_string(),
                });
            }
            Ok(OrderByElement {
                path: resolved.path,
                direction,
            })
        })
        .collect()
}
