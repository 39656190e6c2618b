//! Filter engine: folds a `filter` map into predicates on a queryable.

use crate::error::QueryResult;
use crate::params::FilterMap;
use crate::query::Queryable;
use crate::rules::FilterRules;

/// Apply every `(field, value)` entry of `filter` to `query`, in map order.
///
/// Each entry goes through `rules`: a matching override, or equality. Field
/// names must be schema columns or names declared by one of `rules`.
pub fn filter(
    query: Queryable,
    filter: Option<&FilterMap>,
    rules: &FilterRules,
) -> QueryResult<Queryable> {
    let Some(filter) = filter else {
        return Ok(query);
    };

    filter.iter().try_fold(query, |query, (name, value)| {
        let field = query.schema().coerce(name, rules.declares(name))?;
        rules.dispatch(query, &field, value)
    })
}
