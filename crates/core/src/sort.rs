//! Sort engine: turns a `sort` parameter into ordering on a queryable.

use crate::error::QueryResult;
use crate::query::{Queryable, SortDirection};
use crate::rules::SortRules;

/// Split a sort string into field name and direction.
///
/// A leading `-` selects descending order. Returns `None` for an empty string.
pub fn parse_sort(sort: &str) -> Option<(&str, SortDirection)> {
    if sort.is_empty() {
        return None;
    }
    match sort.strip_prefix('-') {
        Some(field) => Some((field, SortDirection::Desc)),
        None => Some((sort, SortDirection::Asc)),
    }
}

/// Order `query` by the field named in `sort`.
///
/// The field must be a schema column or a name declared by one of `rules`;
/// anything else fails with `UnknownIdentifier`.
pub fn sort(query: Queryable, sort: Option<&str>, rules: &SortRules) -> QueryResult<Queryable> {
    let Some((name, direction)) = sort.and_then(parse_sort) else {
        return Ok(query);
    };

    let field = query.schema().coerce(name, rules.declares(name))?;
    rules.dispatch(query, &field, direction)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::QueryError;
    use crate::rules::SortRule;
    use crate::schema::{Ident, Schema};
    use std::sync::{Arc, Mutex};

    fn base() -> Queryable {
        Queryable::new(Arc::new(Schema::new("items", "id", ["foo", "bar"]).unwrap()))
    }

    /// Rules that record every dispatched pair and apply nothing.
    fn recording() -> (SortRules, Arc<Mutex<Vec<(String, SortDirection)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let rules = SortRules::new().with_rule(SortRule::when(
            move |field: &Ident, direction| {
                sink.lock()
                    .unwrap()
                    .push((field.to_string(), direction));
                true
            },
            |q, _, _| Ok(q),
        ));
        (rules, seen)
    }

    #[test]
    fn parse_directions() {
        assert_eq!(parse_sort("-foo"), Some(("foo", SortDirection::Desc)));
        assert_eq!(parse_sort("foo"), Some(("foo", SortDirection::Asc)));
        assert_eq!(parse_sort(""), None);
    }

    #[test]
    fn dispatch_receives_direction() {
        let (rules, seen) = recording();

        sort(base(), Some("-foo"), &rules).unwrap();
        sort(base(), Some("foo"), &rules).unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ("foo".to_string(), SortDirection::Desc),
                ("foo".to_string(), SortDirection::Asc),
            ]
        );
    }

    #[test]
    fn empty_and_absent_sorts_are_noops() {
        let (rules, seen) = recording();

        let q = sort(base(), Some(""), &rules).unwrap();
        assert!(q.orderings().is_empty());
        let q = sort(base(), None, &rules).unwrap();
        assert!(q.orderings().is_empty());

        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn default_orders_by_field() {
        let q = sort(base(), Some("-bar"), &SortRules::new()).unwrap();
        let sql = q.to_sql();
        assert!(sql.contains(r#"ORDER BY "items"."bar" DESC"#), "{sql}");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = sort(base(), Some("-password"), &SortRules::new()).unwrap_err();
        assert!(matches!(err, QueryError::UnknownIdentifier(name) if name == "password"));

        // A lone dash leaves an empty field name.
        assert!(sort(base(), Some("-"), &SortRules::new()).is_err());
    }

    #[test]
    fn declared_derived_field_is_accepted() {
        let rules = SortRules::new().with_rule(SortRule::field("popularity", |q, direction| {
            let bar = q.field("bar")?;
            let foo = q.field("foo")?;
            Ok(q.order_by(bar, direction).order_by(foo, SortDirection::Asc))
        }));

        let q = sort(base(), Some("-popularity"), &rules).unwrap();
        let sql = q.to_sql();
        assert!(
            sql.contains(r#"ORDER BY "items"."bar" DESC, "items"."foo" ASC"#),
            "{sql}"
        );
    }

    #[test]
    fn derived_field_without_matching_direction_is_rejected() {
        let rules = SortRules::new().with_rule(SortRule::field_direction(
            "popularity",
            SortDirection::Desc,
            |q| {
                let bar = q.field("bar")?;
                Ok(q.order_by(bar, SortDirection::Desc))
            },
        ));

        assert!(sort(base(), Some("-popularity"), &rules).is_ok());

        let err = sort(base(), Some("popularity"), &rules).unwrap_err();
        assert!(matches!(err, QueryError::UnknownIdentifier(name) if name == "popularity"));
    }
}
