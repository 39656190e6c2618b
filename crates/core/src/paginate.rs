//! Pagination engine: applies a page window to a queryable.

use crate::params::PageParam;
use crate::query::Queryable;

/// Bound `query` to the window described by `page`.
///
/// - `Classic { size, number }`: `limit = size`, `offset = (number - 1) * size`
///   with `number` defaulting to 1.
/// - `Raw { limit, offset }`: applied as given, `offset` defaulting to 0.
///
/// No upper bound is enforced on the page size.
pub fn paginate(query: Queryable, page: Option<&PageParam>) -> Queryable {
    let Some(page) = page else {
        return query;
    };

    query
        .with_limit(page.page_size())
        .with_offset(page.offset())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use std::sync::Arc;

    fn base() -> Queryable {
        Queryable::new(Arc::new(Schema::new("items", "id", ["foo"]).unwrap()))
    }

    fn window(q: &Queryable) -> (Option<u64>, Option<u64>) {
        (q.limit(), q.offset())
    }

    #[test]
    fn no_page_is_a_noop() {
        let q = paginate(base(), None);
        assert_eq!(window(&q), (None, None));
        assert!(!q.to_sql().contains("LIMIT"));
    }

    #[test]
    fn classic_second_page() {
        let q = paginate(base(), Some(&PageParam::classic(5, 2)));
        assert_eq!(window(&q), (Some(5), Some(5)));
    }

    #[test]
    fn classic_defaults_to_first_page() {
        let page = PageParam::Classic {
            size: 5,
            number: None,
        };
        let q = paginate(base(), Some(&page));
        assert_eq!(window(&q), (Some(5), Some(0)));
    }

    #[test]
    fn raw_window_is_unchanged() {
        let q = paginate(base(), Some(&PageParam::raw(5, 7)));
        assert_eq!(window(&q), (Some(5), Some(7)));

        let page = PageParam::Raw {
            limit: 5,
            offset: None,
        };
        let q = paginate(base(), Some(&page));
        assert_eq!(window(&q), (Some(5), Some(0)));
    }

    #[test]
    fn large_page_sizes_are_not_capped() {
        let q = paginate(base(), Some(&PageParam::classic(1_000_000, 3)));
        assert_eq!(window(&q), (Some(1_000_000), Some(2_000_000)));
    }

    #[test]
    fn rendered_window() {
        let sql = paginate(base(), Some(&PageParam::classic(10, 2))).to_sql();
        assert!(sql.contains("LIMIT 10"), "{sql}");
        assert!(sql.contains("OFFSET 10"), "{sql}");
    }
}
