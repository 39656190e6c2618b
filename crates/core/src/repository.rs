//! Collaborator contracts: where base queries come from and how they run.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::QueryResult;
use crate::query::Queryable;
use crate::schema::Schema;

/// Supplies the base queryable that every request starts from.
///
/// The base may already carry predicates, for example to hide soft-deleted
/// rows; request filters are AND-ed onto it.
pub trait QuerySource: Send + Sync {
    fn base_queryable(&self) -> QueryResult<Queryable>;
}

impl QuerySource for Arc<Schema> {
    fn base_queryable(&self) -> QueryResult<Queryable> {
        Ok(Queryable::new(self.clone()))
    }
}

impl<F> QuerySource for F
where
    F: Fn() -> QueryResult<Queryable> + Send + Sync,
{
    fn base_queryable(&self) -> QueryResult<Queryable> {
        self()
    }
}

/// Executes queryables against a data store.
///
/// Errors are passed through to callers untouched.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Row type produced by `execute`.
    type Record: Send;

    /// Run the query and return its rows in query order.
    async fn execute(&self, query: &Queryable) -> anyhow::Result<Vec<Self::Record>>;

    /// Count distinct primary keys matching the query's predicates.
    ///
    /// Ordering and window are ignored.
    async fn count(&self, query: &Queryable) -> anyhow::Result<u64>;
}

#[async_trait]
impl<R: Repository + ?Sized> Repository for Arc<R> {
    type Record = R::Record;

    async fn execute(&self, query: &Queryable) -> anyhow::Result<Vec<Self::Record>> {
        (**self).execute(query).await
    }

    async fn count(&self, query: &Queryable) -> anyhow::Result<u64> {
        (**self).count(query).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::query::Predicate;

    #[test]
    fn schema_source_is_unconstrained() {
        let schema = Arc::new(Schema::new("items", "id", ["foo"]).unwrap());
        let q = schema.base_queryable().unwrap();
        assert!(q.predicates().is_empty());
        assert_eq!(q.schema().table(), "items");
    }

    #[test]
    fn closure_source_carries_base_predicates() {
        let schema = Arc::new(Schema::new("items", "id", ["foo"]).unwrap());
        let source = move || -> QueryResult<Queryable> {
            let q = Queryable::new(schema.clone());
            let foo = q.field("foo")?;
            Ok(q.and_where(Predicate::ne(foo, "baz")))
        };

        let q = source.base_queryable().unwrap();
        assert_eq!(q.predicates().len(), 1);
    }
}
