//! Query façade: list and page-count operations over a repository.
//!
//! Provides:
//! - `list`: filter → sort → paginate → execute
//! - `get_page_count`: filter → distinct count → page arithmetic
//! - `list_page`: both, with pager metadata

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{QueryError, QueryResult};
use crate::filter::filter;
use crate::paginate::paginate;
use crate::params::Params;
use crate::query::Queryable;
use crate::repository::{QuerySource, Repository};
use crate::rules::{FilterRules, SortRules};
use crate::sort::sort;

/// Options for page counting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCountOptions {
    /// Report 0 pages for an empty result instead of 1.
    #[serde(default)]
    pub allow_zero: bool,
}

impl PageCountOptions {
    pub fn allow_zero() -> Self {
        Self { allow_zero: true }
    }
}

/// Number of pages needed for `total` items at `page_size` per page.
///
/// Computed as `floor((total - 1) / page_size) + 1`, which is 0 for an empty
/// result. Unless `allow_zero` is set, 0 is reported as 1: an empty result
/// still has one (empty) page.
pub fn page_count(total: u64, page_size: u64, options: PageCountOptions) -> QueryResult<u64> {
    if page_size == 0 {
        return Err(QueryError::ZeroPageSize);
    }

    let count = (i128::from(total) - 1).div_euclid(i128::from(page_size)) + 1;
    if count <= 0 && !options.allow_zero {
        return Ok(1);
    }
    Ok(u64::try_from(count).unwrap_or(0))
}

/// One page of results with pager metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult<T> {
    /// Rows on this page.
    pub items: Vec<T>,

    /// Total matching rows (before paging).
    pub total: u64,

    /// Current page number (1-indexed).
    pub page: u64,

    /// Items per page.
    pub page_size: u64,

    /// Total number of pages.
    pub page_count: u64,

    /// Whether there's a next page.
    pub has_next: bool,

    /// Whether there's a previous page.
    pub has_prev: bool,
}

/// Runs parameter-driven list queries for one source and repository.
pub struct QueryService<R: Repository> {
    source: Arc<dyn QuerySource>,
    repo: R,
    sort_rules: SortRules,
    filter_rules: FilterRules,
}

impl<R: Repository> QueryService<R> {
    /// Create a service with no override rules.
    pub fn new(source: impl QuerySource + 'static, repo: R) -> Self {
        Self {
            source: Arc::new(source),
            repo,
            sort_rules: SortRules::new(),
            filter_rules: FilterRules::new(),
        }
    }

    #[must_use]
    pub fn with_sort_rules(mut self, rules: SortRules) -> Self {
        self.sort_rules = rules;
        self
    }

    #[must_use]
    pub fn with_filter_rules(mut self, rules: FilterRules) -> Self {
        self.filter_rules = rules;
        self
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn sort_rules(&self) -> &SortRules {
        &self.sort_rules
    }

    pub fn filter_rules(&self) -> &FilterRules {
        &self.filter_rules
    }

    /// Build the queryable `list` would execute.
    pub fn list_query(&self, params: &Params) -> QueryResult<Queryable> {
        let query = self.filtered(params)?;
        let query = sort(query, params.sort.as_deref(), &self.sort_rules)?;
        Ok(paginate(query, params.page.as_ref()))
    }

    /// Build the queryable `get_page_count` would count. Sort and page are ignored.
    pub fn count_query(&self, params: &Params) -> QueryResult<Queryable> {
        self.filtered(params)
    }

    /// Fetch the rows selected by `params`, in sort order.
    pub async fn list(&self, params: &Params) -> QueryResult<Vec<R::Record>> {
        let query = self.list_query(params)?;

        tracing::debug!(
            table = %query.schema().table(),
            predicates = query.predicates().len(),
            orderings = query.orderings().len(),
            limit = ?query.limit(),
            offset = ?query.offset(),
            "executing list query"
        );

        Ok(self.repo.execute(&query).await?)
    }

    /// Count the pages `params` spans.
    ///
    /// Requires a page size (`size` or `limit`); calling without one is a
    /// contract violation reported as `MissingPageSizeForCount`.
    pub async fn get_page_count(
        &self,
        params: &Params,
        options: PageCountOptions,
    ) -> QueryResult<u64> {
        let page_size = required_page_size(params)?;
        let total = self.count(params).await?;
        page_count(total, page_size, options)
    }

    /// Fetch one page of rows along with the total and pager metadata.
    pub async fn list_page(
        &self,
        params: &Params,
        options: PageCountOptions,
    ) -> QueryResult<PageResult<R::Record>> {
        let page_size = required_page_size(params)?;
        let total = self.count(params).await?;
        let page_count = page_count(total, page_size, options)?;
        let items = self.list(params).await?;

        let offset = params.page.map(|p| p.offset()).unwrap_or(0);
        let page = offset / page_size + 1;

        Ok(PageResult {
            items,
            total,
            page,
            page_size,
            page_count,
            has_next: page < page_count,
            has_prev: page > 1,
        })
    }

    fn filtered(&self, params: &Params) -> QueryResult<Queryable> {
        let base = self.source.base_queryable()?;
        filter(base, params.filter.as_ref(), &self.filter_rules)
    }

    async fn count(&self, params: &Params) -> QueryResult<u64> {
        let query = self.count_query(params)?;

        tracing::debug!(
            table = %query.schema().table(),
            predicates = query.predicates().len(),
            "executing count query"
        );

        Ok(self.repo.count(&query).await?)
    }
}

fn required_page_size(params: &Params) -> QueryResult<u64> {
    let page = params
        .page
        .as_ref()
        .ok_or(QueryError::MissingPageSizeForCount)?;
    match page.page_size() {
        0 => Err(QueryError::ZeroPageSize),
        size => Ok(size),
    }
}
