//! Sifter Core Library
//!
//! Turns request parameters (page, sort, filter) into constraints on a base
//! query and runs it through a pluggable repository.
//!
//! The pipeline is filter → sort → paginate → execute, with page counts
//! computed from a distinct count of the filtered query. Field names from
//! requests are only ever used after coercion against a [`Schema`].

pub mod error;
pub mod filter;
pub mod paginate;
pub mod params;
pub mod postgres;
pub mod query;
pub mod repository;
pub mod rules;
pub mod schema;
pub mod service;
pub mod sort;

pub use error::{QueryError, QueryResult};
pub use filter::filter;
pub use paginate::paginate;
pub use params::{FilterMap, PageParam, Params, RawParams, normalize};
pub use postgres::{PgConfig, PgRepository};
pub use query::{CompareOp, FilterValue, OrderClause, Predicate, Queryable, SortDirection};
pub use repository::{QuerySource, Repository};
pub use rules::{FilterHandler, FilterRule, FilterRules, SortHandler, SortRule, SortRules};
pub use schema::{Ident, Schema};
pub use service::{PageCountOptions, PageResult, QueryService, page_count};
pub use sort::{parse_sort, sort};
