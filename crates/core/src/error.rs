//! Query pipeline error types.

use thiserror::Error;

/// Longest identifier echoed back in an error message.
const MAX_ECHOED_IDENT: usize = 64;

/// Errors raised while normalizing parameters or building and running queries.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("unknown identifier: '{0}'")]
    UnknownIdentifier(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("invalid page parameter: {0}")]
    InvalidPageParam(String),

    #[error("unsupported filter value for field '{field}'")]
    UnsupportedFilterValue { field: String },

    #[error("a page size or limit is required to count pages")]
    MissingPageSizeForCount,

    #[error("page size must be a positive integer")]
    ZeroPageSize,

    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    #[error(transparent)]
    Repository(#[from] anyhow::Error),
}

impl QueryError {
    /// Build an `UnknownIdentifier` error, truncating long input.
    pub(crate) fn unknown_identifier(name: &str) -> Self {
        let truncated: String = name.chars().take(MAX_ECHOED_IDENT).collect();
        QueryError::UnknownIdentifier(truncated)
    }

    /// Whether the error was caused by the caller's input rather than by a
    /// programming mistake or the repository.
    ///
    /// Embedding applications map these to a "bad request" response.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            QueryError::UnknownIdentifier(_)
                | QueryError::InvalidParams(_)
                | QueryError::InvalidPageParam(_)
                | QueryError::UnsupportedFilterValue { .. }
        )
    }
}

/// Result type alias using QueryError.
pub type QueryResult<T> = Result<T, QueryError>;
