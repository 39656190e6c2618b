//! PostgreSQL repository backed by a sqlx pool.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::query::Queryable;
use crate::repository::Repository;

/// Connection settings for [`PgRepository`].
#[derive(Debug, Clone)]
pub struct PgConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub max_connections: u32,

    /// Per-query statement timeout (default: 10s). `None` disables it.
    pub statement_timeout: Option<Duration>,
}

impl PgConfig {
    /// Load configuration from environment variables.
    ///
    /// - `DATABASE_URL` (required)
    /// - `DATABASE_MAX_CONNECTIONS` (default: 10)
    /// - `QUERY_STATEMENT_TIMEOUT_MS` (default: 10000, 0 disables)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url =
            lookup("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let max_connections = lookup("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let timeout_ms: u64 = lookup("QUERY_STATEMENT_TIMEOUT_MS")
            .unwrap_or_else(|| "10000".to_string())
            .parse()
            .context("QUERY_STATEMENT_TIMEOUT_MS must be a valid u64")?;

        let statement_timeout = match timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };

        Ok(Self {
            database_url,
            max_connections,
            statement_timeout,
        })
    }
}

/// Repository that runs queryables against PostgreSQL and returns rows as JSON.
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
    statement_timeout: Option<Duration>,
}

impl PgRepository {
    /// Wrap an existing pool. No statement timeout is applied.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: None,
        }
    }

    /// Create a pool from `config`.
    pub async fn connect(config: &PgConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .context("failed to connect to PostgreSQL")?;

        Ok(Self {
            pool,
            statement_timeout: config.statement_timeout,
        })
    }

    #[must_use]
    pub fn with_statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> Result<sqlx::Transaction<'static, sqlx::Postgres>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("failed to begin transaction")?;

        // SET LOCAL resets on commit/rollback.
        if let Some(sql) = statement_timeout_sql(self.statement_timeout) {
            sqlx::query(&sql)
                .execute(&mut *tx)
                .await
                .context("failed to set statement timeout")?;
        }

        Ok(tx)
    }
}

#[async_trait]
impl Repository for PgRepository {
    type Record = serde_json::Value;

    async fn execute(&self, query: &Queryable) -> Result<Vec<serde_json::Value>> {
        let sql = row_json_sql(query);
        tracing::debug!(sql = %sql, "executing query");

        let mut tx = self.begin().await?;
        let rows: Vec<serde_json::Value> = sqlx::query_scalar(&sql)
            .fetch_all(&mut *tx)
            .await
            .context("failed to execute query")?;
        tx.commit()
            .await
            .context("failed to commit query transaction")?;

        Ok(rows)
    }

    async fn count(&self, query: &Queryable) -> Result<u64> {
        let sql = query.to_count_sql();
        tracing::debug!(sql = %sql, "executing count query");

        let mut tx = self.begin().await?;
        let total: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&mut *tx)
            .await
            .context("failed to execute count query")?;
        tx.commit()
            .await
            .context("failed to commit query transaction")?;

        Ok(u64::try_from(total).unwrap_or(0))
    }
}

/// Wrap the query so each row comes back as one JSON object.
///
/// A subquery's ORDER BY does not bind the outer select, so the orderings
/// are repeated against the wrapped rows.
fn row_json_sql(query: &Queryable) -> String {
    let inner = query.to_sql();
    let order: Vec<String> = query
        .orderings()
        .iter()
        .map(|o| format!(r#"t."{}" {}"#, o.field, o.direction.as_str().to_uppercase()))
        .collect();

    if order.is_empty() {
        format!("SELECT row_to_json(t) FROM ({inner}) t")
    } else {
        format!(
            "SELECT row_to_json(t) FROM ({inner}) t ORDER BY {}",
            order.join(", ")
        )
    }
}

fn statement_timeout_sql(timeout: Option<Duration>) -> Option<String> {
    timeout.map(|t| format!("SET LOCAL statement_timeout = {}", t.as_millis()))
}
