//! Cancellation-aware statement execution.
//!
//! Every statement the engine issues goes through [`Conn`], which races the
//! query against the caller's [`CancellationToken`]. Dropping the in-flight
//! future releases the connection back to the pool and the driver cancels
//! the server-side query; the caller sees the distinct
//! [`MigrationError::Cancelled`] instead of a backend failure.

use std::future::Future;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{MigrationError, Result};

#[derive(Clone, Copy)]
pub struct Conn<'a> {
    pool: &'a PgPool,
    cancel: &'a CancellationToken,
}

impl<'a> Conn<'a> {
    pub fn new(pool: &'a PgPool, cancel: &'a CancellationToken) -> Self {
        Self { pool, cancel }
    }

    pub fn pool(&self) -> &'a PgPool {
        self.pool
    }

    /// Execute a single statement, discarding its result.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        debug!(sql, "executing");
        self.guard(sqlx::query(sql).execute(self.pool)).await?;
        Ok(())
    }

    /// Execute each statement in order, stopping at the first failure.
    pub async fn execute_all(&self, statements: &[String]) -> Result<()> {
        for sql in statements {
            self.execute(sql).await?;
        }
        Ok(())
    }

    /// Fetch a single optional text scalar, binding `param` when present.
    /// Used by the backfill loop to carry the last-seen key between batches.
    pub async fn fetch_optional_text(
        &self,
        sql: &str,
        param: Option<&str>,
    ) -> Result<Option<String>> {
        debug!(sql, "querying");
        let query = match param {
            Some(p) => sqlx::query_scalar(sql).bind(p.to_string()),
            None => sqlx::query_scalar(sql),
        };
        self.guard(query.fetch_optional(self.pool)).await
    }

    async fn guard<T>(
        &self,
        fut: impl Future<Output = std::result::Result<T, sqlx::Error>>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(MigrationError::Cancelled),
            res = fut => res.map_err(MigrationError::from),
        }
    }
}
