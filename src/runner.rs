//! The migration runner: drives Start, Complete and Rollback over a batch
//! of operations.
//!
//! Each phase is a separate short session holding a database advisory lock,
//! so two runners can never interleave schema changes on the same database.
//! The schema snapshot is refreshed between operations; an operation
//! therefore observes the effects of the ones before it in the same
//! migration. If operation *k* fails, operations *1..k-1* stay applied and
//! the error is surfaced; a subsequent Rollback undoes them in reverse
//! order.

use std::sync::Arc;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::catalog::Introspector;
use crate::config::RunnerOptions;
use crate::db::Conn;
use crate::error::{MigrationError, Result};
use crate::migration::Migration;
use crate::operations::{Callback, CompleteContext, RollbackContext, StartContext};
use crate::state::StateCatalog;
use crate::views::{self, ViewPlan};

pub struct MigrationRunner {
    pool: PgPool,
    state: Arc<dyn StateCatalog>,
    options: RunnerOptions,
}

impl MigrationRunner {
    pub fn new(pool: PgPool, state: Arc<dyn StateCatalog>) -> Self {
        Self {
            pool,
            state,
            options: RunnerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate the whole batch, then start each operation in order and
    /// build the new version schema. On failure the database stays
    /// partially started; nothing is compensated implicitly.
    pub async fn start(
        &self,
        migration: &Migration,
        callbacks: &[Callback],
        cancel: &CancellationToken,
    ) -> Result<()> {
        info!(migration = %migration.name, "starting migration");
        self.locked(cancel, self.start_inner(migration, callbacks, cancel))
            .await?;
        info!(migration = %migration.name, "migration started");
        Ok(())
    }

    /// Remove the old side of every operation and retire the previous
    /// version schema.
    pub async fn complete(&self, migration: &Migration, cancel: &CancellationToken) -> Result<()> {
        info!(migration = %migration.name, "completing migration");
        self.locked(cancel, self.complete_inner(migration, cancel))
            .await?;
        info!(migration = %migration.name, "migration completed");
        Ok(())
    }

    /// Remove the new side of every operation, newest first, restoring the
    /// pre-start physical schema.
    pub async fn rollback(&self, migration: &Migration, cancel: &CancellationToken) -> Result<()> {
        info!(migration = %migration.name, "rolling back migration");
        self.locked(cancel, self.rollback_inner(migration, cancel))
            .await?;
        info!(migration = %migration.name, "migration rolled back");
        Ok(())
    }

    async fn start_inner(
        &self,
        migration: &Migration,
        callbacks: &[Callback],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let introspector = self.introspector();
        let mut schema = introspector.read().await?;

        // All validation happens before the first statement.
        migration.validate(&schema)?;

        self.state.start_migration(&migration.name).await?;

        let mut plan = ViewPlan::new();
        for operation in &migration.operations {
            let mut ctx = StartContext {
                conn: Conn::new(&self.pool, cancel),
                schema_name: &self.options.schema,
                state_schema: self.state.schema(),
                schema: &schema,
                view: &mut plan,
                backfill_batch_size: self.options.backfill_batch_size,
                callbacks,
            };
            operation.start(&mut ctx).await?;
            schema = introspector.read().await?;
        }

        views::create_version_schema(
            &Conn::new(&self.pool, cancel),
            &schema,
            &self.options.schema,
            &migration.name,
            &plan,
        )
        .await
    }

    async fn complete_inner(
        &self,
        migration: &Migration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let conn = Conn::new(&self.pool, cancel);

        // The previous version's views may reference columns about to be
        // dropped, so that schema goes first.
        if let Some(previous) = self.state.previous_version().await? {
            views::drop_version_schema(&conn, &self.options.schema, &previous).await?;
        }

        let introspector = self.introspector();
        let mut schema = introspector.read().await?;
        for operation in &migration.operations {
            let ctx = CompleteContext {
                conn,
                schema_name: &self.options.schema,
                schema: &schema,
            };
            operation.complete(&ctx).await?;
            schema = introspector.read().await?;
        }

        self.state.complete_migration(&migration.name).await
    }

    async fn rollback_inner(
        &self,
        migration: &Migration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let conn = Conn::new(&self.pool, cancel);

        // The new version's views read the shadow columns; drop them first.
        views::drop_version_schema(&conn, &self.options.schema, &migration.name).await?;

        for operation in migration.operations.iter().rev() {
            let ctx = RollbackContext {
                conn,
                schema_name: &self.options.schema,
            };
            operation.rollback(&ctx).await?;
        }

        self.state.rollback_migration(&migration.name).await
    }

    fn introspector(&self) -> Introspector {
        Introspector::new(self.pool.clone(), self.options.schema.clone())
    }

    /// Run `phase` while holding the per-schema advisory lock. The lock is
    /// session-scoped, so the acquiring connection is held until the phase
    /// finishes.
    async fn locked<T>(
        &self,
        cancel: &CancellationToken,
        phase: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        let key = lock_key(&self.options.schema);
        let mut lock_conn = self.pool.acquire().await?;

        let locked: bool = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(MigrationError::Cancelled),
            res = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
                .bind(key)
                .fetch_one(&mut *lock_conn) => res?,
        };
        if !locked {
            return Err(MigrationError::LockTimeout);
        }

        let result = phase.await;

        // Unlock failures are not worth masking the phase result for; the
        // lock dies with the session anyway.
        let _ = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
            .bind(key)
            .fetch_one(&mut *lock_conn)
            .await;

        result
    }
}

/// FNV-1a over the schema name. Deliberately not the standard library
/// hasher, whose seed varies per process and would break mutual exclusion
/// between independent runners.
fn lock_key(schema: &str) -> i64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in format!("pgshift:{schema}").bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash as i64
}
