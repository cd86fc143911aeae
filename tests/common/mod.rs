//! Shared fixtures for the live-database scenario tests.
//!
//! Each test gets its own base schema and state schema so tests can run
//! against one database without interfering. The state catalog here is a
//! minimal Postgres-backed implementation of the `StateCatalog` trait; the
//! engine itself treats the catalog as an external collaborator.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use pgshift::{
    quote::quote_identifier, Migration, MigrationRecord, MigrationRunner, Result, RunnerOptions,
    StateCatalog,
};
use tokio_util::sync::CancellationToken;

pub struct TestState {
    pool: PgPool,
    schema: String,
}

impl TestState {
    /// Create the state schema, its history table, and the
    /// `latest_version` function the triggers rely on.
    pub async fn create(pool: PgPool, schema: &str) -> Self {
        let qschema = quote_identifier(schema);
        for sql in [
            format!("DROP SCHEMA IF EXISTS {qschema} CASCADE"),
            format!("CREATE SCHEMA {qschema}"),
            format!(
                "CREATE TABLE {qschema}.migrations (\
                   name text PRIMARY KEY,\
                   state text NOT NULL,\
                   applied_at timestamptz NOT NULL DEFAULT clock_timestamp())"
            ),
            format!(
                "CREATE FUNCTION {qschema}.latest_version(schema_name text) RETURNS text \
                 LANGUAGE sql STABLE AS $$ \
                   SELECT name FROM {qschema}.migrations \
                   WHERE state IN ('started', 'completed') \
                   ORDER BY applied_at DESC LIMIT 1 \
                 $$"
            ),
        ] {
            sqlx::query(&sql).execute(&pool).await.unwrap();
        }
        Self {
            pool,
            schema: schema.to_string(),
        }
    }

    async fn set_state(&self, name: &str, state: &str) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO {}.migrations (name, state) VALUES ($1, $2) \
             ON CONFLICT (name) DO UPDATE SET state = EXCLUDED.state",
            quote_identifier(&self.schema)
        ))
        .bind(name)
        .bind(state)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn version_at(&self, offset: i64) -> Result<Option<String>> {
        let name: Option<String> = sqlx::query_scalar(&format!(
            "SELECT name FROM {}.migrations \
             WHERE state IN ('started', 'completed') \
             ORDER BY applied_at DESC OFFSET {offset} LIMIT 1",
            quote_identifier(&self.schema)
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(name)
    }
}

#[async_trait]
impl StateCatalog for TestState {
    fn schema(&self) -> &str {
        &self.schema
    }

    async fn start_migration(&self, name: &str) -> Result<()> {
        self.set_state(name, "started").await
    }

    async fn complete_migration(&self, name: &str) -> Result<()> {
        self.set_state(name, "completed").await
    }

    async fn rollback_migration(&self, name: &str) -> Result<()> {
        self.set_state(name, "rolled_back").await
    }

    async fn latest_version(&self) -> Result<Option<String>> {
        self.version_at(0).await
    }

    async fn previous_version(&self) -> Result<Option<String>> {
        self.version_at(1).await
    }

    async fn history(&self) -> Result<Vec<MigrationRecord>> {
        unimplemented!("not needed by the scenario tests")
    }
}

pub struct Harness {
    pub pool: PgPool,
    pub runner: MigrationRunner,
    pub schema: String,
    pub cancel: CancellationToken,
}

impl Harness {
    /// Connect using `DATABASE_URL` and reset the per-test schemas.
    pub async fn new(test_name: &str) -> Harness {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must point at a PostgreSQL 14+ instance");
        let pool = PgPool::connect(&url).await.expect("connect");

        let schema = format!("it_{test_name}");
        let state_schema = format!("it_{test_name}_state");
        // Drop the base schema, the state schema, and any version schemas
        // a previous run left behind.
        let pattern = format!("it~_{}%", test_name.replace('_', "~_"));
        for sql in [
            format!(
                "DO $$ DECLARE s text; BEGIN \
                   FOR s IN SELECT nspname FROM pg_namespace \
                     WHERE nspname LIKE {} ESCAPE '~' LOOP \
                     EXECUTE 'DROP SCHEMA ' || quote_ident(s) || ' CASCADE'; \
                   END LOOP; END $$",
                pgshift::quote::quote_literal(&pattern)
            ),
            format!("CREATE SCHEMA {}", quote_identifier(&schema)),
        ] {
            sqlx::query(&sql).execute(&pool).await.expect("reset schemas");
        }

        let state = Arc::new(TestState::create(pool.clone(), &state_schema).await);
        let runner = MigrationRunner::new(pool.clone(), state).with_options(RunnerOptions {
            schema: schema.clone(),
            backfill_batch_size: 100,
        });

        Harness {
            pool,
            runner,
            schema,
            cancel: CancellationToken::new(),
        }
    }

    pub async fn start(&self, migration: &Migration) {
        self.runner
            .start(migration, &[], &self.cancel)
            .await
            .unwrap_or_else(|e| panic!("start {}: {e}", migration.name));
    }

    pub async fn complete(&self, migration: &Migration) {
        self.runner
            .complete(migration, &self.cancel)
            .await
            .unwrap_or_else(|e| panic!("complete {}: {e}", migration.name));
    }

    pub async fn rollback(&self, migration: &Migration) {
        self.runner
            .rollback(migration, &self.cancel)
            .await
            .unwrap_or_else(|e| panic!("rollback {}: {e}", migration.name));
    }

    /// Insert through a version schema the way an application would: with
    /// `search_path` pinned to that version.
    pub async fn insert(
        &self,
        version: &str,
        table: &str,
        columns: &[&str],
        values: &[&str],
    ) -> std::result::Result<(), sqlx::Error> {
        let version_schema = format!("{}_{version}", self.schema);
        let mut conn = self.pool.acquire().await?;
        sqlx::query(&format!("SET search_path TO {version_schema}"))
            .execute(&mut *conn)
            .await?;

        let column_list = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let value_list = values
            .iter()
            .map(|v| pgshift::quote::quote_literal(v))
            .collect::<Vec<_>>()
            .join(", ");
        sqlx::query(&format!(
            "INSERT INTO {} ({column_list}) VALUES ({value_list})",
            quote_identifier(table)
        ))
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Fetch one text column from every row of a version's view, ordered
    /// by the given key.
    pub async fn select_texts(
        &self,
        version: &str,
        table: &str,
        column: &str,
        order_by: &str,
    ) -> Vec<Option<String>> {
        let version_schema = format!("{}_{version}", self.schema);
        sqlx::query_scalar(&format!(
            "SELECT {}::text FROM {}.{} ORDER BY {}",
            quote_identifier(column),
            quote_identifier(&version_schema),
            quote_identifier(table),
            quote_identifier(order_by),
        ))
        .fetch_all(&self.pool)
        .await
        .expect("select")
    }

    pub async fn column_exists(&self, table: &str, column: &str) -> bool {
        self.column_exists_in(&self.schema, table, column).await
    }

    pub async fn column_exists_in(&self, schema: &str, table: &str, column: &str) -> bool {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 AND column_name = $3)",
        )
        .bind(schema)
        .bind(table)
        .bind(column)
        .fetch_one(&self.pool)
        .await
        .expect("column_exists")
    }

    pub async fn trigger_exists(&self, table: &str, trigger: &str) -> bool {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM pg_trigger t \
             JOIN pg_class c ON c.oid = t.tgrelid \
             JOIN pg_namespace n ON n.oid = c.relnamespace \
             WHERE n.nspname = $1 AND c.relname = $2 AND t.tgname = $3)",
        )
        .bind(&self.schema)
        .bind(table)
        .bind(trigger)
        .fetch_one(&self.pool)
        .await
        .expect("trigger_exists")
    }

    pub async fn function_exists(&self, function: &str) -> bool {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM pg_proc p \
             JOIN pg_namespace n ON n.oid = p.pronamespace \
             WHERE n.nspname = $1 AND p.proname = $2)",
        )
        .bind(&self.schema)
        .bind(function)
        .fetch_one(&self.pool)
        .await
        .expect("function_exists")
    }
}

/// SQLSTATE of an error returned by a failed statement.
pub fn sqlstate(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db) => db.code().map(|c| c.to_string()).unwrap_or_default(),
        other => panic!("expected a database error, got {other}"),
    }
}

pub const NOT_NULL_VIOLATION: &str = "23502";
pub const UNIQUE_VIOLATION: &str = "23505";
pub const CHECK_VIOLATION: &str = "23514";
