//! # pgshift
//!
//! Zero-downtime, multi-version schema migrations for PostgreSQL.
//!
//! Applications connect to a *version schema* — a namespace of views — and
//! never to the physical tables. While a migration is in flight, two
//! versions of each affected table coexist: the original column and a
//! shadow column kept in sync by row-level triggers applying user-supplied
//! `up`/`down` expressions. A migration moves through three driver-invoked
//! phases:
//!
//! - **Start** duplicates columns, installs triggers, backfills, and
//!   publishes the new version schema; clients on old versions keep
//!   working.
//! - **Complete** validates deferred constraints, drops the old side and
//!   renames the shadow objects into place.
//! - **Rollback** drops the new side, restoring the pre-start schema.
//!
//! Long-running DDL is issued in non-blocking forms throughout: unique
//! indexes build concurrently, constraints arrive `NOT VALID` and are
//! validated late, backfills run in bounded batches.
//!
//! ## Example
//!
//! ```no_run
//! use pgshift::{Migration, MigrationRunner, Operation};
//! use pgshift::operations::DropColumn;
//! # use std::sync::Arc;
//! # use tokio_util::sync::CancellationToken;
//!
//! # async fn example(pool: sqlx::PgPool, state: Arc<dyn pgshift::StateCatalog>) -> pgshift::Result<()> {
//! let migration = Migration::new("02_drop_column").with_operation(Operation::DropColumn(
//!     DropColumn::new("users", "name").with_down("UPPER(email)"),
//! ));
//!
//! let runner = MigrationRunner::new(pool, state);
//! let cancel = CancellationToken::new();
//! runner.start(&migration, &[], &cancel).await?;
//! // ... later, once all clients use the new version:
//! runner.complete(&migration, &cancel).await?;
//! # Ok(())
//! # }
//! ```

pub mod backfill;
pub mod catalog;
pub mod config;
pub mod db;
pub mod duplicate;
pub mod error;
pub mod migration;
pub mod names;
pub mod operations;
pub mod quote;
pub mod runner;
pub mod schema;
pub mod state;
pub mod triggers;
pub mod views;

pub use catalog::Introspector;
pub use config::RunnerOptions;
pub use duplicate::Duplicator;
pub use error::{MigrationError, Result};
pub use migration::Migration;
pub use operations::{Callback, Operation};
pub use runner::MigrationRunner;
pub use schema::{CheckConstraint, Column, ForeignKey, Schema, Table, UniqueConstraint};
pub use state::{MigrationRecord, MigrationState, StateCatalog};
pub use views::ViewPlan;
