//! Error types shared across the engine.

use thiserror::Error;

/// Errors surfaced by validation, the migration runner, and the individual
/// operations.
///
/// Validation errors are returned before any database statement executes.
/// Database errors during Start/Complete/Rollback are propagated after the
/// failing statement; the engine performs no implicit compensation.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("table {name:?} does not exist")]
    TableDoesNotExist { name: String },

    #[error("column {name:?} does not exist on table {table:?}")]
    ColumnDoesNotExist { table: String, name: String },

    #[error("column {name:?} on table {table:?} is already not nullable")]
    ColumnIsNotNullable { table: String, name: String },

    #[error("column {name:?} on table {table:?} is already nullable")]
    ColumnIsNullable { table: String, name: String },

    #[error("table {table:?} must have a primary key on exactly one column (has {fields})")]
    InvalidPrimaryKey { table: String, fields: usize },

    #[error("alter column must specify exactly one change, got {changes}")]
    MultipleAlterColumnChanges { changes: usize },

    #[error("up SQL is not allowed for this operation")]
    NoUpSqlAllowed,

    #[error("down SQL is not allowed for this operation")]
    NoDownSqlAllowed,

    #[error("field {name:?} is required")]
    FieldRequired { name: String },

    #[error("constraint {name:?} already exists on table {table:?}")]
    ConstraintAlreadyExists { table: String, name: String },

    #[error("constraint {name:?} does not exist on table {table:?}")]
    ConstraintDoesNotExist { table: String, name: String },

    #[error("derived identifier {name:?} exceeds the 63-byte identifier limit")]
    IdentifierTooLong { name: String },

    #[error("backfill of table {table:?} failed")]
    BackfillFailed {
        table: String,
        #[source]
        cause: sqlx::Error,
    },

    #[error("installing triggers on table {table:?} failed")]
    TriggerInstallFailed {
        table: String,
        #[source]
        cause: sqlx::Error,
    },

    #[error("could not acquire the migration advisory lock")]
    LockTimeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("database error")]
    DatabaseError(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, MigrationError>;
