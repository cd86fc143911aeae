//! Migration operations.
//!
//! One module per operation kind. Every operation implements the same
//! four-step contract: `validate` runs against a schema snapshot before any
//! database work, `start` makes the change available to the new version
//! while keeping the old version intact, and `complete` / `rollback`
//! converge on one side or the other.
//!
//! The [`Operation`] enum is the serialized form consumed from migration
//! files; it dispatches to the per-kind types below.

pub mod add_column;
pub mod add_constraint;
pub mod alter_column;
pub mod change_type;
mod common;
pub mod create_table;
pub mod drop_column;
pub mod drop_constraint;
pub mod drop_not_null;
pub mod drop_table;
pub mod raw_sql;
pub mod rename_column;
pub mod rename_table;
pub mod set_check;
pub mod set_foreign_key;
pub mod set_not_null;
pub mod set_unique;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::Conn;
use crate::error::Result;
use crate::schema::Schema;
use crate::views::ViewPlan;

pub use add_column::AddColumn;
pub use add_constraint::AddConstraint;
pub use alter_column::AlterColumn;
pub use change_type::ChangeType;
pub use create_table::CreateTable;
pub use drop_column::DropColumn;
pub use drop_constraint::DropConstraint;
pub use drop_not_null::DropNotNull;
pub use drop_table::DropTable;
pub use raw_sql::RawSql;
pub use rename_column::RenameColumn;
pub use rename_table::RenameTable;
pub use set_check::SetCheckConstraint;
pub use set_foreign_key::SetForeignKey;
pub use set_not_null::SetNotNull;
pub use set_unique::SetUnique;

/// Observer invoked once an operation has finished its schema mutations,
/// before the version-schema builder runs.
pub type Callback = Box<dyn Fn(&Schema) + Send + Sync>;

/// Everything an operation needs while starting.
pub struct StartContext<'a> {
    pub conn: Conn<'a>,
    /// Base schema the physical tables live in.
    pub schema_name: &'a str,
    /// Schema holding the engine state, including `latest_version()`.
    pub state_schema: &'a str,
    pub schema: &'a Schema,
    pub view: &'a mut ViewPlan,
    pub backfill_batch_size: i64,
    pub callbacks: &'a [Callback],
}

impl StartContext<'_> {
    fn notify(&self) {
        for callback in self.callbacks {
            callback(self.schema);
        }
    }
}

pub struct CompleteContext<'a> {
    pub conn: Conn<'a>,
    pub schema_name: &'a str,
    pub schema: &'a Schema,
}

pub struct RollbackContext<'a> {
    pub conn: Conn<'a>,
    pub schema_name: &'a str,
}

/// The four-step contract every operation kind implements.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    fn validate(&self, schema: &Schema) -> Result<()>;
    async fn start(&self, ctx: &mut StartContext<'_>) -> Result<()>;
    async fn complete(&self, ctx: &CompleteContext<'_>) -> Result<()>;
    async fn rollback(&self, ctx: &RollbackContext<'_>) -> Result<()>;
}

/// A single schema change, tagged for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Operation {
    CreateTable(CreateTable),
    DropTable(DropTable),
    RenameTable(RenameTable),
    AddColumn(AddColumn),
    DropColumn(DropColumn),
    RenameColumn(RenameColumn),
    AlterColumn(AlterColumn),
    ChangeType(ChangeType),
    SetNotNull(SetNotNull),
    DropNotNull(DropNotNull),
    SetUnique(SetUnique),
    SetCheckConstraint(SetCheckConstraint),
    SetForeignKey(SetForeignKey),
    AddConstraint(AddConstraint),
    DropConstraint(DropConstraint),
    RawSql(RawSql),
}

impl Operation {
    fn handler(&self) -> &dyn OperationHandler {
        match self {
            Operation::CreateTable(op) => op,
            Operation::DropTable(op) => op,
            Operation::RenameTable(op) => op,
            Operation::AddColumn(op) => op,
            Operation::DropColumn(op) => op,
            Operation::RenameColumn(op) => op,
            Operation::AlterColumn(op) => op,
            Operation::ChangeType(op) => op,
            Operation::SetNotNull(op) => op,
            Operation::DropNotNull(op) => op,
            Operation::SetUnique(op) => op,
            Operation::SetCheckConstraint(op) => op,
            Operation::SetForeignKey(op) => op,
            Operation::AddConstraint(op) => op,
            Operation::DropConstraint(op) => op,
            Operation::RawSql(op) => op,
        }
    }

    /// Check the operation against a schema snapshot. Has no database side
    /// effects and may be called any number of times.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        self.handler().validate(schema)
    }

    pub async fn start(&self, ctx: &mut StartContext<'_>) -> Result<()> {
        self.handler().start(ctx).await?;
        ctx.notify();
        Ok(())
    }

    pub async fn complete(&self, ctx: &CompleteContext<'_>) -> Result<()> {
        self.handler().complete(ctx).await
    }

    pub async fn rollback(&self, ctx: &RollbackContext<'_>) -> Result<()> {
        self.handler().rollback(ctx).await
    }
}

/// Column description used by `create_table` and `add_column`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub col_type: String,
    /// Absent means nullable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    /// Opaque default expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pk: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<CheckDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignKeyReference>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, col_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            col_type: col_type.into(),
            ..Self::default()
        }
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable.unwrap_or(true)
    }

    pub fn is_primary_key(&self) -> bool {
        self.pk.unwrap_or(false)
    }
}

/// Named single-column check constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckDefinition {
    pub name: String,
    /// Boolean expression over the table's columns.
    pub constraint: String,
}

/// Named single-column foreign key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKeyReference {
    pub name: String,
    pub table: String,
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<ForeignKeyAction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Restrict => "RESTRICT",
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
        }
    }
}

/// Named unique constraint to add to a column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniqueConstraintDefinition {
    pub name: String,
}
