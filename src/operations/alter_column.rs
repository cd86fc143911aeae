//! The composite `alter_column` operation.
//!
//! One serialized form covers every column-scoped change; which concrete
//! operation runs is decided by which optional field is set. Setting more
//! than one (or none) is a validation error, so by the time `start` runs
//! the dispatch is unambiguous.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};
use crate::schema::Schema;

use super::{
    common, ChangeType, CheckDefinition, CompleteContext, DropNotNull, ForeignKeyReference,
    Operation, OperationHandler, RenameColumn, RollbackContext, SetCheckConstraint, SetForeignKey,
    SetNotNull, SetUnique, StartContext, UniqueConstraintDefinition,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlterColumn {
    pub table: String,
    pub column: String,
    /// Rename the column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Change the column's type.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub col_type: Option<String>,
    /// Add a check constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<CheckDefinition>,
    /// Add a foreign key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignKeyReference>,
    /// `false` sets NOT NULL, `true` drops it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    /// Add a unique constraint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<UniqueConstraintDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down: Option<String>,
}

impl AlterColumn {
    fn change_count(&self) -> usize {
        [
            self.name.is_some(),
            self.col_type.is_some(),
            self.check.is_some(),
            self.references.is_some(),
            self.nullable.is_some(),
            self.unique.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    fn inner_operation(&self) -> Result<Operation> {
        if self.change_count() != 1 {
            return Err(MigrationError::MultipleAlterColumnChanges {
                changes: self.change_count(),
            });
        }

        let op = if let Some(name) = &self.name {
            Operation::RenameColumn(RenameColumn::new(&self.table, &self.column, name))
        } else if let Some(col_type) = &self.col_type {
            Operation::ChangeType(ChangeType {
                table: self.table.clone(),
                column: self.column.clone(),
                col_type: col_type.clone(),
                up: self.up.clone().unwrap_or_default(),
                down: self.down.clone().unwrap_or_default(),
            })
        } else if let Some(check) = &self.check {
            Operation::SetCheckConstraint(SetCheckConstraint {
                table: self.table.clone(),
                column: self.column.clone(),
                check: check.clone(),
                up: self.up.clone(),
                down: self.down.clone(),
            })
        } else if let Some(references) = &self.references {
            Operation::SetForeignKey(SetForeignKey {
                table: self.table.clone(),
                column: self.column.clone(),
                references: references.clone(),
                up: self.up.clone(),
                down: self.down.clone(),
            })
        } else if let Some(unique) = &self.unique {
            Operation::SetUnique(SetUnique {
                table: self.table.clone(),
                column: self.column.clone(),
                unique: unique.clone(),
                up: self.up.clone(),
                down: self.down.clone(),
            })
        } else if self.nullable == Some(false) {
            Operation::SetNotNull(SetNotNull {
                table: self.table.clone(),
                column: self.column.clone(),
                up: self.up.clone().unwrap_or_default(),
                down: self.down.clone(),
            })
        } else {
            Operation::DropNotNull(DropNotNull {
                table: self.table.clone(),
                column: self.column.clone(),
                up: self.up.clone(),
                down: self.down.clone().unwrap_or_default(),
            })
        };
        Ok(op)
    }
}

#[async_trait]
impl OperationHandler for AlterColumn {
    fn validate(&self, schema: &Schema) -> Result<()> {
        let inner = self.inner_operation()?;

        let table = common::require_table(schema, &self.table)?;
        common::require_column(table, &self.column)?;

        // Row identity inside the triggers and the backfill hinges on a
        // single-column primary key.
        common::require_single_column_pk(table)?;

        if matches!(inner, Operation::RenameColumn(_)) {
            if self.up.is_some() {
                return Err(MigrationError::NoUpSqlAllowed);
            }
            if self.down.is_some() {
                return Err(MigrationError::NoDownSqlAllowed);
            }
        }

        inner.validate(schema)
    }

    async fn start(&self, ctx: &mut StartContext<'_>) -> Result<()> {
        let inner = self.inner_operation()?;
        inner.handler().start(ctx).await
    }

    async fn complete(&self, ctx: &CompleteContext<'_>) -> Result<()> {
        let inner = self.inner_operation()?;
        inner.handler().complete(ctx).await
    }

    async fn rollback(&self, ctx: &RollbackContext<'_>) -> Result<()> {
        let inner = self.inner_operation()?;
        inner.handler().rollback(ctx).await
    }
}
