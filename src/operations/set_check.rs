//! Add a check constraint to a column.
//!
//! The check is attached to the shadow column `NOT VALID`, rewritten so it
//! references the shadow column instead of the original; existing rows are
//! only verified at completion, after the backfill.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backfill;
use crate::duplicate::{rewrite_check_expression, Duplicator};
use crate::error::{MigrationError, Result};
use crate::names;
use crate::quote::quote_identifier;
use crate::schema::Schema;
use crate::triggers::{self, TriggerPair};

use super::{
    common, CheckDefinition, CompleteContext, OperationHandler, RollbackContext, StartContext,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetCheckConstraint {
    pub table: String,
    pub column: String,
    pub check: CheckDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down: Option<String>,
}

impl SetCheckConstraint {
    fn identity(&self) -> String {
        quote_identifier(&self.column)
    }
}

#[async_trait]
impl OperationHandler for SetCheckConstraint {
    fn validate(&self, schema: &Schema) -> Result<()> {
        let table = common::require_table(schema, &self.table)?;
        common::require_column(table, &self.column)?;
        if self.check.name.is_empty() {
            return Err(MigrationError::FieldRequired {
                name: "name".into(),
            });
        }
        if self.check.constraint.is_empty() {
            return Err(MigrationError::FieldRequired {
                name: "check".into(),
            });
        }
        if table.has_constraint(&self.check.name) {
            return Err(MigrationError::ConstraintAlreadyExists {
                table: self.table.clone(),
                name: self.check.name.clone(),
            });
        }
        Ok(())
    }

    async fn start(&self, ctx: &mut StartContext<'_>) -> Result<()> {
        let table = common::require_table(ctx.schema, &self.table)?;
        let column = common::require_column(table, &self.column)?;

        Duplicator::new(table, column).duplicate(&ctx.conn).await?;

        names::check_identifier_length(&self.check.name)?;
        let expression = rewrite_check_expression(
            &self.check.constraint,
            &self.column,
            &names::temporary_name(&self.column),
        );
        ctx.conn
            .execute(&format!(
                "ALTER TABLE {}.{} ADD CONSTRAINT {} CHECK ({}) NOT VALID",
                quote_identifier(ctx.schema_name),
                quote_identifier(&self.table),
                quote_identifier(&self.check.name),
                expression,
            ))
            .await?;

        triggers::install_pair(
            &ctx.conn,
            &TriggerPair {
                schema: ctx.schema_name,
                state_schema: ctx.state_schema,
                table,
                column: &self.column,
                up: self.up.clone().unwrap_or_else(|| self.identity()),
                down: self.down.clone().unwrap_or_else(|| self.identity()),
            },
        )
        .await?;

        backfill::backfill(&ctx.conn, ctx.schema_name, table, ctx.backfill_batch_size).await?;
        ctx.view.map_to_shadow(&self.table, &self.column);
        Ok(())
    }

    async fn complete(&self, ctx: &CompleteContext<'_>) -> Result<()> {
        let table = common::require_table(ctx.schema, &self.table)?;
        let column = common::require_column(table, &self.column)?;

        ctx.conn
            .execute(&format!(
                "ALTER TABLE {}.{} VALIDATE CONSTRAINT {}",
                quote_identifier(ctx.schema_name),
                quote_identifier(&self.table),
                quote_identifier(&self.check.name),
            ))
            .await?;

        let not_null_check = (!column.nullable)
            .then(|| names::duplication_name(&names::not_null_constraint_name(&self.column)));
        common::complete_column_swap(ctx, table, &self.column, not_null_check.as_deref(), None)
            .await
    }

    async fn rollback(&self, ctx: &RollbackContext<'_>) -> Result<()> {
        common::rollback_column_swap(ctx, &self.table, &self.column).await
    }
}
