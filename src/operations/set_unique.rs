//! Add a unique constraint to a column.
//!
//! Uniqueness is enforced on the shadow column through a concurrently
//! built unique index, so writes through older versions stay unrestricted
//! until completion adopts the index as a constraint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backfill;
use crate::duplicate::Duplicator;
use crate::error::{MigrationError, Result};
use crate::names;
use crate::quote::quote_identifier;
use crate::schema::Schema;
use crate::triggers::{self, TriggerPair};

use super::{
    common, CompleteContext, OperationHandler, RollbackContext, StartContext,
    UniqueConstraintDefinition,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetUnique {
    pub table: String,
    pub column: String,
    pub unique: UniqueConstraintDefinition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down: Option<String>,
}

impl SetUnique {
    fn identity(&self) -> String {
        quote_identifier(&self.column)
    }
}

#[async_trait]
impl OperationHandler for SetUnique {
    fn validate(&self, schema: &Schema) -> Result<()> {
        let table = common::require_table(schema, &self.table)?;
        common::require_column(table, &self.column)?;
        if self.unique.name.is_empty() {
            return Err(MigrationError::FieldRequired {
                name: "name".into(),
            });
        }
        if table.has_constraint(&self.unique.name) {
            return Err(MigrationError::ConstraintAlreadyExists {
                table: self.table.clone(),
                name: self.unique.name.clone(),
            });
        }
        Ok(())
    }

    async fn start(&self, ctx: &mut StartContext<'_>) -> Result<()> {
        let table = common::require_table(ctx.schema, &self.table)?;
        let column = common::require_column(table, &self.column)?;

        Duplicator::new(table, column).duplicate(&ctx.conn).await?;

        names::check_identifier_length(&self.unique.name)?;
        ctx.conn
            .execute(&format!(
                "CREATE UNIQUE INDEX CONCURRENTLY {} ON {}.{} ({})",
                quote_identifier(&self.unique.name),
                quote_identifier(ctx.schema_name),
                quote_identifier(&self.table),
                quote_identifier(&names::temporary_name(&self.column)),
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
        let not_null_check = (!column.nullable)
            .then(|| names::duplication_name(&names::not_null_constraint_name(&self.column)));
        common::complete_column_swap(ctx, table, &self.column, not_null_check.as_deref(), None)
            .await?;

        // The index created at start survives the column swap; adopt it
        // under the user-supplied name.
        ctx.conn
            .execute(&format!(
                "ALTER TABLE {}.{} ADD CONSTRAINT {} UNIQUE USING INDEX {}",
                quote_identifier(ctx.schema_name),
                quote_identifier(&self.table),
                quote_identifier(&self.unique.name),
                quote_identifier(&self.unique.name),
            ))
            .await
    }

    async fn rollback(&self, ctx: &RollbackContext<'_>) -> Result<()> {
        common::rollback_column_swap(ctx, &self.table, &self.column).await
    }
}
