//! Change a column's type.
//!
//! The shadow column is created with the target type; `up` and `down` are
//! both mandatory because values must be converted explicitly in each
//! direction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backfill;
use crate::duplicate::Duplicator;
use crate::error::{MigrationError, Result};
use crate::names;
use crate::schema::Schema;
use crate::triggers::{self, TriggerPair};

use super::{common, CompleteContext, OperationHandler, RollbackContext, StartContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeType {
    pub table: String,
    pub column: String,
    #[serde(rename = "type")]
    pub col_type: String,
    pub up: String,
    pub down: String,
}

#[async_trait]
impl OperationHandler for ChangeType {
    fn validate(&self, schema: &Schema) -> Result<()> {
        let table = common::require_table(schema, &self.table)?;
        common::require_column(table, &self.column)?;
        if self.up.is_empty() {
            return Err(MigrationError::FieldRequired { name: "up".into() });
        }
        if self.down.is_empty() {
            return Err(MigrationError::FieldRequired {
                name: "down".into(),
            });
        }
        Ok(())
    }

    async fn start(&self, ctx: &mut StartContext<'_>) -> Result<()> {
        let table = common::require_table(ctx.schema, &self.table)?;
        let column = common::require_column(table, &self.column)?;

        Duplicator::new(table, column)
            .with_type(&self.col_type)
            .duplicate(&ctx.conn)
            .await?;

        triggers::install_pair(
            &ctx.conn,
            &TriggerPair {
                schema: ctx.schema_name,
                state_schema: ctx.state_schema,
                table,
                column: &self.column,
                up: self.up.clone(),
                down: self.down.clone(),
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
            .await
    }

    async fn rollback(&self, ctx: &RollbackContext<'_>) -> Result<()> {
        common::rollback_column_swap(ctx, &self.table, &self.column).await
    }
}
