//! Add a foreign key to a column.
//!
//! The reference is attached to the shadow column `NOT VALID`; existing
//! rows are verified in one pass at completion, which takes only a brief
//! lock because the constraint is already enforced for new writes.

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
    common, CompleteContext, ForeignKeyReference, OperationHandler, RollbackContext, StartContext,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetForeignKey {
    pub table: String,
    pub column: String,
    pub references: ForeignKeyReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down: Option<String>,
}

impl SetForeignKey {
    fn identity(&self) -> String {
        quote_identifier(&self.column)
    }

    fn add_constraint_sql(&self, schema_name: &str) -> String {
        let mut sql = format!(
            "ALTER TABLE {}.{} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_identifier(schema_name),
            quote_identifier(&self.table),
            quote_identifier(&self.references.name),
            quote_identifier(&names::temporary_name(&self.column)),
            quote_identifier(&self.references.table),
            quote_identifier(&self.references.column),
        );
        if let Some(action) = &self.references.on_delete {
            sql.push_str(&format!(" ON DELETE {}", action.as_sql()));
        }
        sql.push_str(" NOT VALID");
        sql
    }
}

#[async_trait]
impl OperationHandler for SetForeignKey {
    fn validate(&self, schema: &Schema) -> Result<()> {
        let table = common::require_table(schema, &self.table)?;
        common::require_column(table, &self.column)?;
        if self.references.name.is_empty() {
            return Err(MigrationError::FieldRequired {
                name: "name".into(),
            });
        }
        let referenced = common::require_table(schema, &self.references.table)?;
        common::require_column(referenced, &self.references.column)?;
        if table.has_constraint(&self.references.name) {
            return Err(MigrationError::ConstraintAlreadyExists {
                table: self.table.clone(),
                name: self.references.name.clone(),
            });
        }
        Ok(())
    }

    async fn start(&self, ctx: &mut StartContext<'_>) -> Result<()> {
        let table = common::require_table(ctx.schema, &self.table)?;
        let column = common::require_column(table, &self.column)?;

        Duplicator::new(table, column).duplicate(&ctx.conn).await?;

        names::check_identifier_length(&self.references.name)?;
        ctx.conn
            .execute(&self.add_constraint_sql(ctx.schema_name))
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
                quote_identifier(&self.references.name),
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
