//! Relax a NOT NULL column to nullable.
//!
//! The shadow column is duplicated with the NOT NULL check suppressed.
//! `down` must turn a NULL from the new version into something the old,
//! still-NOT-NULL column accepts; `up` defaults to an identity copy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backfill;
use crate::duplicate::Duplicator;
use crate::error::{MigrationError, Result};
use crate::quote::quote_identifier;
use crate::schema::Schema;
use crate::triggers::{self, TriggerPair};

use super::{common, CompleteContext, OperationHandler, RollbackContext, StartContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropNotNull {
    pub table: String,
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up: Option<String>,
    pub down: String,
}

impl DropNotNull {
    fn up_sql(&self) -> String {
        self.up
            .clone()
            .unwrap_or_else(|| quote_identifier(&self.column))
    }
}

#[async_trait]
impl OperationHandler for DropNotNull {
    fn validate(&self, schema: &Schema) -> Result<()> {
        let table = common::require_table(schema, &self.table)?;
        let column = common::require_column(table, &self.column)?;
        if column.nullable {
            return Err(MigrationError::ColumnIsNullable {
                table: self.table.clone(),
                name: self.column.clone(),
            });
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
            .without_not_null()
            .duplicate(&ctx.conn)
            .await?;

        triggers::install_pair(
            &ctx.conn,
            &TriggerPair {
                schema: ctx.schema_name,
                state_schema: ctx.state_schema,
                table,
                column: &self.column,
                up: self.up_sql(),
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
        // The whole point is to shed NOT NULL, so nothing gets upgraded.
        common::complete_column_swap(ctx, table, &self.column, None, None).await
    }

    async fn rollback(&self, ctx: &RollbackContext<'_>) -> Result<()> {
        common::rollback_column_swap(ctx, &self.table, &self.column).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Table};

    fn schema(nullable: bool) -> Schema {
        let mut schema = Schema::new();
        schema.add_table(Table {
            name: "reviews".into(),
            columns: vec![Column {
                name: "review".into(),
                col_type: "text".into(),
                nullable,
                default: None,
            }],
            primary_key: vec!["id".into()],
            ..Table::default()
        });
        schema
    }

    #[test]
    fn test_down_is_mandatory() {
        let op = DropNotNull {
            table: "reviews".into(),
            column: "review".into(),
            up: None,
            down: String::new(),
        };
        assert!(matches!(
            op.validate(&schema(false)),
            Err(MigrationError::FieldRequired { name }) if name == "down"
        ));
    }

    #[test]
    fn test_column_must_currently_be_not_null() {
        let op = DropNotNull {
            table: "reviews".into(),
            column: "review".into(),
            up: None,
            down: "COALESCE(review, 'none')".into(),
        };
        assert!(op.validate(&schema(false)).is_ok());
        assert!(matches!(
            op.validate(&schema(true)),
            Err(MigrationError::ColumnIsNullable { .. })
        ));
    }
}
