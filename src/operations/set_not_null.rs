//! Constrain a column to NOT NULL.
//!
//! The shadow column carries a `CHECK (... IS NOT NULL) NOT VALID`
//! constraint so that new-version writes are rejected immediately while
//! old rows are only checked once, at completion. `up` must produce a
//! value for rows where the column is NULL; `down` defaults to an identity
//! copy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backfill;
use crate::duplicate::Duplicator;
use crate::error::{MigrationError, Result};
use crate::names;
use crate::quote::quote_identifier;
use crate::schema::Schema;
use crate::triggers::{self, TriggerPair};

use super::{common, CompleteContext, OperationHandler, RollbackContext, StartContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetNotNull {
    pub table: String,
    pub column: String,
    pub up: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down: Option<String>,
}

impl SetNotNull {
    fn down_sql(&self) -> String {
        self.down
            .clone()
            .unwrap_or_else(|| quote_identifier(&self.column))
    }
}

#[async_trait]
impl OperationHandler for SetNotNull {
    fn validate(&self, schema: &Schema) -> Result<()> {
        let table = common::require_table(schema, &self.table)?;
        let column = common::require_column(table, &self.column)?;
        if !column.nullable {
            return Err(MigrationError::ColumnIsNotNullable {
                table: self.table.clone(),
                name: self.column.clone(),
            });
        }
        if self.up.is_empty() {
            return Err(MigrationError::FieldRequired { name: "up".into() });
        }
        Ok(())
    }

    async fn start(&self, ctx: &mut StartContext<'_>) -> Result<()> {
        let table = common::require_table(ctx.schema, &self.table)?;
        let column = common::require_column(table, &self.column)?;

        Duplicator::new(table, column).duplicate(&ctx.conn).await?;

        let check = names::not_null_constraint_name(&self.column);
        names::check_identifier_length(&check)?;
        ctx.conn
            .execute(&format!(
                "ALTER TABLE {}.{} ADD CONSTRAINT {} CHECK ({} IS NOT NULL) NOT VALID",
                quote_identifier(ctx.schema_name),
                quote_identifier(&self.table),
                quote_identifier(&check),
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
                up: self.up.clone(),
                down: self.down_sql(),
            },
        )
        .await?;

        backfill::backfill(&ctx.conn, ctx.schema_name, table, ctx.backfill_batch_size).await?;
        ctx.view.map_to_shadow(&self.table, &self.column);
        Ok(())
    }

    async fn complete(&self, ctx: &CompleteContext<'_>) -> Result<()> {
        let table = common::require_table(ctx.schema, &self.table)?;
        let check = names::not_null_constraint_name(&self.column);
        common::complete_column_swap(ctx, table, &self.column, Some(&check), None).await
    }

    async fn rollback(&self, ctx: &RollbackContext<'_>) -> Result<()> {
        common::rollback_column_swap(ctx, &self.table, &self.column).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Table};

    fn reviews_schema(review_nullable: bool) -> Schema {
        let mut schema = Schema::new();
        schema.add_table(Table {
            name: "reviews".into(),
            columns: vec![
                Column {
                    name: "id".into(),
                    col_type: "integer".into(),
                    nullable: false,
                    default: None,
                },
                Column {
                    name: "review".into(),
                    col_type: "text".into(),
                    nullable: review_nullable,
                    default: None,
                },
            ],
            primary_key: vec!["id".into()],
            ..Table::default()
        });
        schema
    }

    #[test]
    fn test_up_is_mandatory() {
        let op = SetNotNull {
            table: "reviews".into(),
            column: "review".into(),
            up: String::new(),
            down: Some("review".into()),
        };
        assert!(matches!(
            op.validate(&reviews_schema(true)),
            Err(MigrationError::FieldRequired { name }) if name == "up"
        ));
    }

    #[test]
    fn test_column_must_currently_be_nullable() {
        let op = SetNotNull {
            table: "reviews".into(),
            column: "review".into(),
            up: "COALESCE(review, 'none')".into(),
            down: None,
        };
        assert!(op.validate(&reviews_schema(true)).is_ok());
        assert!(matches!(
            op.validate(&reviews_schema(false)),
            Err(MigrationError::ColumnIsNotNullable { .. })
        ));
    }

    #[test]
    fn test_down_defaults_to_identity() {
        let op = SetNotNull {
            table: "reviews".into(),
            column: "review".into(),
            up: "COALESCE(review, 'none')".into(),
            down: None,
        };
        assert_eq!(op.down_sql(), quote_identifier("review"));

        let op = SetNotNull {
            down: Some("review || ' (from new column)'".into()),
            ..op
        };
        assert_eq!(op.down_sql(), "review || ' (from new column)'");
    }
}
