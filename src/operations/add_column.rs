//! Add a column.
//!
//! The column is created under its temporary name so that older versions
//! never see it; the new version's view exposes it under its declared name
//! and completion performs the physical rename. A NOT NULL request becomes
//! an unchecked constraint upgraded at completion, and an `up` expression
//! installs a trigger plus backfill so rows written through older versions
//! receive a value.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backfill;
use crate::duplicate::rewrite_check_expression;
use crate::error::{MigrationError, Result};
use crate::names;
use crate::quote::quote_identifier;
use crate::schema::Schema;
use crate::triggers::{self, ColumnMapping, TriggerConfig, TriggerDirection};

use super::{
    common, ColumnDefinition, CompleteContext, OperationHandler, RollbackContext, StartContext,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddColumn {
    pub table: String,
    pub column: ColumnDefinition,
    /// Expression computing the new column from existing ones for writes
    /// arriving through older versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up: Option<String>,
}

impl AddColumn {
    fn add_sql(&self, schema_name: &str) -> String {
        let shadow = names::temporary_name(&self.column.name);
        let mut sql = format!(
            "ALTER TABLE {}.{} ADD COLUMN {} {}",
            quote_identifier(schema_name),
            quote_identifier(&self.table),
            quote_identifier(&shadow),
            self.column.col_type,
        );
        if let Some(default) = &self.column.default {
            sql.push_str(&format!(" DEFAULT {default}"));
        }
        if self.column.unique.unwrap_or(false) {
            sql.push_str(" UNIQUE");
        }
        if let Some(check) = &self.column.check {
            sql.push_str(&format!(
                " CONSTRAINT {} CHECK ({})",
                quote_identifier(&check.name),
                rewrite_check_expression(&check.constraint, &self.column.name, &shadow),
            ));
        }
        if let Some(fk) = &self.column.references {
            sql.push_str(&format!(
                " CONSTRAINT {} REFERENCES {} ({})",
                quote_identifier(&fk.name),
                quote_identifier(&fk.table),
                quote_identifier(&fk.column),
            ));
            if let Some(action) = &fk.on_delete {
                sql.push_str(&format!(" ON DELETE {}", action.as_sql()));
            }
        }
        // NOT NULL is deliberately absent: it arrives as an unchecked
        // constraint and becomes an attribute at completion.
        if !self.column.is_nullable() {
            sql.push_str(&format!(
                ", ADD CONSTRAINT {} CHECK ({} IS NOT NULL) NOT VALID",
                quote_identifier(&names::not_null_constraint_name(&self.column.name)),
                quote_identifier(&shadow),
            ));
        }
        sql
    }
}

#[async_trait]
impl OperationHandler for AddColumn {
    fn validate(&self, schema: &Schema) -> Result<()> {
        common::require_table(schema, &self.table)?;
        if let Some(fk) = &self.column.references {
            let referenced = common::require_table(schema, &fk.table)?;
            common::require_column(referenced, &fk.column)?;
        }
        if !self.column.is_nullable() && self.column.default.is_none() && self.up.is_none() {
            return Err(MigrationError::FieldRequired { name: "up".into() });
        }
        Ok(())
    }

    async fn start(&self, ctx: &mut StartContext<'_>) -> Result<()> {
        let shadow = names::temporary_name(&self.column.name);
        names::check_identifier_length(&shadow)?;
        ctx.conn.execute(&self.add_sql(ctx.schema_name)).await?;

        if let Some(up) = &self.up {
            let table = common::require_table(ctx.schema, &self.table)?;
            let columns = table
                .columns
                .iter()
                .map(|c| ColumnMapping {
                    logical: c.name.clone(),
                    physical: c.name.clone(),
                    col_type: c.col_type.clone(),
                })
                .collect();

            triggers::install(
                &ctx.conn,
                &TriggerConfig {
                    name: names::trigger_name(&self.table, &self.column.name),
                    function: names::trigger_function_name(&self.table, &self.column.name),
                    direction: TriggerDirection::Up,
                    schema: ctx.schema_name,
                    state_schema: ctx.state_schema,
                    table: &self.table,
                    physical_column: shadow.clone(),
                    expression: up.clone(),
                    columns,
                },
            )
            .await?;

            backfill::backfill(&ctx.conn, ctx.schema_name, table, ctx.backfill_batch_size)
                .await?;
        }

        ctx.view
            .expose_extra_column(&self.table, &shadow, &self.column.name);
        Ok(())
    }

    async fn complete(&self, ctx: &CompleteContext<'_>) -> Result<()> {
        triggers::drop_trigger(&ctx.conn, ctx.schema_name, &self.table, &self.column.name)
            .await?;

        let qualified = format!(
            "{}.{}",
            quote_identifier(ctx.schema_name),
            quote_identifier(&self.table)
        );
        ctx.conn
            .execute(&format!(
                "ALTER TABLE {qualified} RENAME COLUMN {} TO {}",
                quote_identifier(&names::temporary_name(&self.column.name)),
                quote_identifier(&self.column.name),
            ))
            .await?;

        if !self.column.is_nullable() {
            let check = names::not_null_constraint_name(&self.column.name);
            ctx.conn
                .execute_all(&[
                    format!(
                        "ALTER TABLE {qualified} VALIDATE CONSTRAINT {}",
                        quote_identifier(&check)
                    ),
                    format!(
                        "ALTER TABLE {qualified} ALTER COLUMN {} SET NOT NULL",
                        quote_identifier(&self.column.name)
                    ),
                    format!(
                        "ALTER TABLE {qualified} DROP CONSTRAINT {}",
                        quote_identifier(&check)
                    ),
                ])
                .await?;
        }
        Ok(())
    }

    async fn rollback(&self, ctx: &RollbackContext<'_>) -> Result<()> {
        triggers::drop_trigger(&ctx.conn, ctx.schema_name, &self.table, &self.column.name)
            .await?;
        ctx.conn
            .execute(&format!(
                "ALTER TABLE {}.{} DROP COLUMN IF EXISTS {}",
                quote_identifier(ctx.schema_name),
                quote_identifier(&self.table),
                quote_identifier(&names::temporary_name(&self.column.name)),
            ))
            .await
    }
}
