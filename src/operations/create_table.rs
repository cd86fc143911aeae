//! Create a table.
//!
//! Table creation is invisible to existing versions, so the DDL runs
//! immediately at start; the new version schema exposes the table through a
//! view like any other.

use async_trait::async_trait;
use sea_query::{Alias, PostgresQueryBuilder, Table as TableStmt};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::names;
use crate::quote::quote_identifier;
use crate::schema::Schema;

use super::{
    common, ColumnDefinition, CompleteContext, OperationHandler, RollbackContext, StartContext,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTable {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
}

impl CreateTable {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    fn create_sql(&self, schema_name: &str) -> String {
        let mut parts = Vec::new();
        for column in &self.columns {
            let mut part = format!(
                "{} {}",
                quote_identifier(&column.name),
                column.col_type
            );
            if column.is_primary_key() {
                part.push_str(" PRIMARY KEY");
            }
            if !column.is_nullable() {
                part.push_str(" NOT NULL");
            }
            if let Some(default) = &column.default {
                part.push_str(&format!(" DEFAULT {default}"));
            }
            if column.unique.unwrap_or(false) {
                part.push_str(" UNIQUE");
            }
            if let Some(check) = &column.check {
                part.push_str(&format!(
                    " CONSTRAINT {} CHECK ({})",
                    quote_identifier(&check.name),
                    check.constraint
                ));
            }
            if let Some(fk) = &column.references {
                part.push_str(&format!(
                    " CONSTRAINT {} REFERENCES {} ({})",
                    quote_identifier(&fk.name),
                    quote_identifier(&fk.table),
                    quote_identifier(&fk.column)
                ));
                if let Some(action) = &fk.on_delete {
                    part.push_str(&format!(" ON DELETE {}", action.as_sql()));
                }
            }
            parts.push(part);
        }

        format!(
            "CREATE TABLE {}.{} ({})",
            quote_identifier(schema_name),
            quote_identifier(&self.name),
            parts.join(", ")
        )
    }
}

#[async_trait]
impl OperationHandler for CreateTable {
    fn validate(&self, schema: &Schema) -> Result<()> {
        // Foreign keys must point at something that exists now; a clash
        // with an existing table surfaces from the DDL itself.
        for column in &self.columns {
            if let Some(fk) = &column.references {
                let referenced = common::require_table(schema, &fk.table)?;
                common::require_column(referenced, &fk.column)?;
            }
        }
        Ok(())
    }

    async fn start(&self, ctx: &mut StartContext<'_>) -> Result<()> {
        names::check_identifier_length(&self.name)?;
        ctx.conn.execute(&self.create_sql(ctx.schema_name)).await
    }

    async fn complete(&self, _ctx: &CompleteContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn rollback(&self, ctx: &RollbackContext<'_>) -> Result<()> {
        let sql = TableStmt::drop()
            .table((Alias::new(ctx.schema_name), Alias::new(&self.name)))
            .if_exists()
            .to_owned()
            .to_string(PostgresQueryBuilder);
        ctx.conn.execute(&sql).await
    }
}
