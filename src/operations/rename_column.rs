//! Rename a column.
//!
//! No physical change at start: the new version's view exposes the column
//! under its new name while the table keeps the old one, so no triggers and
//! no backfill are needed. Completion performs the physical rename; views
//! bound to the column follow it automatically.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::names;
use crate::quote::quote_identifier;
use crate::schema::Schema;

use super::{common, CompleteContext, OperationHandler, RollbackContext, StartContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameColumn {
    pub table: String,
    pub from: String,
    pub to: String,
}

impl RenameColumn {
    pub fn new(
        table: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            from: from.into(),
            to: to.into(),
        }
    }
}

#[async_trait]
impl OperationHandler for RenameColumn {
    fn validate(&self, schema: &Schema) -> Result<()> {
        let table = common::require_table(schema, &self.table)?;
        common::require_column(table, &self.from)?;
        Ok(())
    }

    async fn start(&self, ctx: &mut StartContext<'_>) -> Result<()> {
        names::check_identifier_length(&self.to)?;
        ctx.view.alias_column(&self.table, &self.from, &self.to);
        Ok(())
    }

    async fn complete(&self, ctx: &CompleteContext<'_>) -> Result<()> {
        ctx.conn
            .execute(&format!(
                "ALTER TABLE {}.{} RENAME COLUMN {} TO {}",
                quote_identifier(ctx.schema_name),
                quote_identifier(&self.table),
                quote_identifier(&self.from),
                quote_identifier(&self.to),
            ))
            .await
    }

    async fn rollback(&self, _ctx: &RollbackContext<'_>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Table};

    #[test]
    fn test_validate_checks_source_column() {
        let mut schema = Schema::new();
        schema.add_table(Table {
            name: "users".into(),
            columns: vec![Column {
                name: "username".into(),
                col_type: "text".into(),
                nullable: false,
                default: None,
            }],
            ..Table::default()
        });

        assert!(RenameColumn::new("users", "username", "name")
            .validate(&schema)
            .is_ok());
        assert!(RenameColumn::new("users", "missing", "name")
            .validate(&schema)
            .is_err());
    }
}
