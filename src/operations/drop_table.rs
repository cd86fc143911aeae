//! Drop a table.
//!
//! The table survives physically until completion so that clients pinned to
//! older versions keep working; it merely disappears from the new version
//! schema at start.

use async_trait::async_trait;
use sea_query::{Alias, PostgresQueryBuilder, Table as TableStmt};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::Schema;

use super::{common, CompleteContext, OperationHandler, RollbackContext, StartContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropTable {
    pub name: String,
}

impl DropTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl OperationHandler for DropTable {
    fn validate(&self, schema: &Schema) -> Result<()> {
        common::require_table(schema, &self.name)?;
        Ok(())
    }

    async fn start(&self, ctx: &mut StartContext<'_>) -> Result<()> {
        ctx.view.hide_table(&self.name);
        Ok(())
    }

    async fn complete(&self, ctx: &CompleteContext<'_>) -> Result<()> {
        let sql = TableStmt::drop()
            .table((Alias::new(ctx.schema_name), Alias::new(&self.name)))
            .to_owned()
            .to_string(PostgresQueryBuilder);
        ctx.conn.execute(&sql).await
    }

    async fn rollback(&self, _ctx: &RollbackContext<'_>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Table;

    #[test]
    fn test_validate_requires_the_table() {
        let mut schema = Schema::new();
        schema.add_table(Table {
            name: "users".into(),
            ..Table::default()
        });

        assert!(DropTable::new("users").validate(&schema).is_ok());
        assert!(DropTable::new("missing").validate(&schema).is_err());
    }
}
