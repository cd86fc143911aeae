//! Rename a table.
//!
//! Purely virtual at start: the new version schema exposes a view under the
//! new name selecting from the unchanged physical table. The physical
//! rename happens at completion, when no remaining version uses the old
//! name.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::names;
use crate::quote::quote_identifier;
use crate::schema::Schema;

use super::{common, CompleteContext, OperationHandler, RollbackContext, StartContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameTable {
    pub from: String,
    pub to: String,
}

impl RenameTable {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

#[async_trait]
impl OperationHandler for RenameTable {
    fn validate(&self, schema: &Schema) -> Result<()> {
        common::require_table(schema, &self.from)?;
        Ok(())
    }

    async fn start(&self, ctx: &mut StartContext<'_>) -> Result<()> {
        names::check_identifier_length(&self.to)?;
        ctx.view.rename_table(&self.from, &self.to);
        Ok(())
    }

    async fn complete(&self, ctx: &CompleteContext<'_>) -> Result<()> {
        // RENAME TO takes an unqualified new name.
        ctx.conn
            .execute(&format!(
                "ALTER TABLE {}.{} RENAME TO {}",
                quote_identifier(ctx.schema_name),
                quote_identifier(&self.from),
                quote_identifier(&self.to),
            ))
            .await
    }

    async fn rollback(&self, _ctx: &RollbackContext<'_>) -> Result<()> {
        Ok(())
    }
}
