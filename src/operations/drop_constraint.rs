//! Drop a table constraint by name.
//!
//! A single-statement passthrough, deferred to completion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};
use crate::quote::quote_identifier;
use crate::schema::Schema;

use super::{common, CompleteContext, OperationHandler, RollbackContext, StartContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropConstraint {
    pub table: String,
    pub name: String,
}

#[async_trait]
impl OperationHandler for DropConstraint {
    fn validate(&self, schema: &Schema) -> Result<()> {
        let table = common::require_table(schema, &self.table)?;
        if !table.has_constraint(&self.name) {
            return Err(MigrationError::ConstraintDoesNotExist {
                table: self.table.clone(),
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    async fn start(&self, _ctx: &mut StartContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn complete(&self, ctx: &CompleteContext<'_>) -> Result<()> {
        ctx.conn
            .execute(&format!(
                "ALTER TABLE {}.{} DROP CONSTRAINT {}",
                quote_identifier(ctx.schema_name),
                quote_identifier(&self.table),
                quote_identifier(&self.name),
            ))
            .await
    }

    async fn rollback(&self, _ctx: &RollbackContext<'_>) -> Result<()> {
        Ok(())
    }
}
