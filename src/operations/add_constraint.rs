//! Add a table constraint from its SQL definition.
//!
//! A single-statement passthrough. The DDL is deferred to completion so a
//! rollback never has anything to undo.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};
use crate::quote::quote_identifier;
use crate::schema::Schema;

use super::{common, CompleteContext, OperationHandler, RollbackContext, StartContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddConstraint {
    pub table: String,
    pub name: String,
    /// Constraint body, e.g. `CHECK (price > 0)` or `UNIQUE (a, b)`.
    pub definition: String,
}

#[async_trait]
impl OperationHandler for AddConstraint {
    fn validate(&self, schema: &Schema) -> Result<()> {
        let table = common::require_table(schema, &self.table)?;
        if self.name.is_empty() {
            return Err(MigrationError::FieldRequired {
                name: "name".into(),
            });
        }
        if self.definition.is_empty() {
            return Err(MigrationError::FieldRequired {
                name: "definition".into(),
            });
        }
        if table.has_constraint(&self.name) {
            return Err(MigrationError::ConstraintAlreadyExists {
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
                "ALTER TABLE {}.{} ADD CONSTRAINT {} {}",
                quote_identifier(ctx.schema_name),
                quote_identifier(&self.table),
                quote_identifier(&self.name),
                self.definition,
            ))
            .await
    }

    async fn rollback(&self, _ctx: &RollbackContext<'_>) -> Result<()> {
        Ok(())
    }
}
