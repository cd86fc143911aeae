//! Opaque SQL escape hatch.
//!
//! The engine executes `up` at start and `down` at rollback without
//! parsing either; there is nothing to converge at completion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};
use crate::schema::Schema;

use super::{CompleteContext, OperationHandler, RollbackContext, StartContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSql {
    pub up: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down: Option<String>,
}

impl RawSql {
    pub fn new(up: impl Into<String>) -> Self {
        Self {
            up: up.into(),
            down: None,
        }
    }

    pub fn with_down(mut self, down: impl Into<String>) -> Self {
        self.down = Some(down.into());
        self
    }
}

#[async_trait]
impl OperationHandler for RawSql {
    fn validate(&self, _schema: &Schema) -> Result<()> {
        if self.up.is_empty() {
            return Err(MigrationError::FieldRequired { name: "up".into() });
        }
        Ok(())
    }

    async fn start(&self, ctx: &mut StartContext<'_>) -> Result<()> {
        ctx.conn.execute(&self.up).await
    }

    async fn complete(&self, _ctx: &CompleteContext<'_>) -> Result<()> {
        Ok(())
    }

    async fn rollback(&self, ctx: &RollbackContext<'_>) -> Result<()> {
        match &self.down {
            Some(down) => ctx.conn.execute(down).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_up_is_mandatory() {
        assert!(matches!(
            RawSql::new("").validate(&Schema::new()),
            Err(MigrationError::FieldRequired { name }) if name == "up"
        ));
        assert!(RawSql::new("CREATE INDEX idx ON t (c)")
            .with_down("DROP INDEX idx")
            .validate(&Schema::new())
            .is_ok());
    }
}
