//! Drop a column.
//!
//! The physical column stays in place until completion; it only vanishes
//! from the new version's view. When a `down` expression is supplied, a
//! trigger keeps populating the column from writes arriving through the
//! new version, so clients pinned to older versions still see values.

use async_trait::async_trait;
use sea_query::{Alias, PostgresQueryBuilder, Table as TableStmt};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::Schema;
use crate::names::{trigger_function_name, trigger_name};
use crate::triggers::{self, ColumnMapping, TriggerConfig, TriggerDirection};

use super::{common, CompleteContext, OperationHandler, RollbackContext, StartContext};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DropColumn {
    pub table: String,
    pub column: String,
    /// Expression computing the dropped column from the remaining ones for
    /// writes arriving through the new version. Without it the column
    /// simply stops receiving values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub down: Option<String>,
}

impl DropColumn {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            down: None,
        }
    }

    pub fn with_down(mut self, down: impl Into<String>) -> Self {
        self.down = Some(down.into());
        self
    }
}

#[async_trait]
impl OperationHandler for DropColumn {
    fn validate(&self, schema: &Schema) -> Result<()> {
        let table = common::require_table(schema, &self.table)?;
        common::require_column(table, &self.column)?;
        Ok(())
    }

    async fn start(&self, ctx: &mut StartContext<'_>) -> Result<()> {
        if let Some(down) = &self.down {
            let table = common::require_table(ctx.schema, &self.table)?;
            let columns = table
                .columns
                .iter()
                .filter(|c| c.name != self.column)
                .map(|c| ColumnMapping {
                    logical: c.name.clone(),
                    physical: c.name.clone(),
                    col_type: c.col_type.clone(),
                })
                .collect();

            triggers::install(
                &ctx.conn,
                &TriggerConfig {
                    name: trigger_name(&self.table, &self.column),
                    function: trigger_function_name(&self.table, &self.column),
                    direction: TriggerDirection::Down,
                    schema: ctx.schema_name,
                    state_schema: ctx.state_schema,
                    table: &self.table,
                    physical_column: self.column.clone(),
                    expression: down.clone(),
                    columns,
                },
            )
            .await?;
        }

        ctx.view.hide_column(&self.table, &self.column);
        Ok(())
    }

    async fn complete(&self, ctx: &CompleteContext<'_>) -> Result<()> {
        triggers::drop_trigger(&ctx.conn, ctx.schema_name, &self.table, &self.column).await?;
        let sql = TableStmt::alter()
            .table((Alias::new(ctx.schema_name), Alias::new(&self.table)))
            .drop_column(Alias::new(&self.column))
            .to_owned()
            .to_string(PostgresQueryBuilder);
        ctx.conn.execute(&sql).await
    }

    async fn rollback(&self, ctx: &RollbackContext<'_>) -> Result<()> {
        // The column was never touched; only the trigger goes away.
        triggers::drop_trigger(&ctx.conn, ctx.schema_name, &self.table, &self.column).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MigrationError;
    use crate::schema::{Column, Table};

    fn users_schema() -> Schema {
        let mut schema = Schema::new();
        schema.add_table(Table {
            name: "users".into(),
            columns: vec![
                Column {
                    name: "id".into(),
                    col_type: "integer".into(),
                    nullable: false,
                    default: None,
                },
                Column {
                    name: "name".into(),
                    col_type: "character varying(255)".into(),
                    nullable: false,
                    default: None,
                },
            ],
            primary_key: vec!["id".into()],
            ..Table::default()
        });
        schema
    }

    #[test]
    fn test_validate_checks_table_and_column() {
        let schema = users_schema();

        assert!(DropColumn::new("users", "name").validate(&schema).is_ok());
        assert!(matches!(
            DropColumn::new("missing", "name").validate(&schema),
            Err(MigrationError::TableDoesNotExist { .. })
        ));
        assert!(matches!(
            DropColumn::new("users", "missing").validate(&schema),
            Err(MigrationError::ColumnDoesNotExist { .. })
        ));
    }

    #[test]
    fn test_names_follow_the_dropped_column() {
        // The trigger and function installed for a dropped column carry the
        // plain column name, matching what complete and rollback remove.
        assert_eq!(trigger_name("users", "name"), "_pgroll_trigger_users_name");
        assert_eq!(
            trigger_function_name("users", "name"),
            "_pgroll_trigger_fn_users_name"
        );
    }
}
