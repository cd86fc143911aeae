//! The migration value: a named, ordered batch of operations.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::operations::Operation;
use crate::schema::Schema;

/// A named, ordered sequence of operations. The name is unique within the
/// migration history and derives the version schema's name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Migration {
    pub name: String,
    pub operations: Vec<Operation>,
}

impl Migration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            operations: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.operations.push(operation);
        self
    }

    /// Validate every operation against the snapshot, in order, stopping at
    /// the first failure. Runs before any database statement and has no
    /// side effects.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        for operation in &self.operations {
            operation.validate(schema)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::{ColumnDefinition, CreateTable, DropColumn};

    fn sample() -> Migration {
        Migration::new("01_add_table")
            .with_operation(Operation::CreateTable(CreateTable::new(
                "users",
                vec![
                    ColumnDefinition {
                        pk: Some(true),
                        ..ColumnDefinition::new("id", "serial")
                    },
                    ColumnDefinition {
                        nullable: Some(false),
                        ..ColumnDefinition::new("email", "varchar(255)")
                    },
                ],
            )))
            .with_operation(Operation::DropColumn(
                DropColumn::new("users", "name").with_down("UPPER(email)"),
            ))
    }

    #[test]
    fn test_serialization_round_trip_preserves_behavior() {
        let migration = sample();
        let json = serde_json::to_string(&migration).unwrap();
        let back: Migration = serde_json::from_str(&json).unwrap();

        assert_eq!(back.name, migration.name);
        assert_eq!(back.operations.len(), 2);
        match &back.operations[1] {
            Operation::DropColumn(op) => {
                assert_eq!(op.table, "users");
                assert_eq!(op.column, "name");
                assert_eq!(op.down.as_deref(), Some("UPPER(email)"));
            }
            other => panic!("expected drop_column, got {other:?}"),
        }
    }

    #[test]
    fn test_operations_are_tagged_by_kind() {
        let json = serde_json::to_value(&sample()).unwrap();
        assert_eq!(json["operations"][0]["operation"], "create_table");
        assert_eq!(json["operations"][1]["operation"], "drop_column");
        // Unset optional fields stay off the wire.
        assert!(json["operations"][0]["columns"][0].get("default").is_none());
    }

    #[test]
    fn test_alter_column_sugar_parses_into_the_composite_form() {
        let json = r#"{
            "name": "02_rename_column",
            "operations": [
                {
                    "operation": "alter_column",
                    "table": "users",
                    "column": "username",
                    "name": "name"
                }
            ]
        }"#;
        let migration: Migration = serde_json::from_str(json).unwrap();
        match &migration.operations[0] {
            Operation::AlterColumn(op) => {
                assert_eq!(op.name.as_deref(), Some("name"));
                assert!(op.col_type.is_none());
            }
            other => panic!("expected alter_column, got {other:?}"),
        }
    }
}
