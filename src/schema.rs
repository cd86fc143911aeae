//! In-memory read model of the live database schema.
//!
//! A [`Schema`] is an immutable snapshot: operations never mutate it in
//! place, the runner reads a fresh one between operations. Constraint types
//! carry a `validated` flag so callers can tell `NOT VALID` constraints
//! apart from checked ones.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Snapshot of all user-visible tables in one database schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    tables: BTreeMap<String, Table>,
}

/// Table metadata: columns in declared order plus multi-column constraints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub check_constraints: Vec<CheckConstraint>,
    pub unique_constraints: Vec<UniqueConstraint>,
}

/// Column metadata as read back from the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Formatted SQL type, e.g. `character varying(255)`.
    pub col_type: String,
    pub nullable: bool,
    /// Default expression as opaque SQL text.
    pub default: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_delete: Option<String>,
    pub validated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckConstraint {
    pub name: String,
    pub columns: Vec<String>,
    /// Full definition as produced by `pg_get_constraintdef`, e.g.
    /// `CHECK ((length(name) > 3))`.
    pub definition: String,
    pub validated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub name: String,
    pub columns: Vec<String>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }
}

impl Table {
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Foreign keys whose column list covers `column`.
    pub fn foreign_keys_on<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a ForeignKey> + 'a {
        self.foreign_keys
            .iter()
            .filter(move |fk| fk.columns.iter().any(|c| c == column))
    }

    /// Check constraints whose column list covers `column`.
    pub fn check_constraints_on<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a CheckConstraint> + 'a {
        self.check_constraints
            .iter()
            .filter(move |cc| cc.columns.iter().any(|c| c == column))
    }

    /// Unique constraints whose column list covers `column`.
    pub fn unique_constraints_on<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a UniqueConstraint> + 'a {
        self.unique_constraints
            .iter()
            .filter(move |uc| uc.columns.iter().any(|c| c == column))
    }

    pub fn has_constraint(&self, name: &str) -> bool {
        self.foreign_keys.iter().any(|fk| fk.name == name)
            || self.check_constraints.iter().any(|cc| cc.name == name)
            || self.unique_constraints.iter().any(|uc| uc.name == name)
    }
}
