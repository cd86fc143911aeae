//! Shadow-column construction.
//!
//! [`Duplicator`] creates a column named [`names::temporary_name`] on the
//! same physical table, mirroring the original's type, default and
//! constraints. All `ALTER TABLE` clauses are combined into one statement
//! so a failure cannot leave a partial constraint set behind; unique
//! constraints become concurrent index builds, which must run outside a
//! transaction and are converted into constraints on migration completion.

use crate::db::Conn;
use crate::error::Result;
use crate::names;
use crate::quote::quote_identifier;
use crate::schema::{Column, Table};

pub struct Duplicator<'a> {
    table: &'a Table,
    column: &'a Column,
    as_name: String,
    with_type: String,
    without_constraint: Option<String>,
    without_not_null: bool,
}

impl<'a> Duplicator<'a> {
    pub fn new(table: &'a Table, column: &'a Column) -> Self {
        Self {
            table,
            column,
            as_name: names::temporary_name(&column.name),
            with_type: column.col_type.clone(),
            without_constraint: None,
            without_not_null: false,
        }
    }

    /// Give the shadow column a different type than the original.
    pub fn with_type(mut self, col_type: impl Into<String>) -> Self {
        self.with_type = col_type.into();
        self
    }

    /// Skip one named constraint when mirroring.
    pub fn without_constraint(mut self, name: impl Into<String>) -> Self {
        self.without_constraint = Some(name.into());
        self
    }

    /// Do not mirror the original's NOT NULL as an unchecked constraint.
    pub fn without_not_null(mut self) -> Self {
        self.without_not_null = true;
        self
    }

    /// Create the shadow column.
    pub async fn duplicate(self, conn: &Conn<'_>) -> Result<()> {
        names::check_identifier_length(&self.as_name)?;
        conn.execute(&self.alter_table_sql()?).await?;
        conn.execute_all(&self.unique_index_sql()?).await?;
        Ok(())
    }

    /// The combined `ALTER TABLE` adding the column, its default, the
    /// unchecked NOT NULL check, and duplicated foreign-key / check
    /// constraints.
    fn alter_table_sql(&self) -> Result<String> {
        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_identifier(&self.table.name),
            quote_identifier(&self.as_name),
            self.with_type,
        );

        if let Some(default) = &self.column.default {
            sql.push_str(&format!(
                ", ALTER COLUMN {} SET DEFAULT {}",
                quote_identifier(&self.as_name),
                default,
            ));
        }

        // The constraint stays NOT VALID until completion, when the
        // backfill has filled every row of the shadow column.
        if !self.column.nullable && !self.without_not_null {
            let name = names::duplication_name(&names::not_null_constraint_name(&self.column.name));
            names::check_identifier_length(&name)?;
            sql.push_str(&format!(
                ", ADD CONSTRAINT {} CHECK ({} IS NOT NULL) NOT VALID",
                quote_identifier(&name),
                quote_identifier(&self.as_name),
            ));
        }

        for fk in self.table.foreign_keys_on(&self.column.name) {
            if self.is_excluded(&fk.name) {
                continue;
            }
            let name = names::duplication_name(&fk.name);
            names::check_identifier_length(&name)?;
            sql.push_str(&format!(
                ", ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                quote_identifier(&name),
                quote_columns(&replace(&fk.columns, &self.column.name, &self.as_name)),
                quote_identifier(&fk.referenced_table),
                quote_columns(&fk.referenced_columns),
            ));
            if let Some(action) = &fk.on_delete {
                sql.push_str(&format!(" ON DELETE {action}"));
            }
        }

        for cc in self.table.check_constraints_on(&self.column.name) {
            if self.is_excluded(&cc.name) {
                continue;
            }
            let name = names::duplication_name(&cc.name);
            names::check_identifier_length(&name)?;
            sql.push_str(&format!(
                ", ADD CONSTRAINT {} {} NOT VALID",
                quote_identifier(&name),
                rewrite_check_expression(&cc.definition, &self.column.name, &self.as_name),
            ));
        }

        Ok(sql)
    }

    /// Unique constraints are mirrored as concurrent unique index builds,
    /// one statement each, outside the combined `ALTER TABLE`.
    fn unique_index_sql(&self) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        for uc in self.table.unique_constraints_on(&self.column.name) {
            if self.is_excluded(&uc.name) {
                continue;
            }
            let name = names::duplication_name(&uc.name);
            names::check_identifier_length(&name)?;
            statements.push(format!(
                "CREATE UNIQUE INDEX CONCURRENTLY {} ON {} ({})",
                quote_identifier(&name),
                quote_identifier(&self.table.name),
                quote_columns(&replace(&uc.columns, &self.column.name, &self.as_name)),
            ));
        }
        Ok(statements)
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.without_constraint.as_deref() == Some(name)
    }
}

fn quote_columns(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn replace(columns: &[String], old: &str, new: &str) -> Vec<String> {
    columns
        .iter()
        .map(|c| if c == old { new.to_string() } else { c.clone() })
        .collect()
}

/// Rewrite a check expression to reference `new` wherever it references the
/// column `old`. Only whole identifiers are replaced, so a column named
/// `name` does not clobber `username`.
pub fn rewrite_check_expression(definition: &str, old: &str, new: &str) -> String {
    let bytes = definition.as_bytes();
    let mut out = String::with_capacity(definition.len());
    let mut i = 0;

    while let Some(offset) = definition[i..].find(old) {
        let start = i + offset;
        let end = start + old.len();
        let before_ok = start == 0 || !is_identifier_byte(bytes[start - 1]);
        let after_ok = end == bytes.len() || !is_identifier_byte(bytes[end]);

        out.push_str(&definition[i..start]);
        if before_ok && after_ok {
            out.push_str(new);
        } else {
            out.push_str(old);
        }
        i = end;
    }
    out.push_str(&definition[i..]);
    out
}

fn is_identifier_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
