//! Version-schema construction.
//!
//! While a migration starts, each operation records how the new logical
//! version differs from the physical table into a [`ViewPlan`]. Once the
//! whole batch has started, the builder materializes one schema named
//! `<base>_<migration>` containing a view per visible table. Shadow columns
//! only ever appear aliased back to their logical name; they are never
//! exposed under their physical name.

use std::collections::{HashMap, HashSet};

use crate::db::Conn;
use crate::error::Result;
use crate::names;
use crate::quote::quote_identifier;
use crate::schema::Schema;

#[derive(Debug, Clone, PartialEq)]
enum ColumnEdit {
    /// The column does not exist in the new version.
    Hide,
    /// The column is exposed under a different name.
    Alias(String),
    /// The new version reads and writes the shadow column.
    Shadow,
}

/// Differences between the physical tables and the logical shape the new
/// version should expose.
#[derive(Debug, Clone, Default)]
pub struct ViewPlan {
    hidden_tables: HashSet<String>,
    renamed_tables: HashMap<String, String>,
    column_edits: HashMap<String, HashMap<String, ColumnEdit>>,
    /// Physical → logical pairs for columns that exist only in the new
    /// version and are absent from the snapshot, e.g. freshly added ones.
    extra_columns: HashMap<String, Vec<(String, String)>>,
}

impl ViewPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hide_table(&mut self, table: &str) {
        self.hidden_tables.insert(table.to_string());
    }

    pub fn rename_table(&mut self, table: &str, to: &str) {
        self.renamed_tables
            .insert(table.to_string(), to.to_string());
    }

    pub fn hide_column(&mut self, table: &str, column: &str) {
        self.edit(table, column, ColumnEdit::Hide);
    }

    pub fn alias_column(&mut self, table: &str, column: &str, alias: &str) {
        self.edit(table, column, ColumnEdit::Alias(alias.to_string()));
    }

    pub fn map_to_shadow(&mut self, table: &str, column: &str) {
        self.edit(table, column, ColumnEdit::Shadow);
    }

    pub fn expose_extra_column(&mut self, table: &str, physical: &str, logical: &str) {
        self.extra_columns
            .entry(table.to_string())
            .or_default()
            .push((physical.to_string(), logical.to_string()));
    }

    fn edit(&mut self, table: &str, column: &str, edit: ColumnEdit) {
        self.column_edits
            .entry(table.to_string())
            .or_default()
            .insert(column.to_string(), edit);
    }
}

/// Create the version schema and its views for `migration`.
pub async fn create_version_schema(
    conn: &Conn<'_>,
    schema: &Schema,
    base: &str,
    migration: &str,
    plan: &ViewPlan,
) -> Result<()> {
    let version = names::version_schema_name(base, migration);
    names::check_identifier_length(&version)?;
    conn.execute_all(&version_schema_sql(schema, base, &version, plan))
        .await
}

/// Remove a version schema and everything in it.
pub async fn drop_version_schema(conn: &Conn<'_>, base: &str, migration: &str) -> Result<()> {
    let version = names::version_schema_name(base, migration);
    conn.execute(&format!(
        "DROP SCHEMA IF EXISTS {} CASCADE",
        quote_identifier(&version)
    ))
    .await
}

fn version_schema_sql(
    schema: &Schema,
    base: &str,
    version: &str,
    plan: &ViewPlan,
) -> Vec<String> {
    let mut statements = vec![format!(
        "CREATE SCHEMA IF NOT EXISTS {}",
        quote_identifier(version)
    )];

    for table in schema.tables() {
        if plan.hidden_tables.contains(&table.name) {
            continue;
        }
        let exposed_table = plan
            .renamed_tables
            .get(&table.name)
            .unwrap_or(&table.name);

        let edits = plan.column_edits.get(&table.name);
        let mut select_list = Vec::new();
        for column in &table.columns {
            match edits.and_then(|e| e.get(&column.name)) {
                Some(ColumnEdit::Hide) => {}
                Some(ColumnEdit::Alias(alias)) => select_list.push(format!(
                    "{} AS {}",
                    quote_identifier(&column.name),
                    quote_identifier(alias)
                )),
                Some(ColumnEdit::Shadow) => select_list.push(format!(
                    "{} AS {}",
                    quote_identifier(&names::temporary_name(&column.name)),
                    quote_identifier(&column.name)
                )),
                None => select_list.push(quote_identifier(&column.name)),
            }
        }
        if let Some(extra) = plan.extra_columns.get(&table.name) {
            for (physical, logical) in extra {
                select_list.push(format!(
                    "{} AS {}",
                    quote_identifier(physical),
                    quote_identifier(logical)
                ));
            }
        }

        statements.push(format!(
            "CREATE OR REPLACE VIEW {}.{} AS SELECT {} FROM {}.{}",
            quote_identifier(version),
            quote_identifier(exposed_table),
            select_list.join(", "),
            quote_identifier(base),
            quote_identifier(&table.name),
        ));
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, Table};

    fn users() -> Schema {
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
                    name: "username".into(),
                    col_type: "text".into(),
                    nullable: false,
                    default: None,
                },
                Column {
                    name: "email".into(),
                    col_type: "text".into(),
                    nullable: false,
                    default: None,
                },
            ],
            primary_key: vec!["id".into()],
            ..Table::default()
        });
        schema
    }

    fn from_users() -> String {
        format!(
            "FROM {}.{}",
            quote_identifier("public"),
            quote_identifier("users")
        )
    }

    #[test]
    fn test_plain_table_is_exposed_as_is() {
        let statements = version_schema_sql(&users(), "public", "public_01_init", &ViewPlan::new());
        assert_eq!(
            statements[0],
            format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                quote_identifier("public_01_init")
            )
        );
        assert_eq!(
            statements[1],
            format!(
                "CREATE OR REPLACE VIEW {}.{} AS SELECT {}, {}, {} {}",
                quote_identifier("public_01_init"),
                quote_identifier("users"),
                quote_identifier("id"),
                quote_identifier("username"),
                quote_identifier("email"),
                from_users()
            )
        );
    }

    #[test]
    fn test_dropped_column_is_omitted() {
        let mut plan = ViewPlan::new();
        plan.hide_column("users", "username");
        let statements = version_schema_sql(&users(), "public", "public_02_drop", &plan);
        assert_eq!(
            statements[1],
            format!(
                "CREATE OR REPLACE VIEW {}.{} AS SELECT {}, {} {}",
                quote_identifier("public_02_drop"),
                quote_identifier("users"),
                quote_identifier("id"),
                quote_identifier("email"),
                from_users()
            )
        );
    }

    #[test]
    fn test_renamed_column_is_aliased() {
        let mut plan = ViewPlan::new();
        plan.alias_column("users", "username", "name");
        let statements = version_schema_sql(&users(), "public", "public_02_rename", &plan);
        assert!(statements[1].contains(&format!(
            "{} AS {}",
            quote_identifier("username"),
            quote_identifier("name")
        )));
    }

    #[test]
    fn test_changed_column_reads_the_shadow() {
        let mut plan = ViewPlan::new();
        plan.map_to_shadow("users", "email");
        let statements = version_schema_sql(&users(), "public", "public_02_change", &plan);
        assert!(statements[1].contains(&format!(
            "{} AS {}",
            quote_identifier("_pgroll_new_email"),
            quote_identifier("email")
        )));
        // The shadow column is aliased, never exposed under its own name.
        assert!(!statements[1].contains(&format!("AS {}", quote_identifier("_pgroll_new_email"))));
    }

    #[test]
    fn test_added_column_is_exposed_under_its_logical_name() {
        let mut plan = ViewPlan::new();
        plan.expose_extra_column("users", "_pgroll_new_age", "age");
        let statements = version_schema_sql(&users(), "public", "public_02_add", &plan);
        assert!(statements[1].contains(&format!(
            "{} AS {}",
            quote_identifier("_pgroll_new_age"),
            quote_identifier("age")
        )));
    }

    #[test]
    fn test_hidden_and_renamed_tables() {
        let mut plan = ViewPlan::new();
        plan.hide_table("users");
        let statements = version_schema_sql(&users(), "public", "public_02_droptab", &plan);
        assert_eq!(statements.len(), 1);

        let mut plan = ViewPlan::new();
        plan.rename_table("users", "accounts");
        let statements = version_schema_sql(&users(), "public", "public_02_rentab", &plan);
        assert!(statements[1].contains(&format!(
            "VIEW {}.{} AS",
            quote_identifier("public_02_rentab"),
            quote_identifier("accounts")
        )));
        assert!(statements[1].contains(&from_users()));
    }
}
