//! Installation of the row-level triggers that keep both versions of a
//! column in sync during a migration.
//!
//! Each direction is a PL/pgSQL function plus a `BEFORE INSERT OR UPDATE`
//! row trigger. The function declares one variable per logical column,
//! populates them from the row image, and decides direction by comparing
//! `search_path` with the latest version schema as reported by the state
//! schema's `latest_version` function: writes arriving through an older
//! version fire the *up* transformation into the shadow column, writes
//! arriving through the latest version fire the *down* transformation back
//! into the original column. The triggers only assign to `NEW` and issue no
//! writes of their own, so they cannot re-enter themselves.

use crate::db::Conn;
use crate::error::{MigrationError, Result};
use crate::names;
use crate::quote::{quote_identifier, quote_literal};
use crate::schema::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDirection {
    Up,
    Down,
}

/// One declared variable of the trigger function: the name the user's
/// expression sees, the `NEW` attribute it reads, and its SQL type.
#[derive(Debug, Clone)]
pub struct ColumnMapping {
    pub logical: String,
    pub physical: String,
    pub col_type: String,
}

pub struct TriggerConfig<'a> {
    pub name: String,
    pub function: String,
    pub direction: TriggerDirection,
    pub schema: &'a str,
    pub state_schema: &'a str,
    pub table: &'a str,
    /// Attribute of `NEW` receiving the transformation result.
    pub physical_column: String,
    pub expression: String,
    pub columns: Vec<ColumnMapping>,
}

/// The up/down pair installed by every column-transforming operation.
pub struct TriggerPair<'a> {
    pub schema: &'a str,
    pub state_schema: &'a str,
    pub table: &'a Table,
    pub column: &'a str,
    pub up: String,
    pub down: String,
}

pub async fn install(conn: &Conn<'_>, config: &TriggerConfig<'_>) -> Result<()> {
    names::check_identifier_length(&config.name)?;
    names::check_identifier_length(&config.function)?;

    let result = conn
        .execute_all(&[function_sql(config), trigger_sql(config)])
        .await;
    match result {
        Err(MigrationError::DatabaseError(cause)) => Err(MigrationError::TriggerInstallFailed {
            table: config.table.to_string(),
            cause,
        }),
        other => other,
    }
}

/// Install both directions for a shadow-column operation.
pub async fn install_pair(conn: &Conn<'_>, pair: &TriggerPair<'_>) -> Result<()> {
    let shadow = names::temporary_name(pair.column);

    let identity: Vec<ColumnMapping> = pair
        .table
        .columns
        .iter()
        .map(|c| ColumnMapping {
            logical: c.name.clone(),
            physical: c.name.clone(),
            col_type: c.col_type.clone(),
        })
        .collect();

    // In the down direction the changed column's logical name resolves to
    // the shadow column, which is what the latest version writes.
    let down_columns: Vec<ColumnMapping> = identity
        .iter()
        .cloned()
        .map(|mut m| {
            if m.logical == pair.column {
                m.physical = shadow.clone();
            }
            m
        })
        .collect();

    install(
        conn,
        &TriggerConfig {
            name: names::trigger_name(&pair.table.name, pair.column),
            function: names::trigger_function_name(&pair.table.name, pair.column),
            direction: TriggerDirection::Up,
            schema: pair.schema,
            state_schema: pair.state_schema,
            table: &pair.table.name,
            physical_column: shadow.clone(),
            expression: pair.up.clone(),
            columns: identity,
        },
    )
    .await?;

    install(
        conn,
        &TriggerConfig {
            name: names::trigger_name(&pair.table.name, &shadow),
            function: names::trigger_function_name(&pair.table.name, &shadow),
            direction: TriggerDirection::Down,
            schema: pair.schema,
            state_schema: pair.state_schema,
            table: &pair.table.name,
            physical_column: pair.column.to_string(),
            expression: pair.down.clone(),
            columns: down_columns,
        },
    )
    .await
}

/// Drop one trigger and its function, tolerating absence.
pub async fn drop_trigger(conn: &Conn<'_>, schema: &str, table: &str, column: &str) -> Result<()> {
    let statements = drop_trigger_sql(schema, table, column);
    conn.execute_all(&statements).await
}

/// Drop the up/down pair installed by [`install_pair`].
pub async fn drop_trigger_pair(
    conn: &Conn<'_>,
    schema: &str,
    table: &str,
    column: &str,
) -> Result<()> {
    drop_trigger(conn, schema, table, column).await?;
    drop_trigger(conn, schema, table, &names::temporary_name(column)).await
}

fn drop_trigger_sql(schema: &str, table: &str, column: &str) -> Vec<String> {
    vec![
        format!(
            "DROP TRIGGER IF EXISTS {} ON {}.{}",
            quote_identifier(&names::trigger_name(table, column)),
            quote_identifier(schema),
            quote_identifier(table),
        ),
        format!(
            "DROP FUNCTION IF EXISTS {}.{}()",
            quote_identifier(schema),
            quote_identifier(&names::trigger_function_name(table, column)),
        ),
    ]
}

fn function_sql(config: &TriggerConfig<'_>) -> String {
    let mut declarations = String::new();
    let mut assignments = String::new();
    for mapping in &config.columns {
        declarations.push_str(&format!(
            "  {} {};\n",
            quote_identifier(&mapping.logical),
            mapping.col_type,
        ));
        assignments.push_str(&format!(
            "    {} := NEW.{};\n",
            quote_identifier(&mapping.logical),
            quote_identifier(&mapping.physical),
        ));
    }

    let comparison = match config.direction {
        TriggerDirection::Up => "<>",
        TriggerDirection::Down => "=",
    };

    format!(
        r#"CREATE OR REPLACE FUNCTION {schema}.{function}()
RETURNS TRIGGER
LANGUAGE plpgsql
AS $$
DECLARE
{declarations}  latest_schema text;
  search_path text;
BEGIN
  SELECT {schema_literal} || '_' || latest_version
    INTO latest_schema
    FROM {state_schema}.latest_version({schema_literal});
  SELECT current_setting('search_path') INTO search_path;

  IF search_path {comparison} latest_schema THEN
{assignments}    NEW.{physical} = {expression};
  END IF;

  RETURN NEW;
END; $$"#,
        schema = quote_identifier(config.schema),
        function = quote_identifier(&config.function),
        declarations = declarations,
        schema_literal = quote_literal(config.schema),
        state_schema = quote_identifier(config.state_schema),
        comparison = comparison,
        assignments = assignments,
        physical = quote_identifier(&config.physical_column),
        expression = config.expression,
    )
}

fn trigger_sql(config: &TriggerConfig<'_>) -> String {
    format!(
        "CREATE OR REPLACE TRIGGER {name}\n  BEFORE UPDATE OR INSERT ON {schema}.{table}\n  FOR EACH ROW\n  EXECUTE FUNCTION {schema}.{function}()",
        name = quote_identifier(&config.name),
        schema = quote_identifier(config.schema),
        table = quote_identifier(config.table),
        function = quote_identifier(&config.function),
    )
}
