//! Schema introspection against the Postgres system catalogs.
//!
//! `information_schema` alone cannot answer everything the engine needs
//! (constraint validity, check expressions, default expressions), so the
//! reader goes to `pg_catalog` directly. Shadow objects created by the
//! engine itself are filtered out: a [`Schema`] snapshot only ever contains
//! the user-visible shape of the database.

use sqlx::PgPool;

use crate::error::Result;
use crate::names;
use crate::quote::quote_identifier;
use crate::schema::{CheckConstraint, Column, ForeignKey, Schema, Table, UniqueConstraint};

/// Reads [`Schema`] snapshots for one database schema.
pub struct Introspector {
    pool: PgPool,
    schema: String,
}

#[derive(sqlx::FromRow)]
struct TableRow {
    name: String,
}

#[derive(sqlx::FromRow)]
struct ColumnRow {
    name: String,
    col_type: String,
    nullable: bool,
    default: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ConstraintRow {
    name: String,
    validated: bool,
    definition: String,
    columns: Option<Vec<String>>,
    referenced_table: Option<String>,
    referenced_columns: Option<Vec<String>>,
    on_delete: Option<String>,
}

impl Introspector {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    pub fn schema_name(&self) -> &str {
        &self.schema
    }

    /// Read a fresh snapshot of every base table in the schema.
    pub async fn read(&self) -> Result<Schema> {
        let rows: Vec<TableRow> = sqlx::query_as(
            r#"
            SELECT c.relname::text AS name
            FROM pg_class c
            JOIN pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relkind = 'r'
            ORDER BY c.relname
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await?;

        let mut schema = Schema::new();
        for row in rows {
            schema.add_table(self.read_table(&row.name).await?);
        }
        Ok(schema)
    }

    /// Read a single table. The table is addressed by its unquoted name;
    /// quoting happens here.
    pub async fn read_table(&self, table: &str) -> Result<Table> {
        let regclass = format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(table)
        );

        let columns = self.read_columns(&regclass).await?;
        let primary_key = self.read_primary_key(&regclass).await?;
        let (foreign_keys, check_constraints, unique_constraints) =
            self.read_constraints(&regclass).await?;

        Ok(Table {
            name: table.to_string(),
            columns,
            primary_key,
            foreign_keys,
            check_constraints,
            unique_constraints,
        })
    }

    async fn read_columns(&self, regclass: &str) -> Result<Vec<Column>> {
        let rows: Vec<ColumnRow> = sqlx::query_as(
            r#"
            SELECT a.attname::text AS name,
                   format_type(a.atttypid, a.atttypmod) AS col_type,
                   NOT a.attnotnull AS nullable,
                   pg_get_expr(d.adbin, d.adrelid) AS "default"
            FROM pg_attribute a
            LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
            WHERE a.attrelid = $1::regclass
              AND a.attnum > 0
              AND NOT a.attisdropped
            ORDER BY a.attnum
            "#,
        )
        .bind(regclass)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter(|r| !names::is_shadow_name(&r.name))
            .map(|r| Column {
                name: r.name,
                col_type: r.col_type,
                nullable: r.nullable,
                default: r.default,
            })
            .collect())
    }

    async fn read_primary_key(&self, regclass: &str) -> Result<Vec<String>> {
        #[derive(sqlx::FromRow)]
        struct PkRow {
            name: String,
        }

        let rows: Vec<PkRow> = sqlx::query_as(
            r#"
            SELECT a.attname::text AS name
            FROM pg_index i
            JOIN pg_attribute a
              ON a.attrelid = i.indrelid AND a.attnum = ANY (i.indkey)
            WHERE i.indrelid = $1::regclass AND i.indisprimary
            ORDER BY array_position(i.indkey, a.attnum)
            "#,
        )
        .bind(regclass)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.name).collect())
    }

    async fn read_constraints(
        &self,
        regclass: &str,
    ) -> Result<(Vec<ForeignKey>, Vec<CheckConstraint>, Vec<UniqueConstraint>)> {
        let rows: Vec<ConstraintRow> = sqlx::query_as(
            r#"
            SELECT con.conname::text AS name,
                   con.convalidated AS validated,
                   pg_get_constraintdef(con.oid) AS definition,
                   (SELECT array_agg(att.attname::text ORDER BY k.ord)
                      FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
                      JOIN pg_attribute att
                        ON att.attrelid = con.conrelid AND att.attnum = k.attnum) AS columns,
                   CASE WHEN con.contype = 'f'
                        THEN con.confrelid::regclass::text
                   END AS referenced_table,
                   (SELECT array_agg(att.attname::text ORDER BY k.ord)
                      FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
                      JOIN pg_attribute att
                        ON att.attrelid = con.confrelid AND att.attnum = k.attnum) AS referenced_columns,
                   CASE con.confdeltype
                        WHEN 'c' THEN 'CASCADE'
                        WHEN 'n' THEN 'SET NULL'
                        WHEN 'd' THEN 'SET DEFAULT'
                        WHEN 'r' THEN 'RESTRICT'
                   END AS on_delete
            FROM pg_constraint con
            WHERE con.conrelid = $1::regclass
              AND con.contype IN ('f', 'c', 'u')
            ORDER BY con.conname
            "#,
        )
        .bind(regclass)
        .fetch_all(&self.pool)
        .await?;

        let mut foreign_keys = Vec::new();
        let mut check_constraints = Vec::new();
        let mut unique_constraints = Vec::new();

        for row in rows {
            if names::is_shadow_name(&row.name) {
                continue;
            }
            let columns = row.columns.clone().unwrap_or_default();
            if columns.iter().any(|c| names::is_shadow_name(c)) {
                continue;
            }
            if let Some(referenced_table) = row.referenced_table {
                foreign_keys.push(ForeignKey {
                    name: row.name,
                    columns,
                    referenced_table: referenced_table.trim_matches('"').to_string(),
                    referenced_columns: row.referenced_columns.unwrap_or_default(),
                    on_delete: row.on_delete,
                    validated: row.validated,
                });
            } else if row.definition.starts_with("CHECK") {
                check_constraints.push(CheckConstraint {
                    name: row.name,
                    columns,
                    definition: row.definition,
                    validated: row.validated,
                });
            } else {
                unique_constraints.push(UniqueConstraint {
                    name: row.name,
                    columns,
                });
            }
        }

        Ok((foreign_keys, check_constraints, unique_constraints))
    }
}
