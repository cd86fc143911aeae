//! Batched backfill of a shadow column.
//!
//! Rather than computing values itself, the backfill touch-updates every
//! row in primary-key order so the freshly installed up trigger performs
//! the transformation. Batches are bounded and take `FOR NO KEY UPDATE`
//! row locks, so concurrent application writes keep flowing between
//! batches. The last-seen key travels between batches as text and is cast
//! back to the key's own type inside the statement, which keeps the loop
//! agnostic of the key type.

use tracing::debug;

use crate::db::Conn;
use crate::error::{MigrationError, Result};
use crate::quote::quote_identifier;
use crate::schema::Table;

pub async fn backfill(
    conn: &Conn<'_>,
    schema: &str,
    table: &Table,
    batch_size: i64,
) -> Result<()> {
    let pk = match table.primary_key.as_slice() {
        [pk] => pk.clone(),
        other => {
            return Err(MigrationError::InvalidPrimaryKey {
                table: table.name.clone(),
                fields: other.len(),
            })
        }
    };
    let pk_type = table
        .get_column(&pk)
        .map(|c| c.col_type.clone())
        .ok_or_else(|| MigrationError::ColumnDoesNotExist {
            table: table.name.clone(),
            name: pk.clone(),
        })?;

    let mut last: Option<String> = None;
    let mut batches = 0u64;
    loop {
        let sql = batch_sql(schema, &table.name, &pk, &pk_type, last.is_some(), batch_size);
        let next = match conn.fetch_optional_text(&sql, last.as_deref()).await {
            Err(MigrationError::DatabaseError(cause)) => {
                return Err(MigrationError::BackfillFailed {
                    table: table.name.clone(),
                    cause,
                })
            }
            other => other?,
        };
        match next {
            Some(value) => {
                batches += 1;
                last = Some(value);
            }
            None => break,
        }
    }
    debug!(table = %table.name, batches, "backfill finished");
    Ok(())
}

fn batch_sql(
    schema: &str,
    table: &str,
    pk: &str,
    pk_type: &str,
    keyed: bool,
    batch_size: i64,
) -> String {
    let table = format!("{}.{}", quote_identifier(schema), quote_identifier(table));
    let pk = quote_identifier(pk);
    let lower_bound = if keyed {
        format!("WHERE {pk} > CAST($1 AS {pk_type}) ")
    } else {
        String::new()
    };

    format!(
        "WITH batch AS (\
           SELECT {pk} FROM {table} {lower_bound}ORDER BY {pk} LIMIT {batch_size} FOR NO KEY UPDATE\
         ), updated AS (\
           UPDATE {table} SET {pk} = batch.{pk} FROM batch WHERE {table}.{pk} = batch.{pk}\
         ) \
         SELECT {pk}::text FROM batch ORDER BY {pk} DESC LIMIT 1"
    )
}
