//! Helpers shared by the column-transforming operations.
//!
//! Every operation that works through a shadow column converges the same
//! way: validate the unchecked constraints now that the backfill has filled
//! every row, drop the triggers, drop the original column, rename the
//! shadow column into place, and give the duplicated constraints their
//! original names back. Rollback is the mirror image and only ever removes
//! engine-created objects.

use sea_query::{Alias, PostgresQueryBuilder, Table as TableStmt};

use crate::error::{MigrationError, Result};
use crate::names;
use crate::quote::quote_identifier;
use crate::schema::{Column, Schema, Table};
use crate::triggers;

use super::{CompleteContext, RollbackContext};

pub(crate) fn require_table<'a>(schema: &'a Schema, name: &str) -> Result<&'a Table> {
    schema
        .get_table(name)
        .ok_or_else(|| MigrationError::TableDoesNotExist {
            name: name.to_string(),
        })
}

pub(crate) fn require_column<'a>(table: &'a Table, name: &str) -> Result<&'a Column> {
    table
        .get_column(name)
        .ok_or_else(|| MigrationError::ColumnDoesNotExist {
            table: table.name.clone(),
            name: name.to_string(),
        })
}

pub(crate) fn require_single_column_pk(table: &Table) -> Result<()> {
    if table.primary_key.len() != 1 {
        return Err(MigrationError::InvalidPrimaryKey {
            table: table.name.clone(),
            fields: table.primary_key.len(),
        });
    }
    Ok(())
}

/// Converge on the shadow column.
///
/// `not_null_check` names the unchecked NOT NULL constraint to upgrade into
/// a column attribute, when one was installed at start. `excluded` is the
/// constraint the duplicator skipped, if any.
pub(crate) async fn complete_column_swap(
    ctx: &CompleteContext<'_>,
    table: &Table,
    column: &str,
    not_null_check: Option<&str>,
    excluded: Option<&str>,
) -> Result<()> {
    triggers::drop_trigger_pair(&ctx.conn, ctx.schema_name, &table.name, column).await?;
    ctx.conn
        .execute_all(&complete_swap_sql(
            ctx.schema_name,
            table,
            column,
            not_null_check,
            excluded,
        ))
        .await
}

/// Remove the shadow column and its triggers, leaving the original side
/// untouched. Tolerates partial starts: objects that were never created
/// are skipped.
pub(crate) async fn rollback_column_swap(
    ctx: &RollbackContext<'_>,
    table: &str,
    column: &str,
) -> Result<()> {
    triggers::drop_trigger_pair(&ctx.conn, ctx.schema_name, table, column).await?;
    ctx.conn
        .execute(&format!(
            "ALTER TABLE {}.{} DROP COLUMN IF EXISTS {}",
            quote_identifier(ctx.schema_name),
            quote_identifier(table),
            quote_identifier(&names::temporary_name(column)),
        ))
        .await
}

fn complete_swap_sql(
    schema_name: &str,
    table: &Table,
    column: &str,
    not_null_check: Option<&str>,
    excluded: Option<&str>,
) -> Vec<String> {
    let qualified = format!(
        "{}.{}",
        quote_identifier(schema_name),
        quote_identifier(&table.name)
    );
    let shadow = names::temporary_name(column);
    let mut statements = Vec::new();

    // The backfill is done; the unchecked NOT NULL constraint can be
    // validated and upgraded to a plain column attribute. Postgres skips
    // the table scan when a validated check proves non-nullability.
    if let Some(check) = not_null_check {
        statements.push(format!(
            "ALTER TABLE {qualified} VALIDATE CONSTRAINT {}",
            quote_identifier(check)
        ));
        statements.push(format!(
            "ALTER TABLE {qualified} ALTER COLUMN {} SET NOT NULL",
            quote_identifier(&shadow)
        ));
        statements.push(format!(
            "ALTER TABLE {qualified} DROP CONSTRAINT {}",
            quote_identifier(check)
        ));
    }

    for cc in table.check_constraints_on(column) {
        if Some(cc.name.as_str()) == excluded {
            continue;
        }
        statements.push(format!(
            "ALTER TABLE {qualified} VALIDATE CONSTRAINT {}",
            quote_identifier(&names::duplication_name(&cc.name))
        ));
    }

    statements.push(
        TableStmt::alter()
            .table((Alias::new(schema_name), Alias::new(&table.name)))
            .drop_column(Alias::new(column))
            .to_owned()
            .to_string(PostgresQueryBuilder),
    );
    statements.push(format!(
        "ALTER TABLE {qualified} RENAME COLUMN {} TO {}",
        quote_identifier(&shadow),
        quote_identifier(column)
    ));

    for fk in table.foreign_keys_on(column) {
        if Some(fk.name.as_str()) == excluded {
            continue;
        }
        statements.push(format!(
            "ALTER TABLE {qualified} RENAME CONSTRAINT {} TO {}",
            quote_identifier(&names::duplication_name(&fk.name)),
            quote_identifier(&fk.name)
        ));
    }
    for cc in table.check_constraints_on(column) {
        if Some(cc.name.as_str()) == excluded {
            continue;
        }
        statements.push(format!(
            "ALTER TABLE {qualified} RENAME CONSTRAINT {} TO {}",
            quote_identifier(&names::duplication_name(&cc.name)),
            quote_identifier(&cc.name)
        ));
    }
    // Duplicated unique constraints exist as concurrently built indexes;
    // adopting them promotes the index and renames it in one step.
    for uc in table.unique_constraints_on(column) {
        if Some(uc.name.as_str()) == excluded {
            continue;
        }
        statements.push(format!(
            "ALTER TABLE {qualified} ADD CONSTRAINT {} UNIQUE USING INDEX {}",
            quote_identifier(&uc.name),
            quote_identifier(&names::duplication_name(&uc.name))
        ));
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CheckConstraint, ForeignKey, UniqueConstraint};

    fn reviews() -> Table {
        Table {
            name: "reviews".into(),
            columns: vec![
                Column {
                    name: "id".into(),
                    col_type: "integer".into(),
                    nullable: false,
                    default: None,
                },
                Column {
                    name: "review".into(),
                    col_type: "text".into(),
                    nullable: false,
                    default: None,
                },
            ],
            primary_key: vec!["id".into()],
            foreign_keys: vec![ForeignKey {
                name: "fk_review_product".into(),
                columns: vec!["review".into()],
                referenced_table: "products".into(),
                referenced_columns: vec!["name".into()],
                on_delete: None,
                validated: true,
            }],
            check_constraints: vec![CheckConstraint {
                name: "review_length".into(),
                columns: vec!["review".into()],
                definition: "CHECK ((length(review) > 3))".into(),
                validated: true,
            }],
            unique_constraints: vec![UniqueConstraint {
                name: "reviews_review_key".into(),
                columns: vec!["review".into()],
            }],
        }
    }

    #[test]
    fn test_swap_validates_drops_renames_in_order() {
        let table = reviews();
        let statements = complete_swap_sql(
            "public",
            &table,
            "review",
            Some("_pgroll_dup__pgroll_check_not_null_review"),
            None,
        );

        let joined = statements.join(";\n");
        let validate_not_null = joined
            .find(&format!(
                "VALIDATE CONSTRAINT {}",
                quote_identifier("_pgroll_dup__pgroll_check_not_null_review")
            ))
            .unwrap();
        let set_not_null = joined
            .find(&format!(
                "ALTER COLUMN {} SET NOT NULL",
                quote_identifier("_pgroll_new_review")
            ))
            .unwrap();
        // sea-query emits the column drop and always quotes.
        let drop_column = joined.find(r#"DROP COLUMN "review""#).unwrap();
        let rename = joined
            .find(&format!(
                "RENAME COLUMN {} TO {}",
                quote_identifier("_pgroll_new_review"),
                quote_identifier("review")
            ))
            .unwrap();
        let adopt_unique = joined
            .find(&format!(
                "ADD CONSTRAINT {} UNIQUE USING INDEX {}",
                quote_identifier("reviews_review_key"),
                quote_identifier("_pgroll_dup_reviews_review_key")
            ))
            .unwrap();

        assert!(validate_not_null < set_not_null);
        assert!(set_not_null < drop_column);
        assert!(drop_column < rename);
        assert!(rename < adopt_unique);
        assert!(joined.contains(&format!(
            "VALIDATE CONSTRAINT {}",
            quote_identifier("_pgroll_dup_review_length")
        )));
        assert!(joined.contains(&format!(
            "RENAME CONSTRAINT {} TO {}",
            quote_identifier("_pgroll_dup_fk_review_product"),
            quote_identifier("fk_review_product")
        )));
        assert!(joined.contains(&format!(
            "RENAME CONSTRAINT {} TO {}",
            quote_identifier("_pgroll_dup_review_length"),
            quote_identifier("review_length")
        )));
    }

    #[test]
    fn test_excluded_constraint_is_not_restored() {
        let table = reviews();
        let statements =
            complete_swap_sql("public", &table, "review", None, Some("reviews_review_key"));
        let joined = statements.join(";\n");
        assert!(!joined.contains("UNIQUE USING INDEX"));
        assert!(joined.contains("RENAME CONSTRAINT"));
    }
}
