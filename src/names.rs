//! Derivation of the auxiliary object names used during a migration.
//!
//! All derivations are pure functions of their inputs so that a second run
//! of the engine (or a crashed-and-restarted one) computes the same names.
//! Names are quoted on emission, never truncated; a derived name that would
//! exceed Postgres's identifier limit is rejected at Start.

use crate::error::{MigrationError, Result};

const TEMPORARY_PREFIX: &str = "_pgroll_new_";
const DUPLICATION_PREFIX: &str = "_pgroll_dup_";

/// Postgres truncates identifiers beyond 63 bytes; the engine refuses to
/// emit such names instead of letting the server mangle them silently.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Name of the shadow column that tracks `column` during a migration.
pub fn temporary_name(column: &str) -> String {
    format!("{TEMPORARY_PREFIX}{column}")
}

/// Name under which a constraint is duplicated onto the shadow column.
pub fn duplication_name(name: &str) -> String {
    format!("{DUPLICATION_PREFIX}{name}")
}

pub fn is_duplicated_name(name: &str) -> bool {
    name.starts_with(DUPLICATION_PREFIX)
}

pub fn strip_duplication_prefix(name: &str) -> &str {
    name.strip_prefix(DUPLICATION_PREFIX).unwrap_or(name)
}

/// True for any physical object the engine creates for its own bookkeeping
/// and that must stay invisible to version schemas.
pub fn is_shadow_name(name: &str) -> bool {
    name.starts_with(TEMPORARY_PREFIX) || name.starts_with(DUPLICATION_PREFIX)
}

pub fn trigger_function_name(table: &str, column: &str) -> String {
    format!("_pgroll_trigger_fn_{table}_{column}")
}

pub fn trigger_name(table: &str, column: &str) -> String {
    format!("_pgroll_trigger_{table}_{column}")
}

pub fn not_null_constraint_name(column: &str) -> String {
    format!("_pgroll_check_not_null_{column}")
}

/// Name of the schema holding the views for `migration` on top of `base`.
pub fn version_schema_name(base: &str, migration: &str) -> String {
    format!("{base}_{migration}")
}

/// Rejects identifiers the server would truncate.
pub fn check_identifier_length(name: &str) -> Result<()> {
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrationError::IdentifierTooLong {
            name: name.to_string(),
        });
    }
    Ok(())
}
