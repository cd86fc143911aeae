//! SQL quoting helpers.
//!
//! Thin wrappers over `pg_escape` so call sites deal in owned strings.
//! Every identifier and literal the engine emits goes through these.

pub fn quote_identifier(identifier: &str) -> String {
    pg_escape::quote_identifier(identifier).to_string()
}

pub fn quote_literal(literal: &str) -> String {
    pg_escape::quote_literal(literal).to_string()
}
