//! DDL canonicalization
//!
//! Targeted text substitution over server-reported DDL so that two captures of
//! the same logical schema compare byte-for-byte, regardless of insert history
//! or the name of the database they were taken from. This is not a parser:
//! anything it does not recognise passes through unchanged.

use crate::escape::escape_id;
use crate::model::TableKind;
use once_cell::sync::Lazy;
use regex::Regex;

/// Stands in for the database name inside canonical DDL.
pub const DATABASE_NAME_PLACEHOLDER: &str = "{{.DatabaseName}}";

static AUTO_INCREMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" AUTO_INCREMENT=\d+").expect("auto-increment pattern is valid"));

/// Remove the volatile ` AUTO_INCREMENT=<n>` table option.
pub fn strip_auto_increment(ddl: &str) -> String {
    AUTO_INCREMENT.replace_all(ddl, "").into_owned()
}

/// Canonical form of a `SHOW CREATE TABLE` / `SHOW CREATE VIEW` result.
///
/// Views embed the quoted database name in every column reference, so for
/// them each occurrence is replaced by [`DATABASE_NAME_PLACEHOLDER`].
pub fn canonicalize(raw: &str, kind: TableKind, database_name: &str) -> String {
    let stripped = strip_auto_increment(raw);
    match kind {
        TableKind::BaseTable => stripped,
        TableKind::View => stripped.replace(&escape_id(database_name), DATABASE_NAME_PLACEHOLDER),
    }
}

/// Canonical form of a `SHOW CREATE DATABASE` result (first occurrence only).
pub fn canonicalize_database(raw: &str, database_name: &str) -> String {
    raw.replacen(&escape_id(database_name), DATABASE_NAME_PLACEHOLDER, 1)
}

/// Inverse of the placeholder substitution: bind canonical DDL to a concrete database.
pub fn bind_database(canonical: &str, database_name: &str) -> String {
    canonical.replace(DATABASE_NAME_PLACEHOLDER, &escape_id(database_name))
}
