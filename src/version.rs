//! Schema version fingerprint

use crate::model::SchemaDefinition;
use sha2::{Digest, Sha256};

/// Compute a deterministic digest over the canonical content of a snapshot.
///
/// Only structural text takes part: row counts and data lengths change with
/// every insert and are left out.
pub fn schema_version(schema: &SchemaDefinition) -> String {
    let mut hasher = Sha256::new();
    hasher.update(schema.database_schema.as_bytes());
    for table in &schema.tables {
        hasher.update(b"\0");
        hasher.update(table.name.as_bytes());
        hasher.update(b"\0");
        hasher.update(table.kind.as_str().as_bytes());
        hasher.update(b"\0");
        hasher.update(table.schema.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Stamp `schema.version` from its current content.
pub fn assign_version(schema: &mut SchemaDefinition) {
    schema.version = schema_version(schema);
}
