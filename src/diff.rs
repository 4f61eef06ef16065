//! Schema Diff Engine
//!
//! Compares two schema snapshots and reports every discrepancy as a
//! human-readable line. An empty report means the schemas are equivalent.
//! Versions are not compared: they are derived from the compared content.

use crate::model::{SchemaDefinition, TableDefinition, TableKind};
use std::collections::HashMap;

/// Compare two snapshots, labelling each side in the messages.
pub fn diff_schemas(
    left_label: &str,
    left: &SchemaDefinition,
    right_label: &str,
    right: &SchemaDefinition,
) -> Vec<String> {
    let mut differences = Vec::new();

    if left.database_schema != right.database_schema {
        differences.push(format!(
            "schemas are different:\n{}: {}\n differs from:\n{}: {}",
            left_label, left.database_schema, right_label, right.database_schema
        ));
    }

    let left_map: HashMap<&str, &TableDefinition> =
        left.tables.iter().map(|t| (t.name.as_str(), t)).collect();
    let right_map: HashMap<&str, &TableDefinition> =
        right.tables.iter().map(|t| (t.name.as_str(), t)).collect();

    let mut names: Vec<&str> = left_map.keys().chain(right_map.keys()).copied().collect();
    names.sort_unstable();
    names.dedup();

    for name in names {
        match (left_map.get(name), right_map.get(name)) {
            (Some(table), None) => differences.push(extra_object(left_label, table)),
            (None, Some(table)) => differences.push(extra_object(right_label, table)),
            (Some(l), Some(r)) => {
                if l.schema != r.schema {
                    differences.push(format!(
                        "schemas differ on table {}:\n{}: {}\n differs from:\n{}: {}",
                        name, left_label, l.schema, right_label, r.schema
                    ));
                }
                if l.kind != r.kind {
                    differences.push(format!(
                        "schemas differ on table type for table {}:\n{}: {}\n differs from:\n{}: {}",
                        name, left_label, l.kind, right_label, r.kind
                    ));
                }
            }
            (None, None) => {}
        }
    }

    differences
}

/// Like [`diff_schemas`] but either side may be missing.
pub fn diff_optional_schemas(
    left_label: &str,
    left: Option<&SchemaDefinition>,
    right_label: &str,
    right: Option<&SchemaDefinition>,
) -> Vec<String> {
    match (left, right) {
        (None, None) => Vec::new(),
        (Some(l), Some(r)) => diff_schemas(left_label, l, right_label, r),
        (l, r) => vec![format!(
            "schemas are different:\n{}: {}, {}: {}",
            left_label,
            presence(l),
            right_label,
            presence(r)
        )],
    }
}

fn presence(schema: Option<&SchemaDefinition>) -> &'static str {
    if schema.is_some() { "present" } else { "<nil>" }
}

fn extra_object(label: &str, table: &TableDefinition) -> String {
    match table.kind {
        TableKind::BaseTable => format!("{} has an extra table named {}", label, table.name),
        TableKind::View => format!("{} has an extra view named {}", label, table.name),
    }
}
