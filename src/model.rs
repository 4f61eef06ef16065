//! Schema data model
//!
//! Value objects produced by a snapshot: one [`SchemaDefinition`] per database,
//! one [`TableDefinition`] per table or view. They are built fresh for every
//! snapshot call and never shared between calls.

use crate::error::{query_error, SchemaResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog table type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableKind {
    #[serde(rename = "BASE TABLE")]
    BaseTable,
    #[serde(rename = "VIEW")]
    View,
}

impl TableKind {
    /// Value reported in `information_schema.tables.table_type`
    pub const fn as_str(&self) -> &'static str {
        match self {
            TableKind::BaseTable => "BASE TABLE",
            TableKind::View => "VIEW",
        }
    }

    pub fn from_catalog(value: &str) -> SchemaResult<Self> {
        match value {
            "BASE TABLE" => Ok(TableKind::BaseTable),
            "VIEW" | "SYSTEM VIEW" => Ok(TableKind::View),
            other => Err(query_error(format!("unexpected table_type {:?}", other))),
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column descriptor as returned by the server's field-description protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    /// Wire type name (e.g. `LONG`, `NEWDECIMAL`, `VAR_STRING`)
    pub type_name: String,
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub column_length: u32,
    #[serde(default)]
    pub charset: u32,
    #[serde(default)]
    pub decimals: u32,
    #[serde(default)]
    pub flags: u32,
    /// Full declared type, when the server reports it
    #[serde(default)]
    pub column_type: String,
}

/// One table or view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TableKind,
    /// Bytes reported by the catalog; 0 when NULL (views)
    pub data_length: u64,
    /// Row estimate reported by the catalog; 0 when NULL (views)
    pub row_count: u64,
    /// Primary key columns in ordinal order
    #[serde(default)]
    pub primary_key_columns: Vec<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Canonicalized CREATE TABLE / CREATE VIEW text
    pub schema: String,
}

/// Snapshot of one database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDefinition {
    /// Canonical CREATE DATABASE with the name replaced by the placeholder
    pub database_schema: String,
    /// Tables in catalog listing order
    #[serde(default)]
    pub tables: Vec<TableDefinition>,
    #[serde(default)]
    pub version: String,
}

impl SchemaDefinition {
    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    pub fn base_tables(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.iter().filter(|t| t.kind == TableKind::BaseTable)
    }

    pub fn views(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.iter().filter(|t| t.kind == TableKind::View)
    }
}

/// A schema change to apply, with optional expected before/after states
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SchemaChange {
    pub sql: String,
    #[serde(default)]
    pub before_schema: Option<SchemaDefinition>,
    #[serde(default)]
    pub after_schema: Option<SchemaDefinition>,
    /// Let the change flow into the replication stream
    #[serde(default)]
    pub allow_replication: bool,
    /// Downgrade before/after mismatches to warnings
    #[serde(default)]
    pub force: bool,
}

/// Schema captured around one validated change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaChangeResult {
    pub before_schema: SchemaDefinition,
    pub after_schema: SchemaDefinition,
}
