//! Table inclusion filter
//!
//! Include/exclude lists hold either exact table names or, when an entry starts
//! with `/`, a regular expression (surrounding slashes are trimmed, matching is
//! unanchored): `["orders", "/^audit_/"]`.

use crate::error::{SchemaError, SchemaResult};
use crate::model::TableKind;
use regex::Regex;

#[derive(Debug, Clone, Default)]
struct NameSet {
    names: Vec<String>,
    patterns: Vec<Regex>,
}

impl NameSet {
    fn parse(entries: &[String], list: &str) -> SchemaResult<Self> {
        let mut set = NameSet::default();
        for entry in entries {
            if entry.starts_with('/') {
                let pattern = entry.trim_matches('/');
                let re = Regex::new(pattern).map_err(|e| {
                    SchemaError::Filter(format!("cannot compile regexp {} for {}: {}", pattern, list, e))
                })?;
                set.patterns.push(re);
            } else {
                set.names.push(entry.clone());
            }
        }
        Ok(set)
    }

    fn is_empty(&self) -> bool {
        self.names.is_empty() && self.patterns.is_empty()
    }

    fn matches(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name) || self.patterns.iter().any(|re| re.is_match(name))
    }
}

/// Decides which catalog entries take part in a snapshot
#[derive(Debug, Clone, Default)]
pub struct TableFilter {
    include: NameSet,
    exclude: NameSet,
    include_views: bool,
}

impl TableFilter {
    /// Build a filter; fails with [`SchemaError::Filter`] on an invalid pattern.
    pub fn new(tables: &[String], exclude_tables: &[String], include_views: bool) -> SchemaResult<Self> {
        Ok(Self {
            include: NameSet::parse(tables, "table")?,
            exclude: NameSet::parse(exclude_tables, "exclude table")?,
            include_views,
        })
    }

    /// Filter that accepts every table (and every view when `include_views`).
    pub fn all(include_views: bool) -> Self {
        Self {
            include_views,
            ..Self::default()
        }
    }

    pub fn includes(&self, name: &str, kind: TableKind) -> bool {
        if !self.include.is_empty() && !self.include.matches(name) {
            return false;
        }
        if self.exclude.matches(name) {
            return false;
        }
        kind != TableKind::View || self.include_views
    }
}
