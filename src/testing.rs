//! In-memory stand-in for a MySQL-style server
//!
//! Implements [`DbaPool`] and [`ScriptRunner`] over one shared catalog so the
//! collector, snapshotter and validator run end-to-end in tests. It understands
//! just enough SQL for that: the catalog queries the collector issues and the
//! DDL that preflight/apply scripts contain.

use crate::error::{SchemaError, SchemaResult};
use crate::executor::ScriptRunner;
use crate::model::{Field, TableKind};
use crate::pool::{DbaConnection, DbaPool, QueryResult, Row};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

static QUOTED_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"`((?:[^`]|``)+)`").unwrap());
static SCHEMA_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"table_schema = '([^']*)'").unwrap());
static IN_LIST: Lazy<Regex> = Lazy::new(|| Regex::new(r"table_name IN \(([^)]*)\)").unwrap());
static STRING_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"'([^']*)'").unwrap());
static VIEW_ALIAS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i) AS `([^`]+)`").unwrap());

#[derive(Debug, Clone)]
struct MockColumn {
    name: String,
    sql_type: String,
}

#[derive(Debug, Clone)]
struct MockTable {
    name: String,
    kind: TableKind,
    columns: Vec<MockColumn>,
    primary_key: Vec<String>,
    rows: u64,
    auto_increment: Option<u64>,
    /// Everything after `AS` in a view definition
    view_body: String,
}

impl MockTable {
    fn create_statement(&self) -> String {
        match self.kind {
            TableKind::View => format!(
                "CREATE ALGORITHM=UNDEFINED DEFINER=`root`@`localhost` SQL SECURITY DEFINER VIEW `{}` AS {}",
                self.name, self.view_body
            ),
            TableKind::BaseTable => {
                let mut lines: Vec<String> = self
                    .columns
                    .iter()
                    .map(|c| format!("  `{}` {}", c.name, c.sql_type))
                    .collect();
                if !self.primary_key.is_empty() {
                    let keys: Vec<String> = self.primary_key.iter().map(|k| format!("`{}`", k)).collect();
                    lines.push(format!("  PRIMARY KEY ({})", keys.join(",")));
                }
                let auto_increment = self
                    .auto_increment
                    .map(|n| format!(" AUTO_INCREMENT={}", n))
                    .unwrap_or_default();
                format!(
                    "CREATE TABLE `{}` (\n{}\n) ENGINE=InnoDB{} DEFAULT CHARSET=utf8mb4",
                    self.name,
                    lines.join(",\n"),
                    auto_increment
                )
            }
        }
    }

    fn fields(&self) -> Vec<Field> {
        self.columns
            .iter()
            .map(|c| Field {
                name: c.name.clone(),
                type_name: c
                    .sql_type
                    .split(|ch: char| ch == ' ' || ch == '(')
                    .next()
                    .unwrap_or_default()
                    .to_uppercase(),
                table: self.name.clone(),
                column_type: c.sql_type.clone(),
                ..Field::default()
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
struct MockDatabase {
    /// Creation order doubles as catalog listing order
    tables: Vec<MockTable>,
}

impl MockDatabase {
    fn table(&self, name: &str) -> Option<&MockTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    fn table_mut(&mut self, name: &str) -> Option<&mut MockTable> {
        self.tables.iter_mut().find(|t| t.name == name)
    }
}

#[derive(Debug, Default)]
struct MockState {
    databases: BTreeMap<String, MockDatabase>,
    failures: Vec<String>,
    delays: Vec<(String, Duration)>,
    hidden: HashSet<(String, String)>,
    scripts: Vec<String>,
    queries: Vec<String>,
    open_connections: usize,
    peak_connections: usize,
}

impl MockState {
    fn database(&self, name: &str) -> SchemaResult<&MockDatabase> {
        self.databases
            .get(name)
            .ok_or_else(|| SchemaError::Query(format!("ERROR 1049 (42000): Unknown database '{}'", name)))
    }

    fn database_mut(&mut self, name: &str) -> SchemaResult<&mut MockDatabase> {
        self.databases
            .get_mut(name)
            .ok_or_else(|| SchemaError::Execution(format!("ERROR 1049 (42000): Unknown database '{}'", name)))
    }

    fn injected_failure(&self, sql: &str) -> Option<String> {
        self.failures.iter().find(|f| sql.contains(f.as_str())).cloned()
    }

    fn delay_for(&self, sql: &str) -> Option<Duration> {
        self.delays
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, d)| *d)
    }
}

/// Shared handle to the simulated server; clones see the same catalog.
#[derive(Debug, Clone, Default)]
pub struct MockServer {
    state: Arc<Mutex<MockState>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn create_database(&self, name: &str) -> &Self {
        self.lock().databases.entry(name.to_string()).or_default();
        self
    }

    /// Add a base table; `columns` are `(name, declared type)` pairs.
    pub fn add_table(&self, db: &str, name: &str, columns: &[(&str, &str)], primary_key: &[&str]) -> &Self {
        let table = MockTable {
            name: name.to_string(),
            kind: TableKind::BaseTable,
            columns: columns
                .iter()
                .map(|(n, t)| MockColumn {
                    name: n.to_string(),
                    sql_type: t.to_string(),
                })
                .collect(),
            primary_key: primary_key.iter().map(|k| k.to_string()).collect(),
            rows: 0,
            auto_increment: None,
            view_body: String::new(),
        };
        self.lock().databases.entry(db.to_string()).or_default().tables.push(table);
        self
    }

    /// Add a view selecting `columns` from `table` in the same database.
    pub fn add_view(&self, db: &str, name: &str, table: &str, columns: &[&str]) -> &Self {
        let select: Vec<String> = columns
            .iter()
            .map(|c| format!("`{db}`.`{table}`.`{c}` AS `{c}`"))
            .collect();
        let view = MockTable {
            name: name.to_string(),
            kind: TableKind::View,
            columns: columns
                .iter()
                .map(|c| MockColumn {
                    name: c.to_string(),
                    sql_type: "int".to_string(),
                })
                .collect(),
            primary_key: vec![],
            rows: 0,
            auto_increment: None,
            view_body: format!("select {} from `{}`.`{}`", select.join(","), db, table),
        };
        self.lock().databases.entry(db.to_string()).or_default().tables.push(view);
        self
    }

    /// Simulate inserts: bumps the row estimate and the auto-increment counter.
    pub fn insert_rows(&self, db: &str, table: &str, count: u64) {
        let mut state = self.lock();
        if let Some(t) = state.databases.get_mut(db).and_then(|d| d.table_mut(table)) {
            t.rows += count;
            t.auto_increment = Some(t.rows + 1);
        }
    }

    /// Fail every query or script containing `pattern`.
    pub fn fail_on(&self, pattern: &str) {
        self.lock().failures.push(pattern.to_string());
    }

    /// Stall every query containing `pattern` for `delay`.
    pub fn delay_on(&self, pattern: &str, delay: Duration) {
        self.lock().delays.push((pattern.to_string(), delay));
    }

    /// Make `SHOW CREATE TABLE` for this table come back empty.
    pub fn hide_create_statement(&self, db: &str, table: &str) {
        self.lock().hidden.insert((db.to_string(), table.to_string()));
    }

    pub fn scripts(&self) -> Vec<String> {
        self.lock().scripts.clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.lock().queries.clone()
    }

    pub fn open_connections(&self) -> usize {
        self.lock().open_connections
    }

    pub fn peak_connections(&self) -> usize {
        self.lock().peak_connections
    }

    pub fn database_names(&self) -> Vec<String> {
        self.lock().databases.keys().cloned().collect()
    }

    fn answer(&self, sql: &str, want_fields: bool) -> SchemaResult<QueryResult> {
        let mut state = self.lock();
        state.queries.push(sql.to_string());
        if let Some(pattern) = state.injected_failure(sql) {
            return Err(SchemaError::Query(format!("injected failure on {:?}", pattern)));
        }

        let ids = quoted_ids(sql);
        if sql.starts_with("SHOW CREATE DATABASE") {
            let name = ids.first().cloned().unwrap_or_default();
            state.database(&name)?;
            return Ok(rows(vec![vec![
                Some(name.clone()),
                Some(format!("CREATE DATABASE `{}` /*!40100 DEFAULT CHARACTER SET utf8mb4 */", name)),
            ]]));
        }

        if sql.starts_with("SHOW CREATE TABLE") {
            let (db, table) = qualified(&ids)?;
            if state.hidden.contains(&(db.clone(), table.clone())) {
                return Ok(QueryResult::default());
            }
            let t = state
                .database(&db)?
                .table(&table)
                .ok_or_else(|| missing_table(&db, &table))?;
            return Ok(rows(vec![vec![Some(table.clone()), Some(t.create_statement())]]));
        }

        if sql.starts_with("SELECT * FROM") && sql.ends_with("WHERE 1=0") {
            let (db, table) = qualified(&ids)?;
            let t = state
                .database(&db)?
                .table(&table)
                .ok_or_else(|| missing_table(&db, &table))?;
            return Ok(QueryResult {
                fields: if want_fields { t.fields() } else { vec![] },
                rows: vec![],
            });
        }

        if sql.contains("FROM information_schema.tables") {
            let db = schema_literal(sql)?;
            let base_only = sql.contains("table_type = 'BASE TABLE'");
            let listing = state
                .database(&db)
                .map(|d| d.tables.clone())
                .unwrap_or_default()
                .into_iter()
                .filter(|t| !base_only || t.kind == TableKind::BaseTable)
                .map(|t| match t.kind {
                    TableKind::BaseTable => vec![
                        Some(t.name.clone()),
                        Some("BASE TABLE".to_string()),
                        Some((t.rows * 16_384).to_string()),
                        Some(t.rows.to_string()),
                    ],
                    TableKind::View => vec![Some(t.name.clone()), Some("VIEW".to_string()), None, None],
                })
                .collect();
            return Ok(rows(listing));
        }

        if sql.contains("FROM information_schema.key_column_usage") {
            let db = schema_literal(sql)?;
            let wanted: HashSet<String> = IN_LIST
                .captures(sql)
                .map(|c| {
                    STRING_LITERAL
                        .captures_iter(&c[1])
                        .map(|m| m[1].to_string())
                        .collect()
                })
                .unwrap_or_default();
            let mut tables: Vec<&MockTable> = match state.databases.get(&db) {
                Some(d) => d.tables.iter().filter(|t| wanted.contains(&t.name)).collect(),
                None => vec![],
            };
            tables.sort_by(|a, b| a.name.cmp(&b.name));
            let mut result = Vec::new();
            for t in tables {
                for (i, column) in t.primary_key.iter().enumerate() {
                    result.push(vec![Some(t.name.clone()), Some((i + 1).to_string()), Some(column.clone())]);
                }
            }
            return Ok(rows(result));
        }

        if sql == "SELECT 1" {
            return Ok(rows(vec![vec![Some("1".to_string())]]));
        }

        Err(SchemaError::Query(format!("ERROR 1064 (42000): unsupported query: {}", sql)))
    }

    fn execute_statement(state: &mut MockState, current: &mut Option<String>, statement: &str) -> SchemaResult<()> {
        let upper = statement.to_uppercase();
        let ids = quoted_ids(statement);
        let first_id = || {
            ids.first()
                .cloned()
                .or_else(|| statement.split_whitespace().last().map(str::to_string))
                .unwrap_or_default()
        };

        if upper.starts_with("SET ") {
            return Ok(());
        }
        if upper.starts_with("USE ") {
            let name = first_id();
            state.database_mut(&name)?;
            *current = Some(name);
            return Ok(());
        }
        if upper.starts_with("DROP DATABASE") {
            let name = first_id();
            if state.databases.remove(&name).is_none() && !upper.contains("IF EXISTS") {
                return Err(SchemaError::Execution(format!(
                    "ERROR 1008 (HY000): Can't drop database '{}'; database doesn't exist",
                    name
                )));
            }
            return Ok(());
        }
        if upper.starts_with("CREATE DATABASE") {
            let name = first_id();
            if state.databases.contains_key(&name) {
                return Err(SchemaError::Execution(format!(
                    "ERROR 1007 (HY000): Can't create database '{}'; database exists",
                    name
                )));
            }
            state.databases.insert(name, MockDatabase::default());
            return Ok(());
        }

        let db_name = current
            .clone()
            .ok_or_else(|| SchemaError::Execution("ERROR 1046 (3D000): No database selected".to_string()))?;
        let db = state.database_mut(&db_name)?;

        if upper.starts_with("CREATE TABLE") {
            let table = parse_create_table(statement)?;
            if db.table(&table.name).is_some() {
                return Err(SchemaError::Execution(format!(
                    "ERROR 1050 (42S01): Table '{}' already exists",
                    table.name
                )));
            }
            db.tables.push(table);
            return Ok(());
        }
        if upper.starts_with("CREATE") && upper.contains(" VIEW ") {
            let view = parse_create_view(statement)?;
            db.tables.push(view);
            return Ok(());
        }
        if upper.starts_with("ALTER TABLE") {
            let name = first_id();
            let table = db
                .table_mut(&name)
                .ok_or_else(|| SchemaError::Execution(format!("ERROR 1146 (42S02): Table '{}' doesn't exist", name)))?;
            return alter_table(table, statement);
        }
        if upper.starts_with("DROP TABLE") || upper.starts_with("DROP VIEW") {
            let name = first_id();
            let before = db.tables.len();
            db.tables.retain(|t| t.name != name);
            if before == db.tables.len() && !upper.contains("IF EXISTS") {
                return Err(SchemaError::Execution(format!("ERROR 1051 (42S02): Unknown table '{}'", name)));
            }
            return Ok(());
        }

        Err(SchemaError::Execution(format!(
            "ERROR 1064 (42000): You have an error in your SQL syntax near '{}'",
            statement
        )))
    }
}

#[async_trait]
impl DbaPool for MockServer {
    async fn acquire(&self) -> SchemaResult<Box<dyn DbaConnection>> {
        {
            let mut state = self.lock();
            state.open_connections += 1;
            state.peak_connections = state.peak_connections.max(state.open_connections);
        }
        Ok(Box::new(MockConnection { server: self.clone() }))
    }
}

#[async_trait]
impl ScriptRunner for MockServer {
    async fn run(&self, sql: &str) -> SchemaResult<()> {
        let mut state = self.lock();
        state.scripts.push(sql.to_string());
        if let Some(pattern) = state.injected_failure(sql) {
            return Err(SchemaError::Execution(format!("injected failure on {:?}", pattern)));
        }
        let mut current = None;
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            Self::execute_statement(&mut state, &mut current, statement)?;
        }
        Ok(())
    }
}

struct MockConnection {
    server: MockServer,
}

#[async_trait]
impl DbaConnection for MockConnection {
    async fn fetch(&mut self, sql: &str, want_fields: bool) -> SchemaResult<QueryResult> {
        let delay = self.server.lock().delay_for(sql);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.server.answer(sql, want_fields)
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        if let Ok(mut state) = self.server.state.lock() {
            state.open_connections -= 1;
        }
    }
}

fn rows(rows: Vec<Row>) -> QueryResult {
    QueryResult { fields: vec![], rows }
}

fn quoted_ids(sql: &str) -> Vec<String> {
    QUOTED_ID
        .captures_iter(sql)
        .map(|c| c[1].replace("``", "`"))
        .collect()
}

fn qualified(ids: &[String]) -> SchemaResult<(String, String)> {
    match ids {
        [db, table, ..] => Ok((db.clone(), table.clone())),
        _ => Err(SchemaError::Query("ERROR 1064 (42000): expected `db`.`table`".to_string())),
    }
}

fn schema_literal(sql: &str) -> SchemaResult<String> {
    SCHEMA_LITERAL
        .captures(sql)
        .map(|c| c[1].to_string())
        .ok_or_else(|| SchemaError::Query("ERROR 1064 (42000): missing table_schema".to_string()))
}

/// Mirrors the pool's mapping of ER_NO_SUCH_TABLE.
fn missing_table(db: &str, table: &str) -> SchemaError {
    SchemaError::NotFound(format!("Table '{}.{}' doesn't exist", db, table))
}

fn unquote(token: &str) -> String {
    token.trim_matches('`').replace("``", "`")
}

/// Split on commas that are not nested inside parentheses.
fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in body.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

fn parse_create_table(statement: &str) -> SchemaResult<MockTable> {
    let syntax = || SchemaError::Execution(format!("ERROR 1064 (42000): bad CREATE TABLE: {}", statement));
    let open = statement.find('(').ok_or_else(syntax)?;
    let close = statement.rfind(')').ok_or_else(syntax)?;
    let name = statement[..open].split_whitespace().last().map(unquote).ok_or_else(syntax)?;

    let mut columns = Vec::new();
    let mut primary_key = Vec::new();
    for item in split_top_level(&statement[open + 1..close]) {
        if item.to_uppercase().starts_with("PRIMARY KEY") {
            let inner = item
                .find('(')
                .zip(item.rfind(')'))
                .map(|(a, b)| &item[a + 1..b])
                .ok_or_else(syntax)?;
            primary_key = inner.split(',').map(|k| unquote(k.trim())).collect();
            continue;
        }
        let (column, sql_type) = item.split_once(char::is_whitespace).ok_or_else(syntax)?;
        let sql_type = sql_type.trim();
        if sql_type.to_uppercase().contains("PRIMARY KEY") {
            primary_key.push(unquote(column));
        }
        columns.push(MockColumn {
            name: unquote(column),
            sql_type: sql_type.replace(" PRIMARY KEY", "").replace(" primary key", ""),
        });
    }

    Ok(MockTable {
        name,
        kind: TableKind::BaseTable,
        columns,
        primary_key,
        rows: 0,
        auto_increment: None,
        view_body: String::new(),
    })
}

fn parse_create_view(statement: &str) -> SchemaResult<MockTable> {
    let syntax = || SchemaError::Execution(format!("ERROR 1064 (42000): bad CREATE VIEW: {}", statement));
    let upper = statement.to_uppercase();
    let after_view = upper.find(" VIEW ").ok_or_else(syntax)? + " VIEW ".len();
    let rest = &statement[after_view..];
    let (name, body) = rest
        .split_once(" AS ")
        .or_else(|| rest.split_once(" as "))
        .ok_or_else(syntax)?;
    let body = body.trim().to_string();
    let columns = VIEW_ALIAS
        .captures_iter(&body)
        .map(|c| MockColumn {
            name: c[1].to_string(),
            sql_type: "int".to_string(),
        })
        .collect();

    Ok(MockTable {
        name: unquote(name.trim()),
        kind: TableKind::View,
        columns,
        primary_key: vec![],
        rows: 0,
        auto_increment: None,
        view_body: body,
    })
}

fn alter_table(table: &mut MockTable, statement: &str) -> SchemaResult<()> {
    let syntax = || SchemaError::Execution(format!("ERROR 1064 (42000): bad ALTER TABLE: {}", statement));
    let upper = statement.to_uppercase();

    if let Some(pos) = upper.find(" DROP COLUMN ") {
        let column = statement[pos + " DROP COLUMN ".len()..].trim();
        let column = unquote(column.split_whitespace().next().ok_or_else(syntax)?);
        let before = table.columns.len();
        table.columns.retain(|c| c.name != column);
        if before == table.columns.len() {
            return Err(SchemaError::Execution(format!(
                "ERROR 1091 (42000): Can't DROP '{}'; check that column/key exists",
                column
            )));
        }
        return Ok(());
    }

    let pos = upper
        .find(" ADD COLUMN ")
        .map(|p| p + " ADD COLUMN ".len())
        .or_else(|| upper.find(" ADD ").map(|p| p + " ADD ".len()))
        .ok_or_else(syntax)?;
    let (column, sql_type) = statement[pos..].trim().split_once(char::is_whitespace).ok_or_else(syntax)?;
    let column = unquote(column);
    if table.columns.iter().any(|c| c.name == column) {
        return Err(SchemaError::Execution(format!(
            "ERROR 1060 (42S21): Duplicate column name '{}'",
            column
        )));
    }
    table.columns.push(MockColumn {
        name: column,
        sql_type: sql_type.trim().to_string(),
    });
    Ok(())
}
