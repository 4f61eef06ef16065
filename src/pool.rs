//! Connection pool capability
//!
//! The snapshot engine talks to the server only through [`DbaPool`] and
//! [`DbaConnection`]. A connection is exclusive to whoever acquired it and goes
//! back to the pool when the boxed handle is dropped, on every exit path.
//!
//! [`MysqlPool`] is the bundled implementation, built on `mysql_async`.

use crate::config::DatabaseConfig;
use crate::error::{SchemaError, SchemaResult};
use crate::model::Field;
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Column, OptsBuilder, PoolConstraints, PoolOpts, SslOpts, Value};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// One result row; `None` is SQL NULL.
pub type Row = Vec<Option<String>>;

/// Rows plus (optionally) column descriptors
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub fields: Vec<Field>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    /// Text of `row[column]`, `None` for NULL or a short row.
    pub fn value(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column)?.as_deref()
    }
}

#[async_trait]
pub trait DbaConnection: Send {
    /// Run `sql` and return its rows, with column descriptors when `want_fields`.
    async fn fetch(&mut self, sql: &str, want_fields: bool) -> SchemaResult<QueryResult>;

    /// [`fetch`](Self::fetch) guarded by a row limit: more than `max_rows` rows is an error.
    async fn execute_fetch(&mut self, sql: &str, max_rows: usize, want_fields: bool) -> SchemaResult<QueryResult> {
        let result = self.fetch(sql, want_fields).await?;
        if result.rows.len() > max_rows {
            return Err(SchemaError::Query(format!(
                "row count exceeded {} ({} rows) for query: {}",
                max_rows,
                result.rows.len(),
                sql
            )));
        }
        Ok(result)
    }
}

#[async_trait]
pub trait DbaPool: Send + Sync {
    /// Take a connection; it is released when the returned box is dropped.
    async fn acquire(&self) -> SchemaResult<Box<dyn DbaConnection>>;
}

/// Pool of administrative connections speaking the MySQL protocol
#[derive(Clone)]
pub struct MysqlPool {
    pool: mysql_async::Pool,
    query_timeout: Duration,
}

impl MysqlPool {
    pub fn connect(config: &DatabaseConfig) -> SchemaResult<Self> {
        let constraints = Some(config.max_pool_size)
            .filter(|max| *max > 0)
            .and_then(|max| PoolConstraints::new(0, max))
            .ok_or_else(|| SchemaError::Config(format!("invalid pool size {}", config.max_pool_size)))?;

        let mut opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .db_name(Some(config.database.clone()))
            .pool_opts(PoolOpts::default().with_constraints(constraints));
        if config.require_tls {
            opts = opts.ssl_opts(SslOpts::default());
        }

        info!(
            "Pool created for {}@{}:{} (max {} connections, TLS: {})",
            config.user, config.host, config.port, config.max_pool_size, config.require_tls
        );

        Ok(Self {
            pool: mysql_async::Pool::new(opts),
            query_timeout: config.query_timeout,
        })
    }

    /// Round-trip a trivial query to prove the server is reachable.
    pub async fn ping(&self) -> SchemaResult<()> {
        let mut conn = self.acquire().await?;
        conn.execute_fetch("SELECT 1", 1, false).await?;
        Ok(())
    }

    /// Close idle connections and refuse new ones.
    pub async fn disconnect(self) -> SchemaResult<()> {
        self.pool.disconnect().await?;
        Ok(())
    }
}

#[async_trait]
impl DbaPool for MysqlPool {
    async fn acquire(&self) -> SchemaResult<Box<dyn DbaConnection>> {
        let conn = within(self.query_timeout, "acquiring a connection", self.pool.get_conn()).await?;
        Ok(Box::new(MysqlConnection {
            conn,
            query_timeout: self.query_timeout,
        }))
    }
}

struct MysqlConnection {
    conn: mysql_async::Conn,
    query_timeout: Duration,
}

impl MysqlConnection {
    async fn query(&mut self, sql: &str, want_fields: bool) -> Result<QueryResult, mysql_async::Error> {
        let result = self.conn.query_iter(sql).await?;
        let fields = match result.columns() {
            Some(columns) if want_fields => columns.iter().map(field_of).collect(),
            _ => Vec::new(),
        };

        let rows: Vec<mysql_async::Row> = result.collect_and_drop().await?;
        let rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|i| row.as_ref(i).and_then(text_of)).collect())
            .collect();

        Ok(QueryResult { fields, rows })
    }
}

#[async_trait]
impl DbaConnection for MysqlConnection {
    async fn fetch(&mut self, sql: &str, want_fields: bool) -> SchemaResult<QueryResult> {
        debug!("fetch: {}", sql);
        let limit = self.query_timeout;
        within(limit, "running a query", self.query(sql, want_fields)).await
    }
}

fn field_of(column: &Column) -> Field {
    let type_name = format!("{:?}", column.column_type());
    Field {
        name: column.name_str().into_owned(),
        type_name: type_name.trim_start_matches("MYSQL_TYPE_").to_string(),
        table: column.org_table_str().into_owned(),
        column_length: column.column_length(),
        charset: u32::from(column.character_set()),
        decimals: u32::from(column.decimals()),
        flags: u32::from(column.flags().bits()),
        column_type: String::new(),
    }
}

/// Text-protocol rows arrive as bytes; anything else is rendered as SQL.
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        other => Some(other.as_sql(true).trim_matches('\'').to_string()),
    }
}

/// Bound a server round trip so a misbehaving server cannot stall the caller.
async fn within<T, E, F>(limit: Duration, what: &str, fut: F) -> SchemaResult<T>
where
    F: Future<Output = Result<T, E>>,
    SchemaError: From<E>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(SchemaError::from),
        Err(_) => Err(SchemaError::Timeout(format!("{} took longer than {:?}", what, limit))),
    }
}
