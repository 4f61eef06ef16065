//! SQL script executor
//!
//! Runs multi-statement administrative scripts (shadow database lifecycle,
//! schema changes) outside the row-query path, by piping them into an external
//! SQL client process authenticated with the administrative credentials.

use crate::config::{DatabaseConfig, ScriptConfig};
use crate::error::{SchemaError, SchemaResult};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Execute `sql` as one script; any failing statement fails the run.
    async fn run(&self, sql: &str) -> SchemaResult<()>;
}

/// Pipes scripts into a command-line SQL client.
#[derive(Clone)]
pub struct CliScriptRunner {
    program: String,
    args: Vec<String>,
    host: String,
    port: u16,
    user: String,
    password: String,
    timeout: Duration,
}

impl CliScriptRunner {
    pub fn new(script: &ScriptConfig, database: &DatabaseConfig) -> Self {
        Self {
            program: script.program.clone(),
            args: script.args.clone(),
            host: database.host.clone(),
            port: database.port,
            user: database.user.clone(),
            password: database.password.clone(),
            timeout: script.timeout,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(format!("--host={}", self.host))
            .arg(format!("--port={}", self.port))
            .arg(format!("--user={}", self.user))
            .env("MYSQL_PWD", &self.password)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ScriptRunner for CliScriptRunner {
    async fn run(&self, sql: &str) -> SchemaResult<()> {
        debug!("running script via {} ({} bytes)", self.program, sql.len());

        let mut child = self
            .command()
            .spawn()
            .map_err(|e| SchemaError::Execution(format!("cannot start {}: {}", self.program, e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SchemaError::Internal("script client stdin not captured".to_string()))?;

        // Feed stdin from its own task so a chatty client cannot fill its
        // stdout pipe and stall while we are still writing.
        let script = sql.to_owned();
        let writer = tokio::spawn(async move {
            stdin.write_all(script.as_bytes()).await?;
            stdin.shutdown().await
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| SchemaError::Timeout(format!("{} took longer than {:?}", self.program, self.timeout)))?
            .map_err(|e| SchemaError::Execution(format!("{} failed: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SchemaError::Execution(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        match writer.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SchemaError::Execution(format!("cannot write script to {}: {}", self.program, e))),
            Err(e) => Err(SchemaError::Internal(format!("script writer task failed: {}", e))),
        }
    }
}
