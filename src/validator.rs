//! Schema Change Validator
//!
//! Preflight replays the live schema into a throwaway shadow database and
//! records the schema before and after each proposed statement. Apply runs
//! one change against the real database, guarded by optional expected
//! before/after schemas.

use crate::canonical::bind_database;
use crate::config::ValidatorConfig;
use crate::diff::diff_schemas;
use crate::error::{SchemaError, SchemaResult};
use crate::escape::escape_id;
use crate::executor::ScriptRunner;
use crate::model::{SchemaChange, SchemaChangeResult, SchemaDefinition};
use crate::snapshot::SchemaSnapshotter;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct SchemaChangeValidator {
    snapshotter: SchemaSnapshotter,
    runner: Arc<dyn ScriptRunner>,
    config: ValidatorConfig,
}

impl SchemaChangeValidator {
    pub fn new(snapshotter: SchemaSnapshotter, runner: Arc<dyn ScriptRunner>, config: ValidatorConfig) -> Self {
        Self {
            snapshotter,
            runner,
            config,
        }
    }

    /// Simulate `changes` in order against a copy of `db`'s schema.
    ///
    /// Returns one before/after pair per change. The work runs on its own
    /// task, so the shadow database is dropped on every exit path even when
    /// the caller stops waiting; a failed drop after an earlier error is only
    /// logged.
    pub async fn preflight(
        &self,
        ctx: &CancellationToken,
        db: &str,
        changes: &[String],
    ) -> SchemaResult<Vec<SchemaChangeResult>> {
        let this = self.clone();
        let (ctx, db, changes) = (ctx.clone(), db.to_string(), changes.to_vec());
        detached(async move { this.run_preflight(&ctx, &db, &changes).await }).await
    }

    async fn run_preflight(
        &self,
        ctx: &CancellationToken,
        db: &str,
        changes: &[String],
    ) -> SchemaResult<Vec<SchemaChangeResult>> {
        let original = self.snapshotter.snapshot_all(ctx, db, true).await?;
        let shadow = self.shadow_name();
        info!("preflight of {} change(s) on {} using {}", changes.len(), db, shadow);

        match self.preflight_in(ctx, &original, &shadow, changes).await {
            Ok(results) => {
                self.drop_shadow(&shadow).await?;
                Ok(results)
            }
            Err(e) => {
                if let Err(cleanup) = self.drop_shadow(&shadow).await {
                    error!("failed to drop shadow database {}: {}", shadow, cleanup);
                }
                Err(e)
            }
        }
    }

    async fn preflight_in(
        &self,
        ctx: &CancellationToken,
        original: &SchemaDefinition,
        shadow: &str,
        changes: &[String],
    ) -> SchemaResult<Vec<SchemaChangeResult>> {
        self.runner.run(&self.copy_script(original, shadow)).await?;

        let mut results = Vec::with_capacity(changes.len());
        for change in changes {
            let before_schema = self.snapshotter.snapshot_all(ctx, shadow, true).await?;

            let sql = format!(
                "{};\nUSE {};\n{}",
                self.config.replication_off_sql,
                escape_id(shadow),
                change
            );
            self.runner.run(&sql).await?;

            let after_schema = self.snapshotter.snapshot_all(ctx, shadow, true).await?;
            results.push(SchemaChangeResult {
                before_schema,
                after_schema,
            });
        }
        Ok(results)
    }

    /// Script recreating `schema` inside `shadow`: base tables first, then views.
    fn copy_script(&self, schema: &SchemaDefinition, shadow: &str) -> String {
        let shadow_id = escape_id(shadow);
        let mut statements = vec![
            self.config.replication_off_sql.clone(),
            format!("DROP DATABASE IF EXISTS {}", shadow_id),
            format!("CREATE DATABASE {}", shadow_id),
            format!("USE {}", shadow_id),
            self.config.fk_checks_off_sql.clone(),
        ];
        statements.extend(schema.base_tables().map(|t| t.schema.clone()));
        statements.extend(schema.views().map(|t| bind_database(&t.schema, shadow)));

        let mut script = statements.join(";\n");
        script.push_str(";\n");
        script
    }

    async fn drop_shadow(&self, shadow: &str) -> SchemaResult<()> {
        let sql = format!(
            "{};\nDROP DATABASE IF EXISTS {};\n",
            self.config.replication_off_sql,
            escape_id(shadow)
        );
        self.runner.run(&sql).await
    }

    fn shadow_name(&self) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{}_{}", self.config.shadow_prefix, &suffix[..12])
    }

    /// Apply one change to `db`, checking the schema before and after.
    ///
    /// Like [`preflight`](Self::preflight), runs to completion once started.
    pub async fn apply(
        &self,
        ctx: &CancellationToken,
        db: &str,
        change: &SchemaChange,
    ) -> SchemaResult<SchemaChangeResult> {
        let this = self.clone();
        let (ctx, db, change) = (ctx.clone(), db.to_string(), change.clone());
        detached(async move { this.run_apply(&ctx, &db, &change).await }).await
    }

    async fn run_apply(
        &self,
        ctx: &CancellationToken,
        db: &str,
        change: &SchemaChange,
    ) -> SchemaResult<SchemaChangeResult> {
        let before_schema = self.snapshotter.snapshot_all(ctx, db, true).await?;

        if let Some(expected) = &change.before_schema {
            let differences = diff_schemas("actual", &before_schema, "expected", expected);
            if !differences.is_empty() {
                for msg in &differences {
                    warn!("BeforeSchema differs: {}", msg);
                }

                if let Some(expected_after) = &change.after_schema {
                    if diff_schemas("actual", &before_schema, "expected", expected_after).is_empty() {
                        info!("{}: schema change already applied, skipping", db);
                        return Ok(SchemaChangeResult {
                            after_schema: before_schema.clone(),
                            before_schema,
                        });
                    }
                }

                if change.force {
                    warn!("BeforeSchema differs, applying anyway");
                } else {
                    return Err(SchemaError::PreconditionMismatch { differences });
                }
            }
        }

        let mut sql = format!("USE {};\n", escape_id(db));
        if !change.allow_replication {
            sql.push_str(&self.config.replication_off_sql);
            sql.push_str(";\n");
        }
        sql.push_str(&change.sql);
        self.runner.run(&sql).await?;

        let after_schema = self.snapshotter.snapshot_all(ctx, db, true).await?;

        if let Some(expected) = &change.after_schema {
            let differences = diff_schemas("actual", &after_schema, "expected", expected);
            if !differences.is_empty() {
                for msg in &differences {
                    warn!("AfterSchema differs: {}", msg);
                }
                if change.force {
                    warn!("AfterSchema differs, not reporting error");
                } else {
                    return Err(SchemaError::PostconditionMismatch { differences });
                }
            }
        }

        info!("{}: schema change applied, version {} -> {}", db, before_schema.version, after_schema.version);
        Ok(SchemaChangeResult {
            before_schema,
            after_schema,
        })
    }
}

/// Run `work` on its own task and wait for it; dropping the waiter leaves the task running.
async fn detached<T, F>(work: F) -> SchemaResult<T>
where
    T: Send + 'static,
    F: Future<Output = SchemaResult<T>> + Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => result,
        Err(e) => Err(SchemaError::Internal(format!("schema change task failed: {}", e))),
    }
}
