//! Scriptable in-process engine.
//!
//! Simulates the production execution engine for tests and demos: statement
//! behaviors are scripted per statement text, jobs are cancellable by
//! operation id, and every submission is recorded for assertions.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use sqlgate_common::{ColumnDesc, OperationId, ResolvedCommand, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};

use crate::error::{EngineError, Result};
use crate::job::{ExecutionEngine, ExecutionOutcome, JobSpec, RowSource};

/// Scripted behavior for one statement text.
#[derive(Debug, Clone)]
pub enum Script {
    /// Succeed with the given schema and rows.
    Rows {
        schema: Vec<ColumnDesc>,
        rows: Vec<Row>,
    },
    /// Fail with an execution error.
    Fail(String),
    /// Block until the job is canceled, then fail with
    /// [`EngineError::Canceled`].
    HangUntilCanceled,
}

/// Record of one submitted job, kept for test assertions.
#[derive(Debug, Clone)]
pub struct SubmittedJob {
    pub job_id: OperationId,
    pub statement: String,
    pub pool: Option<String>,
    pub incremental: bool,
}

/// Mock engine that simulates the production distributed SQL engine.
#[derive(Default)]
pub struct MockEngine {
    /// Scripted behaviors keyed by exact statement text.
    scripts: Mutex<HashMap<String, Script>>,

    /// Query text to output schema, backing `resolve_schema`.
    view_schemas: Mutex<HashMap<String, Vec<ColumnDesc>>>,

    /// Per-job cancellation tokens. `notify_one` stores a permit, so a
    /// cancel that lands before the job starts waiting is still observed.
    cancels: DashMap<OperationId, Arc<Notify>>,

    /// Every job ever submitted, in order.
    submitted: Mutex<Vec<SubmittedJob>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the behavior of one statement. Unscripted statements succeed
    /// with an empty result.
    pub fn script(&self, statement: impl Into<String>, script: Script) {
        self.scripts.lock().insert(statement.into(), script);
    }

    /// Registers the schema `resolve_schema` reports for a query.
    pub fn script_view_schema(&self, query: impl Into<String>, schema: Vec<ColumnDesc>) {
        self.view_schemas.lock().insert(query.into(), schema);
    }

    /// All jobs submitted so far, in submission order.
    pub fn submitted_jobs(&self) -> Vec<SubmittedJob> {
        self.submitted.lock().clone()
    }

    /// Whether engine-side context is still held for the job.
    pub fn holds_job_context(&self, job_id: &OperationId) -> bool {
        self.cancels.contains_key(job_id)
    }

    fn cancel_token(&self, job_id: OperationId) -> Arc<Notify> {
        self.cancels
            .entry(job_id)
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    fn outcome(
        command: ResolvedCommand,
        plan: String,
        schema: Vec<ColumnDesc>,
        rows: Vec<Row>,
        incremental: bool,
    ) -> ExecutionOutcome {
        let rows = if incremental {
            let (tx, rx) = mpsc::channel(16);
            tokio::spawn(async move {
                for row in rows {
                    if tx.send(row).await.is_err() {
                        break;
                    }
                }
            });
            RowSource::Incremental(rx)
        } else {
            RowSource::Materialized(rows.into_iter())
        };
        ExecutionOutcome {
            plan,
            command,
            schema,
            rows,
        }
    }
}

#[async_trait]
impl ExecutionEngine for MockEngine {
    async fn submit(&self, job: JobSpec) -> Result<ExecutionOutcome> {
        self.submitted.lock().push(SubmittedJob {
            job_id: job.job_id,
            statement: job.statement.clone(),
            pool: job.pool.clone(),
            incremental: job.incremental,
        });

        let cancel = self.cancel_token(job.job_id);
        let command = ResolvedCommand::classify(&job.statement);
        let plan = format!("mock plan: {}", job.statement);
        let script = self.scripts.lock().get(&job.statement).cloned();

        match script {
            Some(Script::Fail(message)) => Err(EngineError::Execution(message)),
            Some(Script::HangUntilCanceled) => {
                cancel.notified().await;
                Err(EngineError::Canceled)
            }
            Some(Script::Rows { schema, rows }) => {
                Ok(Self::outcome(command, plan, schema, rows, job.incremental))
            }
            None => Ok(Self::outcome(
                command,
                plan,
                Vec::new(),
                Vec::new(),
                job.incremental,
            )),
        }
    }

    async fn cancel_job(&self, job_id: &OperationId) {
        tracing::debug!(job = %job_id, "cancel requested");
        self.cancel_token(*job_id).notify_one();
    }

    async fn release_job(&self, job_id: &OperationId) {
        self.cancels.remove(job_id);
    }

    async fn resolve_schema(&self, query: &str) -> Result<Vec<ColumnDesc>> {
        Ok(self
            .view_schemas
            .lock()
            .get(query)
            .cloned()
            .unwrap_or_default())
    }
}
