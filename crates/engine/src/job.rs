//! Engine submission contract.

use async_trait::async_trait;
use sqlgate_common::{ColumnDesc, OperationId, ResolvedCommand, Row};
use tokio::sync::mpsc;

use crate::error::Result;

/// A named unit of work handed to the engine.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Names the job engine-side, so external cancellation APIs can target
    /// the running statement by operation id.
    pub job_id: OperationId,

    pub statement: String,

    /// Scheduler pool applied for the duration of this job only.
    pub pool: Option<String>,

    /// Lazy pull-driven rows instead of eager materialization.
    pub incremental: bool,
}

/// Row production handle. Single-pass and non-restartable in both modes: a
/// consumed or canceled sequence cannot be rewound.
pub enum RowSource {
    /// Eagerly materialized result, iterated in place.
    Materialized(std::vec::IntoIter<Row>),
    /// Pull-driven sequence fed by the engine.
    Incremental(mpsc::Receiver<Row>),
}

impl RowSource {
    pub async fn next_row(&mut self) -> Option<Row> {
        match self {
            RowSource::Materialized(rows) => rows.next(),
            RowSource::Incremental(rx) => rx.recv().await,
        }
    }
}

/// Everything the engine reports back for a successful job.
pub struct ExecutionOutcome {
    /// Human-readable plan description, surfaced in lifecycle events.
    pub plan: String,

    /// Logical command the engine resolved the statement to.
    pub command: ResolvedCommand,

    pub schema: Vec<ColumnDesc>,

    pub rows: RowSource,
}

/// Contract of the external execution engine.
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Parse, plan, and execute a statement as a named job. Blocks until the
    /// full result is materialized (eager mode) or initial execution
    /// completes (incremental mode).
    async fn submit(&self, job: JobSpec) -> Result<ExecutionOutcome>;

    /// Best-effort cooperative cancellation of the named job. The job may
    /// still complete its underlying work before the signal is observed.
    async fn cancel_job(&self, job_id: &OperationId);

    /// Releases all engine-side context held for the named job, including
    /// its cancellation grouping. Never blocks on job completion.
    async fn release_job(&self, job_id: &OperationId);

    /// Re-resolves a query to its output schema, used when registering views
    /// into the catalog mirror.
    async fn resolve_schema(&self, query: &str) -> Result<Vec<ColumnDesc>>;
}
