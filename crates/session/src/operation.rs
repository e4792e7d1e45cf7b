//! Per-statement state machine and execution driver.

use parking_lot::Mutex;
use sqlgate_common::{
    CatalogMirror, ColumnDesc, EventListener, GatewayConfig, OperationId, QueryType, Row, SessionId,
};
use sqlgate_engine::{EngineError, ExecutionEngine, ExecutionOutcome, JobSpec};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::catalog_sync;
use crate::error::{Result, SessionError, format_cause_chain};
use crate::session::ActivePools;

/// Lifecycle state of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Initialized,
    Running,
    Finished,
    Canceled,
    Closed,
    Error,
    /// Reserved for future scheduling states; no transition produces them.
    Pending,
    Unknown,
}

impl OperationState {
    /// Terminal for scheduling purposes: the operation will do no more work.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationState::Finished
                | OperationState::Canceled
                | OperationState::Closed
                | OperationState::Error
        )
    }

    /// Whether a transition from `self` to `to` is legal. Total over all
    /// state pairs: closing is allowed from anywhere, terminal states admit
    /// nothing else, and the reserved tags admit nothing else either.
    pub fn permits(self, to: OperationState) -> bool {
        use OperationState::*;
        matches!(
            (self, to),
            (_, Closed)
                | (Initialized, Running)
                | (Initialized, Canceled)
                | (Initialized, Error)
                | (Running, Finished)
                | (Running, Canceled)
                | (Running, Error)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationState::Initialized => "initialized",
            OperationState::Running => "running",
            OperationState::Finished => "finished",
            OperationState::Canceled => "canceled",
            OperationState::Closed => "closed",
            OperationState::Error => "error",
            OperationState::Pending => "pending",
            OperationState::Unknown => "unknown",
        }
    }
}

/// Live result of a successful run: schema plus a single-pass row source.
pub struct ResultSet {
    schema: Vec<ColumnDesc>,
    rows: sqlgate_engine::RowSource,
}

/// The lifecycle object for one submitted statement.
///
/// Owned by the operation registry, back-referencing its session by id.
/// `state` and the access timestamp are shared between the running path, the
/// cancelling path, and the idle reaper.
pub struct Operation {
    id: OperationId,
    session_id: SessionId,
    statement: String,
    is_cursor: bool,
    query_type: QueryType,
    state: Mutex<OperationState>,
    last_access_ms: AtomicU64,
    /// Empty while an in-flight `fetch` holds the taken-out handle, so
    /// `close()` never waits on engine progress.
    result: Mutex<Option<ResultSet>>,
    pools: ActivePools,
    engine: Arc<dyn ExecutionEngine>,
    catalog: Arc<dyn CatalogMirror>,
    listener: Arc<dyn EventListener>,
    config: Arc<GatewayConfig>,
}

impl Operation {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        session_id: SessionId,
        statement: String,
        is_cursor: bool,
        pools: ActivePools,
        engine: Arc<dyn ExecutionEngine>,
        catalog: Arc<dyn CatalogMirror>,
        listener: Arc<dyn EventListener>,
        config: Arc<GatewayConfig>,
    ) -> Self {
        let query_type = QueryType::derive(&statement, is_cursor);
        Self {
            id: OperationId::new(),
            session_id,
            statement,
            is_cursor,
            query_type,
            state: Mutex::new(OperationState::Initialized),
            last_access_ms: AtomicU64::new(now_ms()),
            result: Mutex::new(None),
            pools,
            engine,
            catalog,
            listener,
            config,
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn is_cursor(&self) -> bool {
        self.is_cursor
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    pub fn state(&self) -> OperationState {
        *self.state.lock()
    }

    pub fn last_access_ms(&self) -> u64 {
        self.last_access_ms.load(Ordering::Acquire)
    }

    fn touch(&self) {
        self.last_access_ms.store(now_ms(), Ordering::Release);
    }

    /// Applies a transition if the state machine permits it; returns whether
    /// the state changed. Every change also refreshes the access timestamp.
    fn transition(&self, to: OperationState) -> bool {
        let mut state = self.state.lock();
        if !state.permits(to) {
            return false;
        }
        *state = to;
        drop(state);
        self.touch();
        true
    }

    /// Drives the statement through the engine, blocking the calling task
    /// until the result is available or execution fails.
    pub async fn run(&self) -> Result<()> {
        if !self.transition(OperationState::Running) {
            let state = self.state();
            if state == OperationState::Canceled {
                return Err(SessionError::Canceled(self.id));
            }
            return Err(SessionError::InvalidState {
                operation: self.id,
                state: state.as_str(),
            });
        }

        self.listener
            .statement_started(self.id, self.session_id, &self.statement);

        // Pool assignment is read at submit time and applied for this job only.
        let pool = self
            .pools
            .get(&self.session_id)
            .map(|entry| entry.value().clone());
        let job = JobSpec {
            job_id: self.id,
            statement: self.statement.clone(),
            pool,
            incremental: self.config.incremental_collect,
        };

        match self.engine.submit(job).await {
            Ok(outcome) => self.complete(outcome).await,
            Err(err) => self.fail(err),
        }
    }

    async fn complete(&self, outcome: ExecutionOutcome) -> Result<()> {
        self.listener.statement_parsed(self.id, &outcome.plan);

        let command = outcome.command;
        let schema = outcome.schema.clone();
        *self.result.lock() = Some(ResultSet {
            schema: outcome.schema,
            rows: outcome.rows,
        });

        if !self.transition(OperationState::Finished) {
            // a concurrent cancel or force-close won the race while the
            // engine was wrapping up; that outcome stands
            let state = self.state();
            if state == OperationState::Closed {
                // the close already released the handle; do not leave the
                // late result behind
                *self.result.lock() = None;
            }
            if state == OperationState::Canceled {
                return Err(SessionError::Canceled(self.id));
            }
            return Err(SessionError::InvalidState {
                operation: self.id,
                state: state.as_str(),
            });
        }
        self.listener.statement_finished(self.id);

        // Catalog sync happens after the success transition and before the
        // caller observes completion. A sync failure does not undo the
        // already-finished statement.
        if let Err(err) = catalog_sync::dispatch(
            &command,
            &schema,
            self.session_id,
            &self.pools,
            self.catalog.as_ref(),
            self.engine.as_ref(),
            &self.config,
        )
        .await
        {
            tracing::warn!(
                operation = %self.id,
                error = %err,
                "catalog sync failed after statement success"
            );
        }
        Ok(())
    }

    fn fail(&self, err: EngineError) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state == OperationState::Canceled {
                // cancel() landed before the engine surfaced its failure
                return Err(SessionError::Canceled(self.id));
            }
            if !state.permits(OperationState::Error) {
                // force-closed mid-flight; the late failure does not revive
                // the operation
                return Err(SessionError::Execution(err));
            }
            *state = OperationState::Error;
        }
        self.touch();

        let message = err.to_string();
        let failure = SessionError::Execution(err);
        let trace = format_cause_chain(&failure);
        self.listener.statement_error(self.id, &message, &trace);
        Err(failure)
    }

    /// Best-effort cooperative cancellation; idempotent and safe to call
    /// concurrently with an in-flight `run()`.
    pub async fn cancel(&self) {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return;
            }
            *state = OperationState::Canceled;
        }
        self.touch();
        self.engine.cancel_job(&self.id).await;
        self.listener.statement_canceled(self.id);
    }

    /// Releases the engine-side execution context and the result handle,
    /// then closes. Idempotent; never blocks on engine completion. Safe to
    /// invoke concurrently with the idle reaper or an in-flight fetch.
    pub async fn close(&self) {
        self.engine.release_job(&self.id).await;
        self.transition(OperationState::Closed);
        // a fetch in flight holds the handle; it observes Closed and drops
        // it instead of restoring
        *self.result.lock() = None;
    }

    /// Idle-reaping predicate under the signed timeout policy: zero reaps
    /// unconditionally, positive reaps idle terminal operations, negative
    /// reaps past `|timeout|` regardless of state.
    pub fn is_timed_out(&self, now_ms: u64) -> bool {
        let timeout = self.config.idle_operation_timeout_ms;
        let last = self.last_access_ms();
        match timeout {
            0 => true,
            t if t > 0 => {
                self.state().is_terminal() && last.saturating_add(t as u64) <= now_ms
            }
            t => last.saturating_add(t.unsigned_abs()) <= now_ms,
        }
    }

    /// Pulls up to `max_rows` from the live result. Single-pass: consumed
    /// rows cannot be rewound.
    ///
    /// The handle is taken out of its slot for the duration of the pull, so
    /// no lock is held while waiting on the engine and a concurrent
    /// `close()` stays free to run; a close that lands mid-fetch wins and
    /// the handle is dropped instead of restored.
    pub async fn fetch(&self, max_rows: usize) -> Result<Vec<Row>> {
        let mut result = self
            .result
            .lock()
            .take()
            .ok_or(SessionError::NoResult(self.id))?;
        let mut rows = Vec::new();
        while rows.len() < max_rows {
            match result.rows.next_row().await {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        self.touch();

        let mut slot = self.result.lock();
        if self.state() != OperationState::Closed {
            *slot = Some(result);
        }
        Ok(rows)
    }

    /// Schema of the live result.
    pub fn result_schema(&self) -> Result<Vec<ColumnDesc>> {
        self.result
            .lock()
            .as_ref()
            .map(|r| r.schema.clone())
            .ok_or(SessionError::NoResult(self.id))
    }

    #[cfg(test)]
    pub(crate) fn set_last_access_ms_for_test(&self, ms: u64) {
        self.last_access_ms.store(ms, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn set_state_for_test(&self, state: OperationState) {
        *self.state.lock() = state;
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dashmap::DashMap;
    use serde_json::json;
    use sqlgate_common::{CatalogError, NullListener, ResolvedCommand, TableType};
    use sqlgate_engine::MockEngine;
    use std::time::Duration;
    use tokio::sync::{Notify, mpsc};

    struct NullCatalog;

    #[async_trait]
    impl CatalogMirror for NullCatalog {
        async fn register_database(&self, _: &str) -> std::result::Result<(), CatalogError> {
            Ok(())
        }
        async fn register_table(
            &self,
            _: &str,
            _: &str,
            _: &[ColumnDesc],
            _: TableType,
        ) -> std::result::Result<(), CatalogError> {
            Ok(())
        }
        async fn register_function(&self, _: &str, _: &str) -> std::result::Result<(), CatalogError> {
            Ok(())
        }
        async fn refresh_databases(&self, _: &str) -> std::result::Result<(), CatalogError> {
            Ok(())
        }
        async fn refresh_tables(&self, _: &str) -> std::result::Result<(), CatalogError> {
            Ok(())
        }
        async fn refresh_functions(&self, _: &str) -> std::result::Result<(), CatalogError> {
            Ok(())
        }
    }

    /// Keeps the row channel open after one row, simulating an engine that
    /// has stalled mid-production.
    struct StallingEngine {
        tx: Mutex<Option<mpsc::Sender<Row>>>,
    }

    #[async_trait]
    impl ExecutionEngine for StallingEngine {
        async fn submit(&self, _job: JobSpec) -> sqlgate_engine::Result<ExecutionOutcome> {
            let (tx, rx) = mpsc::channel(16);
            tx.send(vec![json!(1)]).await.ok();
            *self.tx.lock() = Some(tx);
            Ok(ExecutionOutcome {
                plan: "stalling".to_string(),
                command: ResolvedCommand::Other,
                schema: vec![ColumnDesc::new("id", "INT")],
                rows: sqlgate_engine::RowSource::Incremental(rx),
            })
        }

        async fn cancel_job(&self, _: &OperationId) {}

        async fn release_job(&self, _: &OperationId) {}

        async fn resolve_schema(&self, _: &str) -> sqlgate_engine::Result<Vec<ColumnDesc>> {
            Ok(Vec::new())
        }
    }

    /// Holds the submission open until the test releases the gate, then
    /// fails.
    struct GatedEngine {
        gate: Notify,
    }

    #[async_trait]
    impl ExecutionEngine for GatedEngine {
        async fn submit(&self, _job: JobSpec) -> sqlgate_engine::Result<ExecutionOutcome> {
            self.gate.notified().await;
            Err(EngineError::Execution("late failure".into()))
        }

        async fn cancel_job(&self, _: &OperationId) {}

        async fn release_job(&self, _: &OperationId) {}

        async fn resolve_schema(&self, _: &str) -> sqlgate_engine::Result<Vec<ColumnDesc>> {
            Ok(Vec::new())
        }
    }

    fn operation_with_engine(engine: Arc<dyn ExecutionEngine>, statement: &str) -> Operation {
        Operation::new(
            1,
            statement.to_string(),
            false,
            Arc::new(DashMap::new()),
            engine,
            Arc::new(NullCatalog),
            Arc::new(NullListener),
            Arc::new(GatewayConfig::default()),
        )
    }

    fn operation_with_timeout(timeout_ms: i64) -> Operation {
        let config = GatewayConfig {
            idle_operation_timeout_ms: timeout_ms,
            ..GatewayConfig::default()
        };
        Operation::new(
            1,
            "SELECT 1".to_string(),
            false,
            Arc::new(DashMap::new()),
            Arc::new(MockEngine::new()),
            Arc::new(NullCatalog),
            Arc::new(NullListener),
            Arc::new(config),
        )
    }

    #[test]
    fn transition_table_is_monotone() {
        use OperationState::*;
        let all = [
            Initialized, Running, Finished, Canceled, Closed, Error, Pending, Unknown,
        ];

        // closing is reachable from everywhere
        for state in all {
            assert!(state.permits(Closed), "{state:?} -> Closed");
        }
        // terminal states never re-enter a non-terminal state
        for state in [Finished, Canceled, Closed, Error] {
            assert!(state.is_terminal());
            for target in [Initialized, Running, Pending, Unknown] {
                assert!(!state.permits(target), "{state:?} -> {target:?}");
            }
        }
        // reserved tags admit nothing but close
        for state in [Pending, Unknown] {
            for target in [Initialized, Running, Finished, Canceled, Error] {
                assert!(!state.permits(target), "{state:?} -> {target:?}");
            }
        }
        assert!(Initialized.permits(Running));
        assert!(Running.permits(Finished));
        assert!(Running.permits(Canceled));
        assert!(Running.permits(Error));
        assert!(!Finished.permits(Running));
    }

    #[test]
    fn zero_timeout_always_reaps() {
        let op = operation_with_timeout(0);
        assert!(op.is_timed_out(0));
        assert!(op.is_timed_out(u64::MAX));
    }

    #[test]
    fn positive_timeout_requires_terminal_state_and_idleness() {
        let op = operation_with_timeout(1_000);
        op.set_last_access_ms_for_test(10_000);

        // non-terminal: never eligible
        assert!(!op.is_timed_out(20_000));

        op.set_state_for_test(OperationState::Finished);
        assert!(!op.is_timed_out(10_500));
        assert!(op.is_timed_out(11_000));
        assert!(op.is_timed_out(20_000));
    }

    #[test]
    fn negative_timeout_reaps_regardless_of_state() {
        let op = operation_with_timeout(-1_000);
        op.set_last_access_ms_for_test(10_000);
        op.set_state_for_test(OperationState::Running);

        assert!(!op.is_timed_out(10_500));
        assert!(op.is_timed_out(11_000));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let op = operation_with_timeout(1_000);
        op.close().await;
        assert_eq!(op.state(), OperationState::Closed);
        op.close().await;
        op.close().await;
        assert_eq!(op.state(), OperationState::Closed);
    }

    #[tokio::test]
    async fn cancel_is_idempotent_and_respects_terminal_states() {
        let op = operation_with_timeout(1_000);
        op.cancel().await;
        assert_eq!(op.state(), OperationState::Canceled);
        op.cancel().await;
        assert_eq!(op.state(), OperationState::Canceled);

        let finished = operation_with_timeout(1_000);
        finished.set_state_for_test(OperationState::Finished);
        finished.cancel().await;
        assert_eq!(finished.state(), OperationState::Finished);
    }

    #[tokio::test]
    async fn close_does_not_wait_for_a_stalled_fetch() {
        let engine = Arc::new(StallingEngine {
            tx: Mutex::new(None),
        });
        let op = Arc::new(operation_with_engine(engine.clone(), "SELECT id FROM t"));
        op.run().await.unwrap();

        let fetching = op.clone();
        let pull = tokio::spawn(async move { fetching.fetch(10).await });
        // the fetch drains the first row, then parks on the open channel
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(1), op.close())
            .await
            .expect("close must not wait on engine progress");
        assert_eq!(op.state(), OperationState::Closed);

        // ending the stall lets the parked fetch return what it drained
        engine.tx.lock().take();
        let rows = pull.await.unwrap().unwrap();
        assert_eq!(rows, vec![vec![json!(1)]]);

        // the handle went down with the close; nothing is restored
        assert!(matches!(op.fetch(1).await, Err(SessionError::NoResult(_))));
    }

    #[tokio::test]
    async fn late_engine_failure_leaves_a_closed_operation_closed() {
        let engine = Arc::new(GatedEngine {
            gate: Notify::new(),
        });
        let op = Arc::new(operation_with_engine(engine.clone(), "SELECT 1"));

        let running = op.clone();
        let handle = tokio::spawn(async move { running.run().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(op.state(), OperationState::Running);

        // force-close while the engine still holds the job
        op.close().await;
        assert_eq!(op.state(), OperationState::Closed);

        engine.gate.notify_one();
        let result = handle.await.unwrap();
        assert!(matches!(
            result,
            Err(SessionError::Execution(EngineError::Execution(_)))
        ));
        assert_eq!(op.state(), OperationState::Closed);
    }

    #[tokio::test]
    async fn run_after_cancel_reports_cancellation() {
        let op = operation_with_timeout(1_000);
        op.cancel().await;
        let result = op.run().await;
        assert!(matches!(result, Err(SessionError::Canceled(_))));
        assert_eq!(op.state(), OperationState::Canceled);
    }
}
