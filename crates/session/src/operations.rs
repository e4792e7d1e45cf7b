//! Operation registry and idle reaper.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use sqlgate_common::{GatewayConfig, OperationId, SessionId};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::error::{Result, SessionError};
use crate::operation::{Operation, now_ms};
use crate::service::Service;
use crate::session::SessionRegistry;

type Operations = Arc<DashMap<OperationId, Arc<Operation>>>;

/// Concurrent registry of live operations, swept by the idle reaper.
pub struct OperationRegistry {
    operations: Operations,
    sessions: Arc<SessionRegistry>,
    config: Arc<GatewayConfig>,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl OperationRegistry {
    pub fn new(config: Arc<GatewayConfig>, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            operations: Arc::new(DashMap::new()),
            sessions,
            config,
            reaper: Mutex::new(None),
        }
    }

    pub fn insert(&self, operation: Arc<Operation>) {
        self.operations.insert(operation.id(), operation);
    }

    pub fn get(&self, id: OperationId) -> Result<Arc<Operation>> {
        self.operations
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(SessionError::OperationNotFound(id))
    }

    pub fn remove(&self, id: OperationId) -> Option<Arc<Operation>> {
        self.operations.remove(&id).map(|(_, op)| op)
    }

    /// All operations belonging to one session.
    pub fn for_session(&self, session: SessionId) -> Vec<Arc<Operation>> {
        self.operations
            .iter()
            .filter(|entry| entry.value().session_id() == session)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn count_for_session(&self, session: SessionId) -> usize {
        self.operations
            .iter()
            .filter(|entry| entry.value().session_id() == session)
            .count()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// One sweep of the idle reaper: closes and drops every operation whose
    /// timeout policy holds at `now_ms`. Returns the number reaped. The
    /// background task started by [`Service::start`] runs this on an
    /// interval; tests call it directly.
    pub async fn reap_idle(&self, now_ms: u64) -> usize {
        sweep(&self.operations, &self.sessions, now_ms).await
    }
}

async fn sweep(operations: &Operations, sessions: &SessionRegistry, now_ms: u64) -> usize {
    // clone out first: close() awaits, and map references must not be held
    // across an await. An operation whose session is gone was inserted by an
    // execute that raced the session close; it is collected regardless of
    // idleness.
    let expired: Vec<Arc<Operation>> = operations
        .iter()
        .filter(|entry| {
            let op = entry.value();
            op.is_timed_out(now_ms) || !sessions.contains(op.session_id())
        })
        .map(|entry| entry.value().clone())
        .collect();

    let mut reaped = 0;
    for op in expired {
        tracing::info!(operation = %op.id(), state = op.state().as_str(), "reaping idle operation");
        op.close().await;
        operations.remove(&op.id());
        reaped += 1;
    }
    reaped
}

#[async_trait]
impl Service for OperationRegistry {
    fn name(&self) -> &'static str {
        "operation-registry"
    }

    async fn start(&self) -> Result<()> {
        let operations = self.operations.clone();
        let sessions = self.sessions.clone();
        let interval = self.config.reap_interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // the first tick fires immediately; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let reaped = sweep(&operations, &sessions, now_ms()).await;
                if reaped > 0 {
                    tracing::debug!(reaped, "idle sweep finished");
                }
            }
        });
        *self.reaper.lock() = Some(task);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let task = self.reaper.lock().take();
        if let Some(task) = task {
            task.abort();
            let _ = task.await;
        }

        // release engine context for whatever is left
        let remaining: Vec<Arc<Operation>> = self
            .operations
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for op in remaining {
            op.close().await;
        }
        self.operations.clear();
        Ok(())
    }
}

impl Drop for OperationRegistry {
    fn drop(&mut self) {
        if let Some(task) = self.reaper.lock().take() {
            task.abort();
        }
    }
}
