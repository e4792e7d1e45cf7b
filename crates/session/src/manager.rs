//! Composite session/operation manager.
//!
//! Owns the session and operation registries, wires every operation to the
//! injected engine, catalog mirror, and event listener, and exposes the
//! open/execute/close contract the wire front end drives.

use dashmap::DashMap;
use sqlgate_common::{
    CatalogMirror, EventListener, GatewayConfig, OperationId, SessionId, TracingListener,
};
use sqlgate_engine::ExecutionEngine;
use std::sync::Arc;

use crate::auth::{AcceptAll, Authenticator};
use crate::error::Result;
use crate::operation::Operation;
use crate::operations::OperationRegistry;
use crate::service::Service;
use crate::session::{ActivePools, SessionRegistry, SessionState};

/// Composite lifecycle service hosting sessions and their operations.
pub struct SessionManager {
    sessions: Arc<SessionRegistry>,
    operations: Arc<OperationRegistry>,
    pools: ActivePools,
    engine: Arc<dyn ExecutionEngine>,
    catalog: Arc<dyn CatalogMirror>,
    listener: Arc<dyn EventListener>,
    authenticator: Arc<dyn Authenticator>,
    config: Arc<GatewayConfig>,
    /// Started in order, stopped in reverse: the operation registry never
    /// outlives the session registry it references.
    components: Vec<Arc<dyn Service>>,
}

impl SessionManager {
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        catalog: Arc<dyn CatalogMirror>,
        config: GatewayConfig,
    ) -> Self {
        Self::with_collaborators(
            engine,
            catalog,
            Arc::new(TracingListener),
            Arc::new(AcceptAll),
            config,
        )
    }

    pub fn with_collaborators(
        engine: Arc<dyn ExecutionEngine>,
        catalog: Arc<dyn CatalogMirror>,
        listener: Arc<dyn EventListener>,
        authenticator: Arc<dyn Authenticator>,
        config: GatewayConfig,
    ) -> Self {
        let config = Arc::new(config);
        let sessions = Arc::new(SessionRegistry::new());
        let operations = Arc::new(OperationRegistry::new(config.clone(), sessions.clone()));
        let components: Vec<Arc<dyn Service>> = vec![sessions.clone(), operations.clone()];
        Self {
            sessions,
            operations,
            pools: Arc::new(DashMap::new()),
            engine,
            catalog,
            listener,
            authenticator,
            config,
            components,
        }
    }

    /// Starts sub-components in dependency order.
    pub async fn start(&self) -> Result<()> {
        for component in &self.components {
            component.start().await?;
            tracing::debug!(component = component.name(), "started");
        }
        Ok(())
    }

    /// Stops sub-components in reverse order.
    pub async fn stop(&self) -> Result<()> {
        for component in self.components.iter().rev() {
            component.stop().await?;
            tracing::debug!(component = component.name(), "stopped");
        }
        Ok(())
    }

    /// Opens a session after delegated credential validation.
    pub fn open_session(
        &self,
        user: &str,
        credential: &str,
        address: &str,
        database: &str,
    ) -> Result<SessionId> {
        self.authenticator.authenticate(user, credential, address)?;
        let session = self.sessions.create(user, database, address);
        tracing::info!(session = session.id, user, database, "session opened");
        Ok(session.id)
    }

    pub fn get_session_state(&self, id: SessionId) -> Result<SessionState> {
        let session = self.sessions.get(id)?;
        Ok(SessionState {
            id: session.id,
            user: session.user.clone(),
            database: session.database.clone(),
            pool: self.pools.get(&id).map(|entry| entry.value().clone()),
            open_operations: self.operations.count_for_session(id),
        })
    }

    /// Closes and discards every operation of the session, then removes the
    /// session record. A second close of the same id fails with
    /// `SessionNotFound`.
    pub async fn close_session(&self, id: SessionId) -> Result<()> {
        let session = self.sessions.remove(id)?;
        // an execute_statement that resolved the session before this removal
        // can still insert behind the first pass; sweep until nothing is
        // left for the id (the idle reaper also collects such orphans)
        loop {
            let ops = self.operations.for_session(id);
            if ops.is_empty() {
                break;
            }
            for op in ops {
                op.close().await;
                self.operations.remove(op.id());
            }
        }
        self.pools.remove(&id);
        tracing::info!(session = session.id, "session closed");
        Ok(())
    }

    /// Builds and registers an operation bound to the session and the shared
    /// pool mapping. The caller decides when to `run()` it -- a front end
    /// typically registers the id for cancellation lookup first.
    pub fn execute_statement(
        &self,
        session_id: SessionId,
        statement: &str,
        is_cursor: bool,
    ) -> Result<Arc<Operation>> {
        let session = self.sessions.get(session_id)?;
        let operation = Arc::new(Operation::new(
            session.id,
            statement.to_string(),
            is_cursor,
            self.pools.clone(),
            self.engine.clone(),
            self.catalog.clone(),
            self.listener.clone(),
            self.config.clone(),
        ));
        self.operations.insert(operation.clone());
        Ok(operation)
    }

    pub fn get_operation(&self, id: OperationId) -> Result<Arc<Operation>> {
        self.operations.get(id)
    }

    /// Cancellation lookup surface for the wire front end.
    pub async fn cancel_operation(&self, id: OperationId) -> Result<()> {
        self.operations.get(id)?.cancel().await;
        Ok(())
    }

    /// Current scheduler pool of a session, if one was assigned.
    pub fn active_pool(&self, session: SessionId) -> Option<String> {
        self.pools.get(&session).map(|entry| entry.value().clone())
    }

    /// Deterministic entry point for the idle sweep; the background task
    /// started by [`start`](Self::start) runs the same logic on an interval.
    pub async fn reap_idle(&self, now_ms: u64) -> usize {
        self.operations.reap_idle(now_ms).await
    }
}
