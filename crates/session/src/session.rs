//! Session records and registry.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use sqlgate_common::SessionId;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, SessionError};
use crate::operation::now_ms;
use crate::service::Service;

/// Session id to scheduler pool, shared across every concurrent statement of
/// one session. Written only by the recognized pool-setting statement, read
/// before every dispatch.
pub type ActivePools = Arc<DashMap<SessionId, String>>;

/// A client connection's durable context.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub user: String,
    pub database: String,
    pub address: String,
    pub created_at_ms: u64,
}

/// Point-in-time snapshot of a session, returned to the front end.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub id: SessionId,
    pub user: String,
    pub database: String,
    pub pool: Option<String>,
    pub open_operations: usize,
}

/// Concurrent session registry with monotonically allocated ids.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn create(&self, user: &str, database: &str, address: &str) -> Arc<Session> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session {
            id,
            user: user.to_string(),
            database: database.to_string(),
            address: address.to_string(),
            created_at_ms: now_ms(),
        });
        self.sessions.insert(id, session.clone());
        session
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn get(&self, id: SessionId) -> Result<Arc<Session>> {
        self.sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(SessionError::SessionNotFound(id))
    }

    /// Removes and returns the session. A miss is an error so that a double
    /// close surfaces protocol misuse instead of succeeding silently.
    pub fn remove(&self, id: SessionId) -> Result<Arc<Session>> {
        self.sessions
            .remove(&id)
            .map(|(_, session)| session)
            .ok_or(SessionError::SessionNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Service for SessionRegistry {
    fn name(&self) -> &'static str {
        "session-registry"
    }

    async fn start(&self) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.sessions.clear();
        Ok(())
    }
}
