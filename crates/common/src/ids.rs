//! Identifier types shared across the workspace

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique integer id of a client session, allocated by the session registry.
pub type SessionId = u64;

/// Opaque unique identifier for one submitted statement.
///
/// Generated once at operation construction and stable for the operation's
/// life. It also names the engine-side unit of work, so external cancellation
/// APIs can target the running statement by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_ids_are_unique_and_stable() {
        let a = OperationId::new();
        let b = OperationId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string(), a.to_string());
    }
}
