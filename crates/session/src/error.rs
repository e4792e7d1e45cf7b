//! Error taxonomy of the session layer.
//!
//! Nothing here is retried automatically; retry policy, if any, belongs to
//! the front end. Idle reaping is administrative and produces no
//! client-visible error at all.

use sqlgate_common::{OperationId, SessionId};
use sqlgate_engine::EngineError;
use thiserror::Error;

/// Session layer error types.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session open rejected by the external credential check.
    #[error("authentication failed for {user}: {reason}")]
    AuthenticationFailed { user: String, reason: String },

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("operation not found: {0}")]
    OperationNotFound(OperationId),

    /// The statement was canceled while running. Distinct from a generic
    /// execution failure so front ends can render "query cancelled" rather
    /// than a server error.
    #[error("statement canceled: {0}")]
    Canceled(OperationId),

    /// The engine reported a genuine failure. The original error is
    /// preserved as the source, never wrapped away.
    #[error("statement execution failed: {0}")]
    Execution(#[from] EngineError),

    /// Fetch on an operation with no live result handle.
    #[error("no live result for operation {0}")]
    NoResult(OperationId),

    /// The operation is in a state that does not admit the request.
    #[error("operation {operation} is {state}")]
    InvalidState {
        operation: OperationId,
        state: &'static str,
    },
}

/// Result type for session layer operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Renders an error and its source chain, outermost first.
pub fn format_cause_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str("\ncaused by: ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
