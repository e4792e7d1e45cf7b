//! Statement lifecycle event listener seam.

use crate::ids::{OperationId, SessionId};

/// Observer for statement lifecycle events.
///
/// An implementation is injected into the manager and every operation at
/// construction time; there is no process-wide listener. Consumers must
/// tolerate events arriving for operations they never explicitly polled.
pub trait EventListener: Send + Sync {
    fn statement_started(&self, operation: OperationId, session: SessionId, statement: &str);
    fn statement_parsed(&self, operation: OperationId, plan: &str);
    fn statement_canceled(&self, operation: OperationId);
    fn statement_finished(&self, operation: OperationId);
    fn statement_error(&self, operation: OperationId, message: &str, trace: &str);
}

/// Forwards every lifecycle event to `tracing`. The default listener.
pub struct TracingListener;

impl EventListener for TracingListener {
    fn statement_started(&self, operation: OperationId, session: SessionId, statement: &str) {
        tracing::info!(%operation, session, statement, "statement started");
    }

    fn statement_parsed(&self, operation: OperationId, plan: &str) {
        tracing::debug!(%operation, plan, "statement parsed");
    }

    fn statement_canceled(&self, operation: OperationId) {
        tracing::info!(%operation, "statement canceled");
    }

    fn statement_finished(&self, operation: OperationId) {
        tracing::info!(%operation, "statement finished");
    }

    fn statement_error(&self, operation: OperationId, message: &str, trace: &str) {
        tracing::error!(%operation, message, trace, "statement failed");
    }
}

/// Drops every event.
pub struct NullListener;

impl EventListener for NullListener {
    fn statement_started(&self, _: OperationId, _: SessionId, _: &str) {}
    fn statement_parsed(&self, _: OperationId, _: &str) {}
    fn statement_canceled(&self, _: OperationId) {}
    fn statement_finished(&self, _: OperationId) {}
    fn statement_error(&self, _: OperationId, _: &str, _: &str) {}
}
