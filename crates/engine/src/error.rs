//! Engine error surface

use thiserror::Error;

/// Failure reported by the execution engine for a submitted job.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The named job was canceled before it produced a result.
    #[error("job canceled")]
    Canceled,

    #[error("statement rejected: {0}")]
    InvalidStatement(String),

    #[error("execution failed: {0}")]
    Execution(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
