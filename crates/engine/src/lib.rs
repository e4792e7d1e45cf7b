//! Execution engine contract for the sqlgate session layer
//!
//! The gateway does not parse, plan, or execute SQL; it drives the
//! [`ExecutionEngine`] trait and reacts to the outcome. [`MockEngine`] is a
//! scriptable in-process implementation used by tests and demos.

mod error;
mod job;
mod mock;

pub use error::{EngineError, Result};
pub use job::{ExecutionEngine, ExecutionOutcome, JobSpec, RowSource};
pub use mock::{MockEngine, Script, SubmittedJob};
