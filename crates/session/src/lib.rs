//! Session and statement lifecycle management for a distributed SQL engine
//!
//! This crate sits between a wire-facing front end and an execution engine
//! it does not implement. It accepts statements on behalf of client
//! sessions, drives each one through a bounded-state lifecycle with
//! mid-flight cancellation and idle reaping, routes statements to scheduler
//! pools, and mirrors successful schema-changing statements into an external
//! catalog.
//!
//! The pieces:
//! - [`Operation`]: per-statement state machine and execution driver
//! - [`SessionRegistry`] / [`OperationRegistry`]: concurrent id-keyed
//!   registries, the latter hosting the idle reaper
//! - [`SessionManager`]: the composite open/execute/close service
//! - [`catalog_sync`]: the post-success DDL dispatch table

pub mod auth;
pub mod catalog_sync;
pub mod error;
pub mod manager;
pub mod operation;
pub mod operations;
pub mod service;
pub mod session;

pub use auth::{AcceptAll, Authenticator};
pub use error::{Result, SessionError, format_cause_chain};
pub use manager::SessionManager;
pub use operation::{Operation, OperationState};
pub use operations::OperationRegistry;
pub use service::Service;
pub use session::{ActivePools, Session, SessionRegistry, SessionState};
