//! Shared vocabulary for the sqlgate session layer
//!
//! This crate defines:
//! - Identifier types for sessions and operations
//! - Row and schema types exchanged with the engine and the catalog mirror
//! - The statement-shape recognizer used for scheduling and catalog sync
//! - The gateway configuration surface
//! - Contracts of the outbound collaborators (catalog mirror, event listener)

pub mod catalog;
pub mod command;
pub mod config;
pub mod events;
pub mod ids;
pub mod types;

pub use catalog::{CatalogError, CatalogMirror, TableType};
pub use command::{QueryType, ResolvedCommand};
pub use config::GatewayConfig;
pub use events::{EventListener, NullListener, TracingListener};
pub use ids::{OperationId, SessionId};
pub use types::{ColumnDesc, Row};
