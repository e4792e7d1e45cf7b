//! Catalog mirror contract.

use crate::types::ColumnDesc;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How a registered relation is backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableType {
    Managed,
    External,
    View,
}

/// Catalog mirror error surface.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog mirror unavailable: {0}")]
    Unavailable(String),

    #[error("catalog rejected {object}: {reason}")]
    Rejected { object: String, reason: String },
}

/// External metadata store kept in sync with successful schema-changing
/// statements.
///
/// Calls are synchronous fire-and-forget from the statement success path;
/// ordering across sessions is the store's own concern.
#[async_trait]
pub trait CatalogMirror: Send + Sync {
    async fn register_database(&self, name: &str) -> Result<(), CatalogError>;

    async fn register_table(
        &self,
        database: &str,
        table: &str,
        schema: &[ColumnDesc],
        table_type: TableType,
    ) -> Result<(), CatalogError>;

    async fn register_function(&self, database: &str, name: &str) -> Result<(), CatalogError>;

    async fn refresh_databases(&self, database: &str) -> Result<(), CatalogError>;

    async fn refresh_tables(&self, database: &str) -> Result<(), CatalogError>;

    async fn refresh_functions(&self, database: &str) -> Result<(), CatalogError>;
}
