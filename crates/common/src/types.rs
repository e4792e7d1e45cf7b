//! Row and schema types exchanged with the engine and the catalog mirror

use serde::{Deserialize, Serialize};

/// A single result row. Values are engine-typed JSON scalars; the gateway
/// never interprets them, it only buffers or forwards them.
pub type Row = Vec<serde_json::Value>;

/// One column of a result or table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDesc {
    pub name: String,
    pub data_type: String,
}

impl ColumnDesc {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}
