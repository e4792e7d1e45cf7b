//! Gateway configuration surface

use serde::Deserialize;
use std::time::Duration;

/// Configuration consumed by the session layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Signed idle-reap policy, in milliseconds. Zero reaps every operation
    /// on sight; a positive value reaps terminal operations idle past the
    /// threshold; a negative value reaps past `|value|` regardless of state,
    /// which forcibly collects stuck operations.
    pub idle_operation_timeout_ms: i64,

    /// Lazy pull-driven row production instead of eager materialization.
    pub incremental_collect: bool,

    /// Statement key recognized as a scheduler-pool assignment.
    pub pool_setting_key: String,

    /// Database used when a DDL statement omits the qualifier.
    pub default_database: String,

    /// Cadence of the idle-operation sweep.
    pub reap_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            idle_operation_timeout_ms: 3_600_000,
            incremental_collect: false,
            pool_setting_key: "scheduler.pool".to_string(),
            default_database: "default".to_string(),
            reap_interval: Duration::from_secs(60),
        }
    }
}
