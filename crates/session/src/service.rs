//! Ordered start/stop of manager sub-components.

use crate::error::Result;
use async_trait::async_trait;

/// A startable/stoppable sub-component of the session manager.
///
/// The manager holds its components as an explicit ordered list, started in
/// declaration order and stopped in reverse, so a later component may rely
/// on every earlier one for its whole lifetime.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &'static str;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}
