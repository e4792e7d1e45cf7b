//! Credential validation seam.
//!
//! Real deployments delegate to the platform security layer; the gateway
//! only carries the verdict.

use crate::error::Result;

/// Validates credentials at session open.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, user: &str, credential: &str, address: &str) -> Result<()>;
}

/// Accepts every credential. The default for embedded and test use.
pub struct AcceptAll;

impl Authenticator for AcceptAll {
    fn authenticate(&self, _user: &str, _credential: &str, _address: &str) -> Result<()> {
        Ok(())
    }
}
