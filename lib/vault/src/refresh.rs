//! Refresh handler contract.
//!
//! Hosts register one handler per platform. The vault invokes it when a
//! `get` finds an expired secret, holding a per-key lock so at most one
//! refresh is in flight per platform key.

use async_trait::async_trait;
use std::fmt;

/// The result of a successful refresh call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedSecret {
    /// The new access token.
    pub access_token: String,
    /// A replacement refresh token, if the platform rotated it.
    pub refresh_token: Option<String>,
    /// Lifetime of the new access token.
    pub expires_in_seconds: u64,
}

/// Error returned by a refresh handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshError {
    /// Why the refresh failed.
    pub reason: String,
}

impl RefreshError {
    /// Creates a refresh error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "refresh handler failed: {}", self.reason)
    }
}

impl std::error::Error for RefreshError {}

/// Exchanges refresh material for a new access token.
#[async_trait]
pub trait RefreshHandler: Send + Sync {
    /// Performs the refresh network call.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the refresh; the vault
    /// surfaces it as `RefreshFailed` and never returns the stale secret.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedSecret, RefreshError>;
}
