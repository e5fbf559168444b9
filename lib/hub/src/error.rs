//! Error types for the hub crate.

use polylink_gateway::GatewayError;
use polylink_vault::VaultError;
use std::fmt;

/// Error raised while building or using the integration context.
#[derive(Debug)]
pub enum HubError {
    /// Configuration was missing or invalid.
    Config {
        /// What was wrong.
        reason: String,
    },
    /// The vault could not be opened or used.
    Vault(VaultError),
    /// No adapter is registered for the requested platform.
    AdapterNotFound {
        /// The platform that was requested.
        platform: String,
    },
}

impl fmt::Display for HubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "invalid configuration: {reason}"),
            Self::Vault(e) => write!(f, "vault error: {e}"),
            Self::AdapterNotFound { platform } => {
                write!(f, "no adapter registered for platform {platform:?}")
            }
        }
    }
}

impl std::error::Error for HubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Vault(e) => Some(e),
            _ => None,
        }
    }
}

impl From<VaultError> for HubError {
    fn from(e: VaultError) -> Self {
        Self::Vault(e)
    }
}

impl From<config::ConfigError> for HubError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config {
            reason: e.to_string(),
        }
    }
}

/// Error returned by a platform adapter operation.
#[derive(Debug)]
pub enum AdapterError {
    /// Credential lookup or refresh failed.
    Vault(VaultError),
    /// The outbound call was rejected or exhausted by the gateway.
    Gateway(GatewayError),
    /// The operation itself failed on the adapter side.
    Operation {
        /// What went wrong.
        reason: String,
    },
}

impl AdapterError {
    /// Creates an operation-level failure.
    #[must_use]
    pub fn operation(reason: impl Into<String>) -> Self {
        Self::Operation {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vault(e) => write!(f, "credential error: {e}"),
            Self::Gateway(e) => write!(f, "gateway error: {e}"),
            Self::Operation { reason } => write!(f, "operation failed: {reason}"),
        }
    }
}

impl std::error::Error for AdapterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Vault(e) => Some(e),
            Self::Gateway(e) => Some(e),
            Self::Operation { .. } => None,
        }
    }
}

impl From<VaultError> for AdapterError {
    fn from(e: VaultError) -> Self {
        Self::Vault(e)
    }
}

impl From<GatewayError> for AdapterError {
    fn from(e: GatewayError) -> Self {
        Self::Gateway(e)
    }
}
