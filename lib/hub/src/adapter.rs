//! Platform adapter trait and registry.
//!
//! Every platform integration implements [`PlatformAdapter`] and is
//! registered explicitly at startup. The registry is the only way the
//! rest of the system reaches an adapter.

use crate::context::IntegrationContext;
use crate::error::{AdapterError, HubError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Capabilities a platform adapter may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterCapability {
    /// Can read data from the platform.
    Read,
    /// Can write data to the platform.
    Write,
    /// Can update existing data.
    Update,
    /// Can delete data.
    Delete,
    /// Sends webhooks that the receiver can verify.
    Webhooks,
    /// Issues refreshable OAuth tokens.
    TokenRefresh,
}

/// An operation request against a platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// The operation name, e.g. `create_issue`.
    pub name: String,
    /// The endpoint key used for rate limiting, e.g. `github:/repos`.
    pub endpoint: String,
    /// Operation parameters.
    pub parameters: JsonValue,
}

impl Operation {
    /// Creates a new operation against an endpoint.
    #[must_use]
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            parameters: JsonValue::Object(Default::default()),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        if let JsonValue::Object(ref mut map) = self.parameters {
            map.insert(key.into(), value);
        }
        self
    }
}

/// The result of a successful adapter operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    /// Output data.
    pub data: JsonValue,
    /// Number of outbound calls the operation made.
    pub api_calls: u32,
}

impl OperationResult {
    /// Creates a result carrying output data.
    #[must_use]
    pub fn new(data: JsonValue, api_calls: u32) -> Self {
        Self { data, api_calls }
    }
}

/// Trait for platform integrations.
///
/// Adapters receive the [`IntegrationContext`] on every call and use its
/// vault for credentials and its gateway for outbound requests. They hold
/// no global state.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    /// The platform this adapter serves, e.g. `github`.
    fn platform(&self) -> &str;

    /// The capabilities this adapter supports.
    fn capabilities(&self) -> Vec<AdapterCapability>;

    /// Executes an operation.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials, rate limiting, or the operation
    /// itself fail.
    async fn execute(
        &self,
        ctx: &IntegrationContext,
        operation: Operation,
    ) -> Result<OperationResult, AdapterError>;

    /// Whether this adapter supports a specific capability.
    fn supports(&self, capability: AdapterCapability) -> bool {
        self.capabilities().contains(&capability)
    }
}

/// Registry of compiled-in platform adapters.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn PlatformAdapter>>>,
}

impl AdapterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its platform name. Re-registering a
    /// platform replaces the previous adapter.
    pub fn register(&self, adapter: Arc<dyn PlatformAdapter>) {
        let platform = adapter.platform().to_string();
        let replaced = self
            .adapters
            .write()
            .expect("registry lock poisoned")
            .insert(platform.clone(), adapter)
            .is_some();
        if replaced {
            warn!(platform = %platform, "adapter replaced");
        } else {
            info!(platform = %platform, "adapter registered");
        }
    }

    /// Looks up the adapter for a platform.
    ///
    /// # Errors
    ///
    /// Returns `AdapterNotFound` if no adapter is registered.
    pub fn get(&self, platform: &str) -> Result<Arc<dyn PlatformAdapter>, HubError> {
        self.adapters
            .read()
            .expect("registry lock poisoned")
            .get(platform)
            .cloned()
            .ok_or_else(|| HubError::AdapterNotFound {
                platform: platform.to_string(),
            })
    }

    /// Registered platform names, sorted.
    #[must_use]
    pub fn platforms(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .adapters
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
