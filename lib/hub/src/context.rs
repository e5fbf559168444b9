//! The integration context.
//!
//! One explicitly constructed object owns the vault, gateway, bus, and
//! webhook receiver. Adapters receive it on every call; nothing in the
//! system reaches these components through globals.

use crate::adapter::{AdapterRegistry, Operation, OperationResult};
use crate::config::{BackendKind, HubConfig};
use crate::error::{AdapterError, HubError};
use polylink_bus::EventBus;
use polylink_gateway::RequestGateway;
use polylink_vault::{CredentialVault, EncryptionKey, VaultBackend};
use polylink_webhook::WebhookReceiver;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Owns every shared component of the integration platform.
pub struct IntegrationContext {
    /// Encrypted credential storage.
    pub vault: Arc<CredentialVault>,
    /// Rate-limited outbound request gateway.
    pub gateway: Arc<RequestGateway>,
    /// Priority event bus.
    pub bus: Arc<EventBus>,
    /// Inbound webhook receiver, publishing onto `bus`.
    pub receiver: Arc<WebhookReceiver>,
    /// Registered platform adapters.
    pub adapters: AdapterRegistry,
}

impl fmt::Debug for IntegrationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationContext")
            .field("adapters", &self.adapters.platforms())
            .finish_non_exhaustive()
    }
}

impl IntegrationContext {
    /// Builds the context from configuration.
    ///
    /// The vault backend is resolved here, once. The encrypted-file
    /// backend requires `vault.key_hex`; the keychain backend uses
    /// `vault.keychain_service`.
    ///
    /// # Errors
    ///
    /// Returns `HubError::Config` for missing or invalid key material and
    /// `HubError::Vault` if the vault cannot be opened.
    pub fn init(config: &HubConfig) -> Result<Self, HubError> {
        let backend = match config.vault.backend {
            BackendKind::EncryptedFile => {
                let key_hex =
                    config
                        .vault
                        .key_hex
                        .as_deref()
                        .ok_or_else(|| HubError::Config {
                            reason: "vault.key_hex is required for the encrypted_file backend"
                                .to_string(),
                        })?;
                let key = EncryptionKey::from_hex(key_hex)?;
                VaultBackend::EncryptedFile(key)
            }
            BackendKind::Keychain => VaultBackend::Keychain {
                service: config.vault.keychain_service.clone(),
            },
        };

        let vault = Arc::new(CredentialVault::open(&config.vault.dir, backend)?);
        vault.set_auto_refresh(config.vault.auto_refresh);
        let gateway = Arc::new(RequestGateway::new((&config.gateway).into()));
        let bus = Arc::new(EventBus::new());
        let receiver = Arc::new(WebhookReceiver::new(bus.clone()));

        info!(
            backend = ?config.vault.backend,
            vault_dir = %config.vault.dir.display(),
            "integration context initialized"
        );

        Ok(Self {
            vault,
            gateway,
            bus,
            receiver,
            adapters: AdapterRegistry::new(),
        })
    }

    /// Routes an operation to the adapter registered for `platform`.
    ///
    /// # Errors
    ///
    /// Returns `AdapterError::Operation` when the platform has no adapter,
    /// otherwise whatever the adapter returns.
    pub async fn execute(
        &self,
        platform: &str,
        operation: Operation,
    ) -> Result<OperationResult, AdapterError> {
        let adapter = self
            .adapters
            .get(platform)
            .map_err(|e| AdapterError::operation(e.to_string()))?;
        adapter.execute(self, operation).await
    }

    /// Flushes the bus and logs shutdown. Queued events that are not
    /// drained here are lost; the bus is memory-resident only.
    pub async fn shutdown(&self) {
        let delivered = self.bus.drain().await;
        info!(delivered, "integration context shut down");
    }
}
