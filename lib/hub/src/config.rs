//! Strongly-typed hub configuration.
//!
//! Loaded via the `config` crate from an optional file plus
//! `POLYLINK_`-prefixed environment variables, e.g.
//! `POLYLINK_VAULT__KEY_HEX` or `POLYLINK_GATEWAY__CAPACITY`.

use polylink_gateway::GatewayConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for the integration context.
#[derive(Debug, Default, Deserialize)]
pub struct HubConfig {
    /// Credential vault settings.
    #[serde(default)]
    pub vault: VaultSettings,

    /// Default rate-limit and circuit-breaker settings.
    #[serde(default)]
    pub gateway: GatewaySettings,
}

/// Which storage backend the vault uses. Resolved once when the context
/// is built; there is no runtime backend switching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// AES-256-GCM encrypted files under `vault.dir`.
    EncryptedFile,
    /// The operating system keychain.
    Keychain,
}

/// Vault configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VaultSettings {
    /// Directory for vault state.
    #[serde(default = "default_vault_dir")]
    pub dir: PathBuf,

    /// Storage backend.
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Hex-encoded 32-byte master key. Required for the encrypted-file
    /// backend.
    #[serde(default)]
    pub key_hex: Option<String>,

    /// Keychain service name. Used by the keychain backend.
    #[serde(default = "default_keychain_service")]
    pub keychain_service: String,

    /// Whether `get` refreshes expired secrets transparently.
    #[serde(default = "default_auto_refresh")]
    pub auto_refresh: bool,
}

fn default_vault_dir() -> PathBuf {
    PathBuf::from("./vault")
}

fn default_backend() -> BackendKind {
    BackendKind::EncryptedFile
}

fn default_keychain_service() -> String {
    "polylink".to_string()
}

fn default_auto_refresh() -> bool {
    true
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            dir: default_vault_dir(),
            backend: default_backend(),
            key_hex: None,
            keychain_service: default_keychain_service(),
            auto_refresh: default_auto_refresh(),
        }
    }
}

/// Gateway configuration, in plain units the `config` crate can parse
/// from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewaySettings {
    /// Maximum tokens per endpoint bucket.
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Refill rate in tokens per second.
    #[serde(default = "default_refill_per_sec")]
    pub refill_per_sec: f64,

    /// Longest admission wait in milliseconds.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Consecutive failures that trip the circuit.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// First-cooldown duration in milliseconds.
    #[serde(default = "default_base_cooldown_ms")]
    pub base_cooldown_ms: u64,

    /// Cooldown growth cap in milliseconds.
    #[serde(default = "default_max_cooldown_ms")]
    pub max_cooldown_ms: u64,

    /// Internal retries for transient transport errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Apply forecast spacing during admission.
    #[serde(default)]
    pub proactive_pacing: bool,
}

fn default_capacity() -> u32 {
    60
}

fn default_refill_per_sec() -> f64 {
    1.0
}

fn default_max_wait_ms() -> u64 {
    10_000
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_base_cooldown_ms() -> u64 {
    1_000
}

fn default_max_cooldown_ms() -> u64 {
    60_000
}

fn default_max_retries() -> u32 {
    3
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_per_sec: default_refill_per_sec(),
            max_wait_ms: default_max_wait_ms(),
            failure_threshold: default_failure_threshold(),
            base_cooldown_ms: default_base_cooldown_ms(),
            max_cooldown_ms: default_max_cooldown_ms(),
            max_retries: default_max_retries(),
            proactive_pacing: false,
        }
    }
}

impl From<&GatewaySettings> for GatewayConfig {
    fn from(settings: &GatewaySettings) -> Self {
        Self {
            capacity: settings.capacity,
            refill_per_sec: settings.refill_per_sec,
            max_wait: Duration::from_millis(settings.max_wait_ms),
            failure_threshold: settings.failure_threshold,
            base_cooldown: Duration::from_millis(settings.base_cooldown_ms),
            max_cooldown: Duration::from_millis(settings.max_cooldown_ms),
            max_retries: settings.max_retries,
            proactive_pacing: settings.proactive_pacing,
            ..Self::default()
        }
    }
}

impl HubConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment holds values of the wrong type.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::with_prefix("POLYLINK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Loads configuration from a file, with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a value has the
    /// wrong type.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("POLYLINK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
