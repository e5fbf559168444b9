//! The credential vault.
//!
//! One record per platform key, encrypted at rest (file backend) or
//! delegated to the OS secret store (keychain backend). The backend is a
//! tagged variant resolved once at construction; `save`/`get` route to it
//! transparently.

use crate::backup::{self, BackupBundle};
use crate::cipher::{Cipher, EncryptionKey};
use crate::error::VaultError;
use crate::refresh::RefreshHandler;
use crate::secret::{Secret, SecretData};
use chrono::{Duration, Utc};
use polylink_core::PlatformKey;
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const CRED_EXTENSION: &str = "cred";
const DEFAULTS_FILE: &str = "defaults.json";
const KEYCHAIN_INDEX: &str = "__index__";

/// Storage backend, resolved once at construction.
#[derive(Debug, Clone)]
pub enum VaultBackend {
    /// One encrypted file per platform key under the vault directory.
    EncryptedFile(EncryptionKey),
    /// Entries in the OS-native secret store, under the given service name.
    Keychain { service: String },
}

enum Backend {
    File { cipher: Cipher },
    Keychain { service: String },
}

/// Encrypted, per-platform secret storage with transparent refresh.
pub struct CredentialVault {
    backend: Backend,
    dir: PathBuf,
    auto_refresh: AtomicBool,
    handlers: RwLock<HashMap<String, Arc<dyn RefreshHandler>>>,
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    defaults: RwLock<HashMap<String, String>>,
}

impl CredentialVault {
    /// Opens a vault rooted at `dir` with the given backend.
    ///
    /// The directory is created lazily on first write; existing default
    /// account pointers are loaded if present.
    ///
    /// # Errors
    ///
    /// Returns `StorageFailed` if an existing defaults file cannot be read.
    pub fn open(dir: impl Into<PathBuf>, backend: VaultBackend) -> Result<Self, VaultError> {
        let dir = dir.into();
        let backend = match backend {
            VaultBackend::EncryptedFile(key) => Backend::File {
                cipher: Cipher::new(key),
            },
            VaultBackend::Keychain { service } => Backend::Keychain { service },
        };
        let defaults = load_defaults(&dir)?;
        Ok(Self {
            backend,
            dir,
            auto_refresh: AtomicBool::new(true),
            handlers: RwLock::new(HashMap::new()),
            refresh_locks: Mutex::new(HashMap::new()),
            defaults: RwLock::new(defaults),
        })
    }

    /// Registers the refresh handler for a platform.
    pub fn register_refresh_handler(&self, platform: &str, handler: Arc<dyn RefreshHandler>) {
        self.handlers
            .write()
            .expect("handler registry lock poisoned")
            .insert(platform.to_string(), handler);
    }

    /// Enables or disables transparent refresh on `get`.
    pub fn set_auto_refresh(&self, enabled: bool) {
        self.auto_refresh.store(enabled, Ordering::Relaxed);
    }

    /// Encrypts and stores a secret, replacing any prior entry for the key.
    ///
    /// # Errors
    ///
    /// Returns `EncryptionFailed` or `StorageFailed`.
    pub fn save(&self, key: &PlatformKey, secret: &Secret) -> Result<(), VaultError> {
        self.write_secret(key, secret)?;
        debug!(%key, "credential saved");
        Ok(())
    }

    /// Decrypts and returns the secret for a key.
    ///
    /// If the secret is expired, auto-refresh is enabled, and a refresh
    /// handler is registered for the platform, the refresh happens
    /// transparently before returning. At most one refresh is in flight
    /// per platform key; concurrent callers await the first refresh's
    /// result instead of triggering a duplicate network call.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `DecryptionError`, or `RefreshFailed` (the
    /// stale secret is never returned on refresh failure).
    pub async fn get(&self, key: &PlatformKey) -> Result<Secret, VaultError> {
        let secret = self.read_secret(key)?;
        if !secret.is_expired() || !self.auto_refresh.load(Ordering::Relaxed) {
            return Ok(secret);
        }
        let Some(handler) = self.handler_for(key.platform()) else {
            return Ok(secret);
        };

        let lock = self.refresh_lock(key).await;
        let _guard = lock.lock().await;

        // A concurrent caller may have refreshed while we waited.
        let current = self.read_secret(key)?;
        if !current.is_expired() {
            return Ok(current);
        }

        let Some(material) = current.refresh_material() else {
            return Err(VaultError::RefreshFailed {
                key: key.to_string(),
                reason: "secret has no refresh material".to_string(),
            });
        };
        let material = material.to_string();

        debug!(%key, "refreshing expired credential");
        let refreshed =
            handler
                .refresh(&material)
                .await
                .map_err(|e| VaultError::RefreshFailed {
                    key: key.to_string(),
                    reason: e.reason,
                })?;

        let renewed = Secret {
            data: SecretData::RefreshToken {
                access_token: refreshed.access_token,
                refresh_token: refreshed.refresh_token.unwrap_or(material),
            },
            expires_at: Some(Utc::now() + Duration::seconds(refreshed.expires_in_seconds as i64)),
            created_at: current.created_at,
        };
        self.write_secret(key, &renewed)?;
        Ok(renewed)
    }

    /// Like [`get`](Self::get), bounded by a deadline.
    ///
    /// On timeout the in-flight refresh is abandoned; the per-key refresh
    /// lock is released when the cancelled future drops.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the deadline elapses, otherwise as `get`.
    pub async fn get_with_timeout(
        &self,
        key: &PlatformKey,
        deadline: std::time::Duration,
    ) -> Result<Secret, VaultError> {
        tokio::time::timeout(deadline, self.get(key))
            .await
            .map_err(|_| VaultError::Timeout {
                operation: format!("get {key}"),
            })?
    }

    /// Removes the secret for a key.
    ///
    /// Also clears the platform's default account pointer if it referenced
    /// the removed account.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no secret is stored under the key.
    pub fn delete(&self, key: &PlatformKey) -> Result<(), VaultError> {
        match &self.backend {
            Backend::File { .. } => {
                std::fs::remove_file(self.path_for(key)).map_err(|e| {
                    if e.kind() == ErrorKind::NotFound {
                        VaultError::NotFound {
                            key: key.to_string(),
                        }
                    } else {
                        storage_err(e)
                    }
                })?;
            }
            Backend::Keychain { service } => {
                let entry = keychain_entry(service, &key.to_string())?;
                entry.delete_credential().map_err(|e| match e {
                    keyring::Error::NoEntry => VaultError::NotFound {
                        key: key.to_string(),
                    },
                    other => VaultError::StorageFailed {
                        reason: other.to_string(),
                    },
                })?;
                let mut index = self.keychain_index(service)?;
                index.retain(|k| k != &key.to_string());
                self.write_keychain_index(service, &index)?;
            }
        }

        if let Some(account) = key.account() {
            let snapshot = {
                let mut defaults = self.defaults.write().expect("defaults lock poisoned");
                if defaults
                    .get(key.platform())
                    .is_some_and(|current| current == account)
                {
                    defaults.remove(key.platform());
                    Some(defaults.clone())
                } else {
                    None
                }
            };
            if let Some(map) = snapshot {
                self.persist_defaults(&map)?;
            }
        }

        debug!(%key, "credential deleted");
        Ok(())
    }

    /// Lists every platform key with a stored secret.
    ///
    /// # Errors
    ///
    /// Returns `StorageFailed` if the backend cannot be enumerated.
    pub fn list(&self) -> Result<Vec<PlatformKey>, VaultError> {
        match &self.backend {
            Backend::File { .. } => {
                let entries = match std::fs::read_dir(&self.dir) {
                    Ok(entries) => entries,
                    Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
                    Err(e) => return Err(storage_err(e)),
                };
                let mut keys = Vec::new();
                for entry in entries {
                    let entry = entry.map_err(storage_err)?;
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some(CRED_EXTENSION) {
                        continue;
                    }
                    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                        continue;
                    };
                    match stem.replace('+', ":").parse::<PlatformKey>() {
                        Ok(key) => keys.push(key),
                        Err(e) => warn!(file = %path.display(), error = %e, "skipping unrecognized vault file"),
                    }
                }
                keys.sort_by_key(ToString::to_string);
                Ok(keys)
            }
            Backend::Keychain { service } => {
                let mut keys = Vec::new();
                for raw in self.keychain_index(service)? {
                    match raw.parse::<PlatformKey>() {
                        Ok(key) => keys.push(key),
                        Err(e) => warn!(entry = %raw, error = %e, "skipping unrecognized keychain entry"),
                    }
                }
                keys.sort_by_key(ToString::to_string);
                Ok(keys)
            }
        }
    }

    /// Lists the accounts stored for a platform.
    ///
    /// # Errors
    ///
    /// Returns `StorageFailed` if the backend cannot be enumerated.
    pub fn list_accounts(&self, platform: &str) -> Result<Vec<String>, VaultError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|key| key.platform() == platform)
            .filter_map(|key| key.account().map(String::from))
            .collect())
    }

    /// Marks an account as the platform's default.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no credential is stored for that account.
    pub fn set_default_account(&self, platform: &str, account: &str) -> Result<(), VaultError> {
        let key =
            PlatformKey::with_account(platform, account).map_err(|e| VaultError::InvalidKey {
                reason: e.to_string(),
            })?;
        // The pointer may only reference a stored credential.
        self.read_secret(&key)?;

        let snapshot = {
            let mut defaults = self.defaults.write().expect("defaults lock poisoned");
            defaults.insert(platform.to_string(), account.to_string());
            defaults.clone()
        };
        self.persist_defaults(&snapshot)
    }

    /// Returns the platform's default account, if one is set.
    #[must_use]
    pub fn default_account(&self, platform: &str) -> Option<String> {
        self.defaults
            .read()
            .expect("defaults lock poisoned")
            .get(platform)
            .cloned()
    }

    /// Reports whether the secret for a key is currently usable.
    ///
    /// Secrets with no expiry are always valid. Expired secrets are valid
    /// only if they can be refreshed: a handler is registered for the
    /// platform and the secret carries refresh material.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `DecryptionError`.
    pub fn validate(&self, key: &PlatformKey) -> Result<bool, VaultError> {
        let secret = self.read_secret(key)?;
        if !secret.is_expired() {
            return Ok(true);
        }
        Ok(secret.refresh_material().is_some() && self.handler_for(key.platform()).is_some())
    }

    /// Exports every secret as a versioned, passphrase-encrypted bundle.
    ///
    /// # Errors
    ///
    /// Returns `StorageFailed`, `DecryptionError`, or `EncryptionFailed`.
    pub fn export_backup(&self, passphrase: &str) -> Result<BackupBundle, VaultError> {
        let mut secrets = BTreeMap::new();
        for key in self.list()? {
            let secret = self.read_secret(&key)?;
            secrets.insert(key.to_string(), secret);
        }
        backup::seal(&secrets, passphrase)
    }

    /// Imports a backup bundle, returning the number of secrets restored.
    ///
    /// The schema version is checked before anything else; on mismatch the
    /// vault is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedBackupVersion`, `DecryptionError`, or storage
    /// errors from the writes.
    pub fn import_backup(
        &self,
        bundle: &BackupBundle,
        passphrase: &str,
    ) -> Result<usize, VaultError> {
        let secrets = backup::open(bundle, passphrase)?;
        let mut imported = 0;
        for (raw_key, secret) in secrets {
            let key = raw_key
                .parse::<PlatformKey>()
                .map_err(|e| VaultError::InvalidKey {
                    reason: e.to_string(),
                })?;
            self.write_secret(&key, &secret)?;
            imported += 1;
        }
        debug!(imported, "backup imported");
        Ok(imported)
    }

    /// Copies every key from another vault into this one.
    ///
    /// Used to move credentials between backends (file to keychain or
    /// back). Secrets are read raw; no refresh is attempted.
    ///
    /// # Errors
    ///
    /// Returns storage or decryption errors from either vault.
    pub fn migrate(&self, from: &CredentialVault) -> Result<usize, VaultError> {
        let mut migrated = 0;
        for key in from.list()? {
            let secret = from.read_secret(&key)?;
            self.write_secret(&key, &secret)?;
            migrated += 1;
        }
        debug!(migrated, "vault migrated");
        Ok(migrated)
    }

    fn handler_for(&self, platform: &str) -> Option<Arc<dyn RefreshHandler>> {
        self.handlers
            .read()
            .expect("handler registry lock poisoned")
            .get(platform)
            .cloned()
    }

    async fn refresh_lock(&self, key: &PlatformKey) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn path_for(&self, key: &PlatformKey) -> PathBuf {
        // ':' is not portable in file names; keys may not contain '+'.
        let name = key.to_string().replace(':', "+");
        self.dir.join(format!("{name}.{CRED_EXTENSION}"))
    }

    fn read_secret(&self, key: &PlatformKey) -> Result<Secret, VaultError> {
        let encoded = match &self.backend {
            Backend::File { cipher } => {
                let record =
                    std::fs::read_to_string(self.path_for(key)).map_err(|e| {
                        if e.kind() == ErrorKind::NotFound {
                            VaultError::NotFound {
                                key: key.to_string(),
                            }
                        } else {
                            storage_err(e)
                        }
                    })?;
                cipher.decrypt(record.trim())?
            }
            Backend::Keychain { service } => {
                let entry = keychain_entry(service, &key.to_string())?;
                entry
                    .get_password()
                    .map_err(|e| match e {
                        keyring::Error::NoEntry => VaultError::NotFound {
                            key: key.to_string(),
                        },
                        other => VaultError::StorageFailed {
                            reason: other.to_string(),
                        },
                    })?
                    .into_bytes()
            }
        };
        serde_json::from_slice(&encoded).map_err(|_| VaultError::DecryptionError {
            reason: "stored secret has invalid encoding".to_string(),
        })
    }

    fn write_secret(&self, key: &PlatformKey, secret: &Secret) -> Result<(), VaultError> {
        let encoded = serde_json::to_vec(secret).map_err(|e| VaultError::EncryptionFailed {
            reason: format!("failed to encode secret: {e}"),
        })?;
        match &self.backend {
            Backend::File { cipher } => {
                let record = cipher.encrypt(&encoded)?;
                std::fs::create_dir_all(&self.dir).map_err(storage_err)?;
                // Write-then-rename keeps replacement atomic.
                let path = self.path_for(key);
                let tmp = path.with_extension("tmp");
                std::fs::write(&tmp, record).map_err(storage_err)?;
                std::fs::rename(&tmp, &path).map_err(storage_err)?;
            }
            Backend::Keychain { service } => {
                let entry = keychain_entry(service, &key.to_string())?;
                let text = String::from_utf8(encoded).map_err(|_| VaultError::EncryptionFailed {
                    reason: "secret encoding is not valid utf-8".to_string(),
                })?;
                entry
                    .set_password(&text)
                    .map_err(|e| VaultError::StorageFailed {
                        reason: e.to_string(),
                    })?;
                let mut index = self.keychain_index(service)?;
                if !index.contains(&key.to_string()) {
                    index.push(key.to_string());
                    self.write_keychain_index(service, &index)?;
                }
            }
        }
        Ok(())
    }

    fn keychain_index(&self, service: &str) -> Result<Vec<String>, VaultError> {
        let entry = keychain_entry(service, KEYCHAIN_INDEX)?;
        match entry.get_password() {
            Ok(raw) => serde_json::from_str(&raw).map_err(|_| VaultError::StorageFailed {
                reason: "keychain index has invalid encoding".to_string(),
            }),
            Err(keyring::Error::NoEntry) => Ok(Vec::new()),
            Err(e) => Err(VaultError::StorageFailed {
                reason: e.to_string(),
            }),
        }
    }

    fn write_keychain_index(&self, service: &str, index: &[String]) -> Result<(), VaultError> {
        let entry = keychain_entry(service, KEYCHAIN_INDEX)?;
        let raw = serde_json::to_string(index).map_err(|e| VaultError::StorageFailed {
            reason: e.to_string(),
        })?;
        entry
            .set_password(&raw)
            .map_err(|e| VaultError::StorageFailed {
                reason: e.to_string(),
            })
    }

    fn persist_defaults(&self, defaults: &HashMap<String, String>) -> Result<(), VaultError> {
        std::fs::create_dir_all(&self.dir).map_err(storage_err)?;
        let raw = serde_json::to_vec_pretty(defaults).map_err(|e| VaultError::StorageFailed {
            reason: e.to_string(),
        })?;
        std::fs::write(self.dir.join(DEFAULTS_FILE), raw).map_err(storage_err)
    }
}

fn load_defaults(dir: &Path) -> Result<HashMap<String, String>, VaultError> {
    match std::fs::read(dir.join(DEFAULTS_FILE)) {
        Ok(raw) => serde_json::from_slice(&raw).map_err(|_| VaultError::StorageFailed {
            reason: "defaults file has invalid encoding".to_string(),
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(storage_err(e)),
    }
}

fn keychain_entry(service: &str, user: &str) -> Result<keyring::Entry, VaultError> {
    keyring::Entry::new(service, user).map_err(|e| VaultError::StorageFailed {
        reason: e.to_string(),
    })
}

fn storage_err(e: std::io::Error) -> VaultError {
    VaultError::StorageFailed {
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::{RefreshError, RefreshedSecret};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn file_vault(dir: &TempDir) -> CredentialVault {
        CredentialVault::open(
            dir.path(),
            VaultBackend::EncryptedFile(EncryptionKey::generate()),
        )
        .expect("open vault")
    }

    fn key(s: &str) -> PlatformKey {
        s.parse().expect("valid key")
    }

    struct CountingHandler {
        calls: AtomicUsize,
        delay: std::time::Duration,
        result: Result<RefreshedSecret, RefreshError>,
    }

    impl CountingHandler {
        fn returning(access_token: &str, expires_in_seconds: u64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: std::time::Duration::ZERO,
                result: Ok(RefreshedSecret {
                    access_token: access_token.to_string(),
                    refresh_token: None,
                    expires_in_seconds,
                }),
            }
        }

        fn failing(reason: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: std::time::Duration::ZERO,
                result: Err(RefreshError::new(reason)),
            }
        }

        fn with_delay(mut self, delay: std::time::Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl RefreshHandler for CountingHandler {
        async fn refresh(&self, _refresh_token: &str) -> Result<RefreshedSecret, RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.result.clone()
        }
    }

    #[tokio::test]
    async fn save_get_roundtrip() {
        let dir = TempDir::new().expect("tempdir");
        let vault = file_vault(&dir);
        let key = key("github:personal");

        vault.save(&key, &Secret::token("gh-token")).expect("save");
        let secret = vault.get(&key).await.expect("get");
        assert_eq!(secret.access_token(), "gh-token");
    }

    #[tokio::test]
    async fn get_missing_returns_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let vault = file_vault(&dir);

        let err = vault.get(&key("github")).await.unwrap_err();
        assert_eq!(
            err,
            VaultError::NotFound {
                key: "github".to_string()
            }
        );
    }

    #[tokio::test]
    async fn save_replaces_prior_entry() {
        let dir = TempDir::new().expect("tempdir");
        let vault = file_vault(&dir);
        let key = key("slack");

        vault.save(&key, &Secret::token("old")).expect("save");
        vault.save(&key, &Secret::token("new")).expect("save");

        let secret = vault.get(&key).await.expect("get");
        assert_eq!(secret.access_token(), "new");
        assert_eq!(vault.list().expect("list").len(), 1);
    }

    #[tokio::test]
    async fn expired_secret_refreshes_once() {
        let dir = TempDir::new().expect("tempdir");
        let vault = file_vault(&dir);
        let key = key("x");

        let expired = Secret::token("abc").with_expiry(Utc::now() - Duration::seconds(1));
        vault.save(&key, &expired).expect("save");

        let handler = Arc::new(CountingHandler::returning("def", 3600));
        vault.register_refresh_handler("x", handler.clone());

        let secret = vault.get(&key).await.expect("get");
        assert_eq!(secret.access_token(), "def");
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        // The refreshed secret is now live; no second handler call.
        let again = vault.get(&key).await.expect("get");
        assert_eq!(again.access_token(), "def");
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_gets_share_one_refresh() {
        let dir = TempDir::new().expect("tempdir");
        let vault = Arc::new(file_vault(&dir));
        let key = key("github");

        let expired = Secret::refreshable("stale", "refresh-1")
            .with_expiry(Utc::now() - Duration::seconds(1));
        vault.save(&key, &expired).expect("save");

        let handler = Arc::new(
            CountingHandler::returning("fresh", 3600)
                .with_delay(std::time::Duration::from_millis(50)),
        );
        vault.register_refresh_handler("github", handler.clone());

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let vault = Arc::clone(&vault);
            let key = key.clone();
            tasks.push(tokio::spawn(async move { vault.get(&key).await }));
        }
        for task in tasks {
            let secret = task.await.expect("join").expect("get");
            assert_eq!(secret.access_token(), "fresh");
        }
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn refresh_failure_never_returns_stale_secret() {
        let dir = TempDir::new().expect("tempdir");
        let vault = file_vault(&dir);
        let key = key("gitlab");

        let expired = Secret::refreshable("stale", "refresh-1")
            .with_expiry(Utc::now() - Duration::seconds(1));
        vault.save(&key, &expired).expect("save");
        vault.register_refresh_handler("gitlab", Arc::new(CountingHandler::failing("revoked")));

        let err = vault.get(&key).await.unwrap_err();
        assert_eq!(
            err,
            VaultError::RefreshFailed {
                key: "gitlab".to_string(),
                reason: "revoked".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn expired_without_handler_returned_as_is() {
        let dir = TempDir::new().expect("tempdir");
        let vault = file_vault(&dir);
        let key = key("jira");

        let expired = Secret::token("stale").with_expiry(Utc::now() - Duration::seconds(1));
        vault.save(&key, &expired).expect("save");

        let secret = vault.get(&key).await.expect("get");
        assert_eq!(secret.access_token(), "stale");
        assert!(secret.is_expired());
    }

    #[tokio::test]
    async fn auto_refresh_can_be_disabled() {
        let dir = TempDir::new().expect("tempdir");
        let vault = file_vault(&dir);
        let key = key("x");

        let expired = Secret::token("abc").with_expiry(Utc::now() - Duration::seconds(1));
        vault.save(&key, &expired).expect("save");

        let handler = Arc::new(CountingHandler::returning("def", 3600));
        vault.register_refresh_handler("x", handler.clone());
        vault.set_auto_refresh(false);

        let secret = vault.get(&key).await.expect("get");
        assert_eq!(secret.access_token(), "abc");
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn get_with_timeout_surfaces_timeout() {
        let dir = TempDir::new().expect("tempdir");
        let vault = file_vault(&dir);
        let key = key("slow");

        let expired = Secret::refreshable("stale", "r").with_expiry(Utc::now() - Duration::seconds(1));
        vault.save(&key, &expired).expect("save");
        vault.register_refresh_handler(
            "slow",
            Arc::new(
                CountingHandler::returning("fresh", 3600)
                    .with_delay(std::time::Duration::from_secs(30)),
            ),
        );

        let err = vault
            .get_with_timeout(&key, std::time::Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Timeout { .. }));
    }

    #[test]
    fn validate_rules() {
        let dir = TempDir::new().expect("tempdir");
        let vault = file_vault(&dir);

        let live = key("a");
        vault.save(&live, &Secret::token("t")).expect("save");
        assert!(vault.validate(&live).expect("validate"));

        let expired = key("b");
        vault
            .save(
                &expired,
                &Secret::token("t").with_expiry(Utc::now() - Duration::seconds(1)),
            )
            .expect("save");
        assert!(!vault.validate(&expired).expect("validate"));

        vault.register_refresh_handler("b", Arc::new(CountingHandler::returning("n", 60)));
        assert!(vault.validate(&expired).expect("validate"));

        let app_key = key("c");
        vault
            .save(
                &app_key,
                &Secret::app_key("k").with_expiry(Utc::now() - Duration::seconds(1)),
            )
            .expect("save");
        vault.register_refresh_handler("c", Arc::new(CountingHandler::returning("n", 60)));
        // App keys carry no refresh material, so expiry is terminal.
        assert!(!vault.validate(&app_key).expect("validate"));
    }

    #[test]
    fn list_and_list_accounts() {
        let dir = TempDir::new().expect("tempdir");
        let vault = file_vault(&dir);

        vault.save(&key("github:work"), &Secret::token("1")).expect("save");
        vault.save(&key("github:home"), &Secret::token("2")).expect("save");
        vault.save(&key("slack"), &Secret::token("3")).expect("save");

        let keys = vault.list().expect("list");
        assert_eq!(keys.len(), 3);

        let mut accounts = vault.list_accounts("github").expect("accounts");
        accounts.sort();
        assert_eq!(accounts, vec!["home".to_string(), "work".to_string()]);
        assert!(vault.list_accounts("slack").expect("accounts").is_empty());
    }

    #[test]
    fn default_account_pointer() {
        let dir = TempDir::new().expect("tempdir");
        let vault = file_vault(&dir);

        vault.save(&key("github:work"), &Secret::token("1")).expect("save");
        vault.save(&key("github:home"), &Secret::token("2")).expect("save");

        assert!(vault.default_account("github").is_none());
        vault.set_default_account("github", "work").expect("set default");
        assert_eq!(vault.default_account("github"), Some("work".to_string()));

        // Only one pointer per platform: setting again replaces it.
        vault.set_default_account("github", "home").expect("set default");
        assert_eq!(vault.default_account("github"), Some("home".to_string()));

        // Pointing at an account with no stored credential fails.
        let err = vault.set_default_account("github", "ghost").unwrap_err();
        assert!(matches!(err, VaultError::NotFound { .. }));
    }

    #[test]
    fn default_pointer_survives_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let backend = VaultBackend::EncryptedFile(EncryptionKey::generate());
        {
            let vault = CredentialVault::open(dir.path(), backend.clone()).expect("open");
            vault.save(&key("slack:ops"), &Secret::token("t")).expect("save");
            vault.set_default_account("slack", "ops").expect("set default");
        }
        let reopened = CredentialVault::open(dir.path(), backend).expect("reopen");
        assert_eq!(reopened.default_account("slack"), Some("ops".to_string()));
    }

    #[test]
    fn delete_clears_matching_default_pointer() {
        let dir = TempDir::new().expect("tempdir");
        let vault = file_vault(&dir);
        let account_key = key("github:work");

        vault.save(&account_key, &Secret::token("1")).expect("save");
        vault.set_default_account("github", "work").expect("set default");

        vault.delete(&account_key).expect("delete");
        assert!(vault.default_account("github").is_none());
        assert!(matches!(
            vault.delete(&account_key).unwrap_err(),
            VaultError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn export_import_roundtrip() {
        let dir = TempDir::new().expect("tempdir");
        let vault = file_vault(&dir);
        vault.save(&key("github"), &Secret::token("gh")).expect("save");
        vault
            .save(&key("slack:team"), &Secret::refreshable("a", "r"))
            .expect("save");

        let bundle = vault.export_backup("passphrase").expect("export");

        let other_dir = TempDir::new().expect("tempdir");
        let other = file_vault(&other_dir);
        let imported = other.import_backup(&bundle, "passphrase").expect("import");
        assert_eq!(imported, 2);
        assert_eq!(
            other.get(&key("github")).await.expect("get").access_token(),
            "gh"
        );
    }

    #[test]
    fn import_rejects_wrong_version_without_modifying_vault() {
        let dir = TempDir::new().expect("tempdir");
        let vault = file_vault(&dir);
        vault.save(&key("github"), &Secret::token("keep")).expect("save");

        let mut bundle = vault.export_backup("p").expect("export");
        bundle.version = "0.0.0".to_string();

        let err = vault.import_backup(&bundle, "p").unwrap_err();
        assert!(matches!(err, VaultError::UnsupportedBackupVersion { .. }));
        assert_eq!(vault.list().expect("list").len(), 1);
    }

    #[test]
    fn import_rejects_wrong_passphrase() {
        let dir = TempDir::new().expect("tempdir");
        let vault = file_vault(&dir);
        vault.save(&key("github"), &Secret::token("t")).expect("save");

        let bundle = vault.export_backup("right").expect("export");
        let err = vault.import_backup(&bundle, "wrong").unwrap_err();
        assert!(matches!(err, VaultError::DecryptionError { .. }));
    }

    #[tokio::test]
    async fn migrate_copies_every_key() {
        let from_dir = TempDir::new().expect("tempdir");
        let from = file_vault(&from_dir);
        from.save(&key("github"), &Secret::token("1")).expect("save");
        from.save(&key("slack:a"), &Secret::token("2")).expect("save");

        let to_dir = TempDir::new().expect("tempdir");
        let to = file_vault(&to_dir);
        let migrated = to.migrate(&from).expect("migrate");

        assert_eq!(migrated, 2);
        assert_eq!(to.list().expect("list").len(), 2);
        assert_eq!(
            to.get(&key("slack:a")).await.expect("get").access_token(),
            "2"
        );
    }

    #[test]
    fn stored_files_are_not_plaintext() {
        let dir = TempDir::new().expect("tempdir");
        let vault = file_vault(&dir);
        vault
            .save(&key("github"), &Secret::token("very-secret-token"))
            .expect("save");

        let raw = std::fs::read_to_string(dir.path().join("github.cred")).expect("read");
        assert!(!raw.contains("very-secret-token"));
        assert_eq!(raw.split(':').count(), 3);
    }
}
