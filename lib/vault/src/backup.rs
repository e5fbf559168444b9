//! Versioned, passphrase-encrypted backup bundles.
//!
//! A bundle carries every secret in the vault, sealed with a key derived
//! from the export passphrase. The schema version is checked before any
//! decryption; a mismatch fails with `UnsupportedBackupVersion` and the
//! importing vault is left untouched.

use crate::cipher::{Cipher, EncryptionKey};
use crate::error::VaultError;
use crate::secret::Secret;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The current backup schema version.
pub const BACKUP_VERSION: &str = "1.0.0";

/// A portable, encrypted export of a vault's contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupBundle {
    /// Backup schema version.
    pub version: String,
    /// When the bundle was exported.
    pub created_at: DateTime<Utc>,
    /// The `{platform_key -> secret}` map, passphrase-encrypted.
    pub encrypted_payload: String,
}

pub(crate) fn seal(
    secrets: &BTreeMap<String, Secret>,
    passphrase: &str,
) -> Result<BackupBundle, VaultError> {
    let plaintext = serde_json::to_vec(secrets).map_err(|e| VaultError::EncryptionFailed {
        reason: format!("failed to encode backup payload: {e}"),
    })?;
    let cipher = Cipher::new(EncryptionKey::from_passphrase(passphrase));
    Ok(BackupBundle {
        version: BACKUP_VERSION.to_string(),
        created_at: Utc::now(),
        encrypted_payload: cipher.encrypt(&plaintext)?,
    })
}

pub(crate) fn open(
    bundle: &BackupBundle,
    passphrase: &str,
) -> Result<BTreeMap<String, Secret>, VaultError> {
    // Version check comes before any cryptographic work.
    if bundle.version != BACKUP_VERSION {
        return Err(VaultError::UnsupportedBackupVersion {
            found: bundle.version.clone(),
            expected: BACKUP_VERSION.to_string(),
        });
    }
    let cipher = Cipher::new(EncryptionKey::from_passphrase(passphrase));
    let plaintext = cipher.decrypt(&bundle.encrypted_payload)?;
    serde_json::from_slice(&plaintext).map_err(|_| VaultError::DecryptionError {
        reason: "backup payload has invalid encoding".to_string(),
    })
}
