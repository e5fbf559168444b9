//! Error types for the vault crate.
//!
//! Every public vault operation returns one of these typed errors.
//! Decryption failures never degrade silently and never return partial
//! data.

use std::fmt;

/// Errors from credential vault operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    /// No credential stored under the given platform key.
    NotFound { key: String },
    /// Decryption failed: wrong key, tampered payload, or corrupt record.
    DecryptionError { reason: String },
    /// Encryption failed.
    EncryptionFailed { reason: String },
    /// Key material rejected at construction.
    InvalidKeyMaterial { reason: String },
    /// A registered refresh handler failed to refresh an expired secret.
    RefreshFailed { key: String, reason: String },
    /// Backup bundle schema version does not match the current one.
    UnsupportedBackupVersion { found: String, expected: String },
    /// The operation did not complete within the caller's deadline.
    Timeout { operation: String },
    /// Backing storage (filesystem or OS secret store) failed.
    StorageFailed { reason: String },
    /// Malformed platform key.
    InvalidKey { reason: String },
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { key } => {
                write!(f, "credential not found: {key}")
            }
            Self::DecryptionError { reason } => {
                write!(f, "decryption failed: {reason}")
            }
            Self::EncryptionFailed { reason } => {
                write!(f, "encryption failed: {reason}")
            }
            Self::InvalidKeyMaterial { reason } => {
                write!(f, "invalid key material: {reason}")
            }
            Self::RefreshFailed { key, reason } => {
                write!(f, "refresh failed for {key}: {reason}")
            }
            Self::UnsupportedBackupVersion { found, expected } => {
                write!(
                    f,
                    "unsupported backup version {found}, expected {expected}"
                )
            }
            Self::Timeout { operation } => {
                write!(f, "operation timed out: {operation}")
            }
            Self::StorageFailed { reason } => {
                write!(f, "storage operation failed: {reason}")
            }
            Self::InvalidKey { reason } => {
                write!(f, "invalid platform key: {reason}")
            }
        }
    }
}

impl std::error::Error for VaultError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = VaultError::NotFound {
            key: "github:work".to_string(),
        };
        assert!(err.to_string().contains("credential not found"));
        assert!(err.to_string().contains("github:work"));
    }

    #[test]
    fn backup_version_display() {
        let err = VaultError::UnsupportedBackupVersion {
            found: "0.0.0".to_string(),
            expected: "1.0.0".to_string(),
        };
        assert!(err.to_string().contains("0.0.0"));
        assert!(err.to_string().contains("1.0.0"));
    }
}
