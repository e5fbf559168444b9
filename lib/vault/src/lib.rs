//! Encrypted credential vault for the polylink integration platform.
//!
//! This crate provides:
//!
//! - **CredentialVault**: per-platform secret storage with transparent
//!   refresh of expired tokens
//! - **Cipher**: authenticated encryption (AES-256-GCM) with a fresh IV
//!   on every write
//! - **Backup bundles**: versioned, passphrase-encrypted exports
//!
//! Secrets are encrypted at rest. No plaintext credentials are stored in
//! configuration or logs.

pub mod backup;
pub mod cipher;
pub mod error;
pub mod refresh;
pub mod secret;
pub mod vault;

pub use backup::{BACKUP_VERSION, BackupBundle};
pub use cipher::{Cipher, EncryptionKey};
pub use error::VaultError;
pub use refresh::{RefreshError, RefreshHandler, RefreshedSecret};
pub use secret::{Secret, SecretData};
pub use vault::{CredentialVault, VaultBackend};
