//! Authenticated encryption for secrets at rest.
//!
//! Records are AES-256-GCM sealed with a fresh 96-bit IV on every write
//! and stored as `b64(iv):b64(tag):b64(ciphertext)`. The explicit
//! delimiters make truncation or corruption detectable before the cipher
//! ever runs; a wrong key or tampered payload fails closed.

use crate::error::VaultError;
use aes_gcm::aead::{Aead, AeadCore, OsRng};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};
use std::fmt;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// A 256-bit symmetric key.
///
/// Host-supplied key material must be exactly 64 hex characters; anything
/// else is rejected at construction.
#[derive(Clone)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Parses host-supplied key material.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKeyMaterial` unless the input is exactly 64 hex
    /// characters.
    pub fn from_hex(s: &str) -> Result<Self, VaultError> {
        if s.len() != 64 {
            return Err(VaultError::InvalidKeyMaterial {
                reason: format!("expected 64 hex characters, got {}", s.len()),
            });
        }
        let bytes = hex::decode(s).map_err(|e| VaultError::InvalidKeyMaterial {
            reason: e.to_string(),
        })?;
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }

    /// Derives a key from a backup passphrase.
    #[must_use]
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self(key)
    }

    /// Generates a random key.
    #[must_use]
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Returns the key as a hex string, for host storage.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print key material.
        write!(f, "EncryptionKey(..)")
    }
}

/// Seals and opens `iv:tag:ciphertext` records with a fixed key.
#[derive(Clone)]
pub struct Cipher {
    key: EncryptionKey,
}

impl Cipher {
    /// Creates a cipher over the given key.
    #[must_use]
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Encrypts a plaintext into an `iv:tag:ciphertext` record.
    ///
    /// A fresh IV is generated on every call, so identical plaintexts
    /// never produce identical records.
    ///
    /// # Errors
    ///
    /// Returns `EncryptionFailed` if the cipher rejects the input.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, VaultError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()));
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| VaultError::EncryptionFailed {
                reason: "cipher rejected plaintext".to_string(),
            })?;
        // aes-gcm appends the authentication tag to the ciphertext.
        let (body, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        Ok(format!(
            "{}:{}:{}",
            BASE64.encode(nonce),
            BASE64.encode(tag),
            BASE64.encode(body)
        ))
    }

    /// Decrypts an `iv:tag:ciphertext` record.
    ///
    /// # Errors
    ///
    /// Returns `DecryptionError` for a malformed record, a wrong key, or a
    /// tampered payload. Never returns partial data.
    pub fn decrypt(&self, record: &str) -> Result<Vec<u8>, VaultError> {
        let mut parts = record.splitn(3, ':');
        let (Some(iv_part), Some(tag_part), Some(body_part)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(VaultError::DecryptionError {
                reason: "malformed record: expected iv:tag:ciphertext".to_string(),
            });
        };

        let decode = |part: &str, what: &str| {
            BASE64.decode(part).map_err(|_| VaultError::DecryptionError {
                reason: format!("malformed record: invalid {what} encoding"),
            })
        };
        let iv = decode(iv_part, "iv")?;
        let tag = decode(tag_part, "tag")?;
        let body = decode(body_part, "ciphertext")?;

        if iv.len() != NONCE_LEN {
            return Err(VaultError::DecryptionError {
                reason: format!("malformed record: iv must be {NONCE_LEN} bytes"),
            });
        }
        if tag.len() != TAG_LEN {
            return Err(VaultError::DecryptionError {
                reason: format!("malformed record: tag must be {TAG_LEN} bytes"),
            });
        }

        let mut sealed = body;
        sealed.extend_from_slice(&tag);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.as_bytes()));
        cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_ref())
            .map_err(|_| VaultError::DecryptionError {
                reason: "authentication failed".to_string(),
            })
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cipher(..)")
    }
}
