//! Secret payloads stored by the vault.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Secret material, by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecretData {
    /// A bare access token.
    Token { token: String },
    /// An access token paired with a refresh token.
    RefreshToken {
        access_token: String,
        refresh_token: String,
    },
    /// An application key (never refreshed).
    AppKey { key: String },
}

/// A secret stored under one platform key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// The secret material.
    pub data: SecretData,
    /// When the secret expires, if it does.
    pub expires_at: Option<DateTime<Utc>>,
    /// When the secret was first stored.
    pub created_at: DateTime<Utc>,
}

impl Secret {
    /// Creates a bare token secret with no expiry.
    #[must_use]
    pub fn token(token: impl Into<String>) -> Self {
        Self::new(SecretData::Token {
            token: token.into(),
        })
    }

    /// Creates a refreshable token secret.
    #[must_use]
    pub fn refreshable(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self::new(SecretData::RefreshToken {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        })
    }

    /// Creates an application key secret.
    #[must_use]
    pub fn app_key(key: impl Into<String>) -> Self {
        Self::new(SecretData::AppKey { key: key.into() })
    }

    fn new(data: SecretData) -> Self {
        Self {
            data,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the expiry timestamp.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns the token presented to the platform on outbound calls.
    #[must_use]
    pub fn access_token(&self) -> &str {
        match &self.data {
            SecretData::Token { token } => token,
            SecretData::RefreshToken { access_token, .. } => access_token,
            SecretData::AppKey { key } => key,
        }
    }

    /// Returns the material presented to a refresh handler, if any.
    ///
    /// Refresh-token secrets hand over their refresh token; bare tokens
    /// hand over the token itself (some platforms re-issue from it).
    /// Application keys are never refreshed.
    #[must_use]
    pub fn refresh_material(&self) -> Option<&str> {
        match &self.data {
            SecretData::Token { token } => Some(token),
            SecretData::RefreshToken { refresh_token, .. } => Some(refresh_token),
            SecretData::AppKey { .. } => None,
        }
    }

    /// Returns true if the secret carries an expiry that has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at <= Utc::now(),
            None => false,
        }
    }
}
