//! Error types for the webhook crate.

use std::fmt;

/// Error raised while receiving a webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    /// The signature did not match the payload.
    SignatureInvalid {
        /// Platform the request claimed to come from.
        platform: String,
    },
    /// The payload could not be parsed or the request was otherwise
    /// structurally invalid. Raised before any signature work.
    MalformedPayload {
        /// What was wrong with the request.
        reason: String,
    },
}

impl fmt::Display for WebhookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignatureInvalid { platform } => {
                write!(f, "webhook signature verification failed for {platform}")
            }
            Self::MalformedPayload { reason } => {
                write!(f, "malformed webhook payload: {reason}")
            }
        }
    }
}

impl std::error::Error for WebhookError {}
