//! Inbound webhook handling for the polylink integration platform.
//!
//! This crate provides:
//!
//! - **WebhookReceiver**: per-platform HMAC-SHA256 signature verification
//!   with constant-time comparison
//! - **WebhookParser**: platform-specific payload normalization into bus
//!   events, with priority derived from the normalized event type
//!
//! Payload shape is checked before any signature work so that malformed
//! requests are rejected without touching secret material.

pub mod error;
pub mod receiver;

pub use error::WebhookError;
pub use receiver::{
    NormalizedEvent, SignatureFormat, WebhookParser, WebhookReceiver, WebhookVerificationResult,
};
