//! Webhook signature verification and event normalization.

use crate::error::WebhookError;
use hmac::{Hmac, Mac};
use polylink_bus::{Event, EventBus, Priority};
use serde_json::Value as JsonValue;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

/// How a platform encodes the signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureFormat {
    /// Plain hex digest.
    Hex,
    /// Hex digest with a fixed prefix, e.g. `sha256=`.
    HexPrefixed(String),
    /// Base64 digest.
    Base64,
}

/// A platform-specific payload normalizer.
pub trait WebhookParser: Send + Sync {
    /// Normalizes a verified payload into an event type and payload.
    ///
    /// # Errors
    ///
    /// Returns a reason string when the payload does not have the shape
    /// this platform sends; the receiver surfaces it as `MalformedPayload`.
    fn parse(&self, payload: &JsonValue) -> Result<NormalizedEvent, String>;
}

impl<F> WebhookParser for F
where
    F: Fn(&JsonValue) -> Result<NormalizedEvent, String> + Send + Sync,
{
    fn parse(&self, payload: &JsonValue) -> Result<NormalizedEvent, String> {
        self(payload)
    }
}

/// Output of a [`WebhookParser`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEvent {
    /// Dotted event type, e.g. `issues.opened`.
    pub event_type: String,
    /// Normalized payload.
    pub payload: JsonValue,
}

/// Outcome of a successfully received webhook.
#[derive(Debug, Clone)]
pub struct WebhookVerificationResult {
    /// Always true on the success path; failures return an error instead.
    pub valid: bool,
    /// The platform the webhook came from.
    pub platform: String,
    /// The event as published on the bus.
    pub event: Option<Event>,
}

struct PlatformRegistration {
    secret: Vec<u8>,
    format: SignatureFormat,
    parser: Arc<dyn WebhookParser>,
}

/// Verifies inbound webhooks and publishes normalized events.
pub struct WebhookReceiver {
    bus: Arc<EventBus>,
    platforms: RwLock<HashMap<String, PlatformRegistration>>,
}

impl WebhookReceiver {
    /// Creates a receiver publishing onto the given bus.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            platforms: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a platform with its shared secret, signature format, and
    /// payload parser. Re-registering replaces the previous entry.
    pub fn register_platform(
        &self,
        platform: impl Into<String>,
        secret: impl Into<Vec<u8>>,
        format: SignatureFormat,
        parser: Arc<dyn WebhookParser>,
    ) {
        let platform = platform.into();
        debug!(platform = %platform, "webhook platform registered");
        self.platforms
            .write()
            .expect("platforms lock poisoned")
            .insert(
                platform,
                PlatformRegistration {
                    secret: secret.into(),
                    format,
                    parser,
                },
            );
    }

    /// Checks payload shape and signature, returning the parsed body.
    ///
    /// Payload validation runs first: a body that is not valid JSON is
    /// rejected as `MalformedPayload` before any secret is touched, so
    /// callers can distinguish garbage from forgery.
    ///
    /// # Errors
    ///
    /// `MalformedPayload` for unknown platforms or unparseable bodies,
    /// `SignatureInvalid` when the HMAC does not match.
    pub fn verify(
        &self,
        platform: &str,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<JsonValue, WebhookError> {
        let platforms = self.platforms.read().expect("platforms lock poisoned");
        let Some(registration) = platforms.get(platform) else {
            return Err(WebhookError::MalformedPayload {
                reason: format!("unknown platform {platform:?}"),
            });
        };

        let payload: JsonValue =
            serde_json::from_slice(raw_body).map_err(|e| WebhookError::MalformedPayload {
                reason: format!("body is not valid JSON: {e}"),
            })?;

        let expected = decode_signature(signature_header, &registration.format).ok_or_else(
            || WebhookError::SignatureInvalid {
                platform: platform.to_string(),
            },
        )?;

        let mut mac = HmacSha256::new_from_slice(&registration.secret)
            .map_err(|_| WebhookError::SignatureInvalid {
                platform: platform.to_string(),
            })?;
        mac.update(raw_body);
        // verify_slice compares in constant time.
        mac.verify_slice(&expected)
            .map_err(|_| WebhookError::SignatureInvalid {
                platform: platform.to_string(),
            })?;

        Ok(payload)
    }

    /// Verifies a webhook, normalizes it, and publishes it on the bus.
    ///
    /// # Errors
    ///
    /// Same as [`verify`](Self::verify), plus `MalformedPayload` when the
    /// platform parser rejects the payload shape.
    pub fn receive(
        &self,
        platform: &str,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<WebhookVerificationResult, WebhookError> {
        let payload = self.verify(platform, raw_body, signature_header)?;

        let normalized = {
            let platforms = self.platforms.read().expect("platforms lock poisoned");
            let registration = platforms.get(platform).ok_or_else(|| {
                WebhookError::MalformedPayload {
                    reason: format!("unknown platform {platform:?}"),
                }
            })?;
            registration.parser.parse(&payload)
        };

        let normalized = normalized.map_err(|reason| {
            warn!(platform = %platform, reason = %reason, "webhook payload rejected by parser");
            WebhookError::MalformedPayload { reason }
        })?;

        let priority = derive_priority(&normalized.event_type);
        let event = Event::new(
            normalized.event_type,
            platform,
            priority,
            normalized.payload,
        );
        debug!(
            platform = %platform,
            event_type = %event.event_type,
            priority = ?event.priority,
            "webhook accepted"
        );
        self.bus.publish(event.clone());

        Ok(WebhookVerificationResult {
            valid: true,
            platform: platform.to_string(),
            event: Some(event),
        })
    }
}

fn decode_signature(header: &str, format: &SignatureFormat) -> Option<Vec<u8>> {
    match format {
        SignatureFormat::Hex => hex::decode(header).ok(),
        SignatureFormat::HexPrefixed(prefix) => {
            let digest = header.strip_prefix(prefix.as_str())?;
            hex::decode(digest).ok()
        }
        SignatureFormat::Base64 => {
            use base64::Engine as _;
            base64::engine::general_purpose::STANDARD.decode(header).ok()
        }
    }
}

/// Maps a normalized event type onto a dispatch priority.
///
/// Security events are critical, errors and failures are high, keepalive
/// chatter is low, everything else is normal.
#[must_use]
pub fn derive_priority(event_type: &str) -> Priority {
    let mut segments = event_type.split('.');
    if segments.any(|segment| segment == "security") {
        return Priority::Critical;
    }
    let mut segments = event_type.split('.');
    if segments.any(|segment| segment == "error" || segment == "failure") {
        return Priority::High;
    }
    let mut segments = event_type.split('.');
    if segments.any(|segment| segment == "ping" || segment == "heartbeat") {
        return Priority::Low;
    }
    Priority::Normal
}
