//! Error types for the gateway crate.
//!
//! `CallError` is the classification contract for wrapped operations:
//! adapters map their platform responses onto it so the gateway knows
//! what to retry and what counts toward the circuit breaker.
//! `GatewayError` is what callers of `execute` receive.

use std::fmt;
use std::time::Duration;

/// Failure of a single wrapped platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Transport-level failure (connection reset, DNS, TLS). Retried
    /// internally with backoff.
    Transport { reason: String },
    /// Server-side failure (5xx-equivalent). Counts toward the breaker,
    /// never retried internally.
    Server { status: u16 },
    /// The platform itself rate-limited the call. Surfaced immediately;
    /// retrying would defeat the platform's own backpressure.
    RateLimited { retry_after_secs: Option<u64> },
    /// Non-retryable failure (bad request, permission denied).
    Fatal { reason: String },
}

impl CallError {
    /// True for failures the gateway retries internally.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// True for failures that increment the breaker's failure count.
    #[must_use]
    pub fn counts_toward_breaker(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Server { .. })
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { reason } => write!(f, "transport error: {reason}"),
            Self::Server { status } => write!(f, "server error: status {status}"),
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "platform rate limited, retry after {secs}s")
                } else {
                    write!(f, "platform rate limited")
                }
            }
            Self::Fatal { reason } => write!(f, "fatal error: {reason}"),
        }
    }
}

impl std::error::Error for CallError {}

/// Errors surfaced by gateway operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Admission would require waiting longer than the configured maximum.
    RateLimitExceeded {
        endpoint: String,
        required_wait: Duration,
    },
    /// The circuit is open; no network attempt was made.
    CircuitOpen {
        endpoint: String,
        retry_after: Duration,
    },
    /// The caller's deadline elapsed.
    Timeout { endpoint: String },
    /// The wrapped call failed after any internal retries.
    CallFailed {
        endpoint: String,
        attempts: u32,
        source: CallError,
    },
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimitExceeded {
                endpoint,
                required_wait,
            } => write!(
                f,
                "rate limit exceeded for {endpoint}: would need to wait {required_wait:?}"
            ),
            Self::CircuitOpen {
                endpoint,
                retry_after,
            } => write!(
                f,
                "circuit open for {endpoint}: retry after {retry_after:?}"
            ),
            Self::Timeout { endpoint } => write!(f, "call to {endpoint} timed out"),
            Self::CallFailed {
                endpoint,
                attempts,
                source,
            } => write!(
                f,
                "call to {endpoint} failed after {attempts} attempt(s): {source}"
            ),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CallFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
