//! Error types for the bus crate.

use std::fmt;

/// Error returned by an event handler.
///
/// Handler failures are isolated per subscriber: the bus logs them and
/// carries on. They never propagate to the publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    /// Why the handler failed.
    pub reason: String,
}

impl HandlerError {
    /// Creates a handler error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event handler failed: {}", self.reason)
    }
}

impl std::error::Error for HandlerError {}

/// Error returned when a subscription pattern cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternError {
    /// Why the pattern is invalid.
    pub reason: String,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid type pattern: {}", self.reason)
    }
}

impl std::error::Error for PatternError {}
