//! Circuit breaker state.
//!
//! Three states per endpoint: CLOSED (normal admission), OPEN (fail fast
//! until the cooldown elapses), HALF_OPEN (exactly one trial request).
//! Cooldowns grow exponentially on repeated trips, capped.

use std::time::Duration;
use tokio::time::Instant;

/// Circuit breaker state for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; requests consume bucket tokens.
    Closed,
    /// Failing fast until `opened_at + cooldown` elapses.
    Open {
        opened_at: Instant,
        cooldown: Duration,
    },
    /// One trial request is admitted; everything else is rejected.
    HalfOpen { trial_in_flight: bool },
}

impl CircuitState {
    /// True if requests are currently rejected without a network attempt.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

/// Cooldown for the nth trip: doubles each trip, capped at `max`.
pub(crate) fn cooldown_for(trip_count: u32, base: Duration, max: Duration) -> Duration {
    let exp = trip_count.saturating_sub(1).min(16);
    base.saturating_mul(2u32.saturating_pow(exp)).min(max)
}
