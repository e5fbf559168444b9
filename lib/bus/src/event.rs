//! Events and priority tiers.

use chrono::{DateTime, Utc};
use polylink_core::EventId;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Dispatch priority. Tiers are drained strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
}

impl Priority {
    /// All tiers, highest first.
    pub const ALL: [Self; 4] = [Self::Critical, Self::High, Self::Normal, Self::Low];

    /// Queue index for this tier.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Normal => 2,
            Self::Low => 3,
        }
    }
}

/// An event on the bus. Immutable once published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier.
    pub id: EventId,
    /// Dotted event type, e.g. `issues.opened`.
    pub event_type: String,
    /// The platform the event concerns.
    pub platform: String,
    /// Dispatch priority.
    pub priority: Priority,
    /// Event payload.
    pub payload: JsonValue,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Creates a new event stamped with a fresh ID and the current time.
    #[must_use]
    pub fn new(
        event_type: impl Into<String>,
        platform: impl Into<String>,
        priority: Priority,
        payload: JsonValue,
    ) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            platform: platform.into(),
            priority,
            payload,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_order_is_strict() {
        assert!(Priority::Critical < Priority::High);
        assert!(Priority::High < Priority::Normal);
        assert!(Priority::Normal < Priority::Low);
    }

    #[test]
    fn tier_indices_match_order() {
        for (i, priority) in Priority::ALL.iter().enumerate() {
            assert_eq!(priority.index(), i);
        }
    }

    #[test]
    fn event_construction() {
        let event = Event::new(
            "issues.opened",
            "github",
            Priority::Normal,
            serde_json::json!({"number": 7}),
        );
        assert_eq!(event.event_type, "issues.opened");
        assert_eq!(event.platform, "github");
        assert_eq!(event.priority, Priority::Normal);
    }

    #[test]
    fn event_serde_roundtrip() {
        let event = Event::new("a.b", "slack", Priority::High, serde_json::json!({}));
        let json = serde_json::to_string(&event).expect("serialize");
        let parsed: Event = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(event, parsed);
    }
}
