//! Core domain types for the polylink integration platform.
//!
//! This crate provides the foundational types shared by every polylink
//! component: strongly-typed IDs and the `PlatformKey` addressing scheme
//! used to scope credentials, rate limits, and events to a platform
//! account.

pub mod id;
pub mod platform_key;

pub use id::{EventId, ParseIdError, SubscriptionId};
pub use platform_key::{ParsePlatformKeyError, PlatformKey};
