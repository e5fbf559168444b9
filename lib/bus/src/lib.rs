//! In-process priority event bus for the polylink integration platform.
//!
//! This crate provides:
//!
//! - **Event**: immutable, typed messages carrying outbound-call results
//!   and normalized webhook payloads
//! - **EventBus**: four fixed priority tiers, FIFO within a tier, with
//!   wildcard subscriptions and a middleware chain
//!
//! The bus is memory-resident only; queues reset on process restart.

pub mod bus;
pub mod error;
pub mod event;
pub mod pattern;

pub use bus::{EventBus, EventHandler, Middleware};
pub use error::{HandlerError, PatternError};
pub use event::{Event, Priority};
pub use pattern::TypePattern;
