//! The priority event bus.
//!
//! Four fixed tiers, drained strictly critical → high → normal → low,
//! FIFO within a tier. Delivery is at-least-once per subscriber: handler
//! failures are logged and isolated, never re-thrown into the publisher.

use crate::error::{HandlerError, PatternError};
use crate::event::{Event, Priority};
use crate::pattern::TypePattern;
use async_trait::async_trait;
use polylink_core::SubscriptionId;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// Consumes events delivered by the bus.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles one event.
    ///
    /// # Errors
    ///
    /// Errors are logged by the bus and do not block delivery to other
    /// subscribers or processing of subsequent events.
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Intercepts every event before dispatch.
///
/// Returning `None` drops the event and halts further processing for it.
pub trait Middleware: Send + Sync {
    /// Transforms or drops an event.
    fn apply(&self, event: Event) -> Option<Event>;
}

struct SubscriptionEntry {
    id: SubscriptionId,
    pattern: TypePattern,
    priority: Priority,
    handler: Arc<dyn EventHandler>,
}

#[derive(Default)]
struct Inner {
    queues: [VecDeque<Event>; 4],
    subscriptions: Vec<SubscriptionEntry>,
    middleware: Vec<Arc<dyn Middleware>>,
}

/// In-process priority publish/subscribe bus.
#[derive(Default)]
pub struct EventBus {
    inner: Mutex<Inner>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues an event into its priority tier.
    pub fn publish(&self, event: Event) {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        debug!(
            event_type = %event.event_type,
            platform = %event.platform,
            priority = ?event.priority,
            "event published"
        );
        inner.queues[event.priority.index()].push_back(event);
    }

    /// Registers a subscriber for event types matching the pattern.
    ///
    /// Within a single event's dispatch, subscribers are invoked in
    /// subscription-priority order (registration order breaks ties).
    ///
    /// # Errors
    ///
    /// Returns `PatternError` if the pattern cannot be parsed.
    pub fn subscribe(
        &self,
        pattern: &str,
        priority: Priority,
        handler: Arc<dyn EventHandler>,
    ) -> Result<SubscriptionId, PatternError> {
        let pattern: TypePattern = pattern.parse()?;
        let id = SubscriptionId::new();
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        inner.subscriptions.push(SubscriptionEntry {
            id,
            pattern,
            priority,
            handler,
        });
        Ok(id)
    }

    /// Removes a subscription. Returns true if it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        let before = inner.subscriptions.len();
        inner.subscriptions.retain(|entry| entry.id != id);
        inner.subscriptions.len() != before
    }

    /// Appends a middleware to the chain.
    pub fn add_middleware(&self, middleware: Arc<dyn Middleware>) {
        self.inner
            .lock()
            .expect("bus lock poisoned")
            .middleware
            .push(middleware);
    }

    /// Number of events currently queued across all tiers.
    #[must_use]
    pub fn pending(&self) -> usize {
        let inner = self.inner.lock().expect("bus lock poisoned");
        inner.queues.iter().map(VecDeque::len).sum()
    }

    /// Dispatches every queued event, returning the number delivered.
    ///
    /// Tiers are drained strictly by priority; within a tier events go out
    /// FIFO. Events published by handlers during the drain are picked up
    /// in the same call.
    pub async fn drain(&self) -> usize {
        let mut delivered = 0;
        while let Some(event) = self.pop_next() {
            let chain: Vec<Arc<dyn Middleware>> = {
                let inner = self.inner.lock().expect("bus lock poisoned");
                inner.middleware.clone()
            };

            let mut current = Some(event);
            for middleware in chain {
                match current.take() {
                    Some(e) => current = middleware.apply(e),
                    None => break,
                }
            }
            let Some(event) = current else {
                debug!("event dropped by middleware");
                continue;
            };

            // Subscribers are matched after the middleware chain so a
            // transformed event type reaches the right handlers.
            let handlers = {
                let inner = self.inner.lock().expect("bus lock poisoned");
                let mut handlers: Vec<(Priority, Arc<dyn EventHandler>)> = inner
                    .subscriptions
                    .iter()
                    .filter(|entry| entry.pattern.matches(&event.event_type))
                    .map(|entry| (entry.priority, Arc::clone(&entry.handler)))
                    .collect();
                handlers.sort_by_key(|(priority, _)| *priority);
                handlers
            };

            for (_, handler) in handlers {
                if let Err(e) = handler.handle(&event).await {
                    error!(
                        event_type = %event.event_type,
                        event_id = %event.id,
                        error = %e,
                        "event handler failed"
                    );
                }
            }
            delivered += 1;
        }
        delivered
    }

    fn pop_next(&self) -> Option<Event> {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        for tier in Priority::ALL {
            if let Some(event) = inner.queues[tier.index()].pop_front() {
                return Some(event);
            }
        }
        None
    }
}
