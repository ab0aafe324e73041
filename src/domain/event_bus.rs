//! Notification dispatch for registration domain events.
//!
//! [`NotificationDispatcher`] is the sink the admission core publishes to.
//! [`EventBus`] is the default implementation: a [`tokio::sync::broadcast`]
//! channel that fans events out to WebSocket connections and the audit log
//! writer.

use tokio::sync::broadcast;

use super::RegistrationEvent;

/// Receives domain events after their state change is committed.
///
/// Called exactly once per committed change. Delivery beyond this call
/// (retries, deduplication) is the implementor's concern.
pub trait NotificationDispatcher: Send + Sync + std::fmt::Debug {
    /// Publishes one domain event.
    fn publish(&self, event: RegistrationEvent);
}

/// Broadcast bus for [`RegistrationEvent`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity
/// (default 10 000). When the ring buffer is full, the oldest events are
/// dropped for lagging receivers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RegistrationEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Sends an event to all subscribers.
    ///
    /// Returns the number of receivers that received the event.
    /// If there are no active receivers, the event is silently dropped.
    pub fn send(&self, event: RegistrationEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RegistrationEvent> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl NotificationDispatcher for EventBus {
    fn publish(&self, event: RegistrationEvent) {
        let event_type = event.event_type;
        let registration_id = event.registration_id();
        let delivered = self.send(event);
        tracing::debug!(%event_type, %registration_id, delivered, "domain event published");
    }
}
