//! Per-connection subscription state.
//!
//! A client follows a bounded set of events (or all of them through the
//! `"*"` wildcard) and may narrow the feed to some kinds of registration
//! change, e.g. only cancellations to backfill a waitlist.

use std::collections::HashSet;

use crate::domain::{EventId, RegistrationEvent, RegistrationEventType};

/// Default cap on explicitly followed events per connection.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 100;

/// A subscribe request would push the connection past its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("subscription limit exceeded: {requested} events requested, limit is {limit}")]
pub struct SubscriptionLimitExceeded {
    /// Configured per-connection limit.
    pub limit: usize,
    /// Distinct events the connection would follow after the request.
    pub requested: usize,
}

/// Subscription set of one WebSocket connection.
#[derive(Debug)]
pub struct SubscriptionManager {
    event_ids: HashSet<EventId>,
    /// Wildcard subscription; explicit ids are then redundant.
    subscribe_all: bool,
    /// Empty means every kind of change.
    event_types: HashSet<RegistrationEventType>,
    limit: usize,
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::with_limit(DEFAULT_MAX_SUBSCRIPTIONS)
    }
}

impl SubscriptionManager {
    /// Creates an empty manager with [`DEFAULT_MAX_SUBSCRIPTIONS`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty manager following at most `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            event_ids: HashSet::new(),
            subscribe_all: false,
            event_types: HashSet::new(),
            limit,
        }
    }

    /// Follows `ids` (and everything, with `wildcard`). A non-empty
    /// `event_types` replaces the current type filter.
    ///
    /// All-or-nothing: nothing changes when the request exceeds the limit.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionLimitExceeded`] if the connection would follow
    /// more than `limit` distinct events.
    pub fn subscribe(
        &mut self,
        ids: &[EventId],
        wildcard: bool,
        event_types: &[RegistrationEventType],
    ) -> Result<usize, SubscriptionLimitExceeded> {
        let mut fresh = HashSet::new();
        for id in ids {
            if !self.event_ids.contains(id) {
                fresh.insert(*id);
            }
        }
        let requested = self.event_ids.len().saturating_add(fresh.len());
        if requested > self.limit {
            return Err(SubscriptionLimitExceeded {
                limit: self.limit,
                requested,
            });
        }

        if wildcard {
            self.subscribe_all = true;
        }
        self.event_ids.extend(ids.iter().copied());
        if !event_types.is_empty() {
            self.event_types = event_types.iter().copied().collect();
        }
        Ok(self.event_ids.len())
    }

    /// Stops following `ids`.
    pub fn unsubscribe(&mut self, ids: &[EventId]) {
        for id in ids {
            self.event_ids.remove(id);
        }
    }

    /// Returns `true` if `event` should be forwarded to the client.
    #[must_use]
    pub fn matches(&self, event: &RegistrationEvent) -> bool {
        let followed = self.subscribe_all || self.event_ids.contains(&event.event_id());
        followed && (self.event_types.is_empty() || self.event_types.contains(&event.event_type))
    }

    /// Number of explicitly followed events.
    #[must_use]
    pub fn count(&self) -> usize {
        self.event_ids.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub const fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }

    /// Active type filter, sorted by name. Empty means all types.
    #[must_use]
    pub fn event_types(&self) -> Vec<RegistrationEventType> {
        let mut types: Vec<_> = self.event_types.iter().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::{AttendeeContact, Event, EventDraft, Registration};

    fn change(kind: RegistrationEventType) -> RegistrationEvent {
        let now = Utc::now();
        let Ok(event) = Event::from_draft(
            EventDraft {
                title: "Book club".to_string(),
                capacity: 8,
                ..EventDraft::default()
            },
            now,
        ) else {
            panic!("valid draft");
        };
        let registration = Registration::admitted(
            &event,
            AttendeeContact::new(serde_json::json!({"name": "Sol"})),
            None,
            now,
        );
        RegistrationEvent::new(kind, registration, event, now)
    }

    #[test]
    fn empty_matches_nothing() {
        let mgr = SubscriptionManager::new();
        assert!(!mgr.matches(&change(RegistrationEventType::Registered)));
    }

    #[test]
    fn follows_only_listed_events() {
        let mut mgr = SubscriptionManager::new();
        let followed = change(RegistrationEventType::Registered);
        let Ok(1) = mgr.subscribe(&[followed.event_id()], false, &[]) else {
            panic!("subscribe failed");
        };
        assert!(mgr.matches(&followed));
        assert!(!mgr.matches(&change(RegistrationEventType::Registered)));
    }

    #[test]
    fn wildcard_matches_everything() {
        let mut mgr = SubscriptionManager::new();
        let Ok(0) = mgr.subscribe(&[], true, &[]) else {
            panic!("subscribe failed");
        };
        assert!(mgr.matches(&change(RegistrationEventType::NoShow)));
        assert!(mgr.is_subscribed_all());
    }

    #[test]
    fn type_filter_narrows_the_feed() {
        let mut mgr = SubscriptionManager::new();
        let Ok(_) = mgr.subscribe(&[], true, &[RegistrationEventType::Cancelled]) else {
            panic!("subscribe failed");
        };
        assert!(mgr.matches(&change(RegistrationEventType::Cancelled)));
        assert!(!mgr.matches(&change(RegistrationEventType::Registered)));
        assert_eq!(mgr.event_types(), vec![RegistrationEventType::Cancelled]);
    }

    #[test]
    fn limit_rejects_whole_request() {
        let mut mgr = SubscriptionManager::with_limit(2);
        let a = EventId::new();
        let Ok(1) = mgr.subscribe(&[a], false, &[]) else {
            panic!("subscribe failed");
        };
        // Re-subscribing to a followed event does not count twice.
        let Ok(2) = mgr.subscribe(&[a, EventId::new()], false, &[]) else {
            panic!("within limit");
        };
        let Err(err) = mgr.subscribe(&[EventId::new()], false, &[]) else {
            panic!("limit must hold");
        };
        assert_eq!(err.limit, 2);
        assert_eq!(err.requested, 3);
        assert_eq!(mgr.count(), 2);
    }

    #[test]
    fn unsubscribe_drops_event() {
        let mut mgr = SubscriptionManager::new();
        let a = change(RegistrationEventType::Registered);
        let b = change(RegistrationEventType::Registered);
        let Ok(2) = mgr.subscribe(&[a.event_id(), b.event_id()], false, &[]) else {
            panic!("subscribe failed");
        };
        mgr.unsubscribe(&[a.event_id()]);
        assert!(!mgr.matches(&a));
        assert!(mgr.matches(&b));
        assert_eq!(mgr.count(), 1);
    }
}
