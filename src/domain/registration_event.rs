//! Domain events emitted after every committed registration state change.
//!
//! Each successful admission or transition produces exactly one
//! [`RegistrationEvent`], handed to the
//! [`NotificationDispatcher`](super::NotificationDispatcher) after the change
//! is durable. Consumers (WebSocket feed, audit log, mailers) receive a full
//! snapshot of the registration and its event.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Event, EventId, Registration, RegistrationId};

/// Kind of registration domain event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum RegistrationEventType {
    /// A seat was admitted and the registration created.
    Registered,
    /// `pending → confirmed`.
    Confirmed,
    /// `pending`/`confirmed` → `cancelled`.
    Cancelled,
    /// `confirmed → attended`.
    CheckedIn,
    /// `confirmed → no-show`.
    NoShow,
}

impl RegistrationEventType {
    /// Returns the event type as a static string slice.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::CheckedIn => "checkedIn",
            Self::NoShow => "noShow",
        }
    }
}

impl fmt::Display for RegistrationEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot published once per committed state change.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegistrationEvent {
    /// What happened.
    pub event_type: RegistrationEventType,
    /// Registration after the change.
    pub registration: Registration,
    /// Event after the change (reflects any seat counter update).
    pub event: Event,
    /// When the change was committed.
    pub timestamp: DateTime<Utc>,
}

impl RegistrationEvent {
    /// Creates a new domain event.
    #[must_use]
    pub const fn new(
        event_type: RegistrationEventType,
        registration: Registration,
        event: Event,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            registration,
            event,
            timestamp,
        }
    }

    /// Returns the event ID this domain event concerns.
    #[must_use]
    pub const fn event_id(&self) -> EventId {
        self.event.id
    }

    /// Returns the registration ID this domain event concerns.
    #[must_use]
    pub const fn registration_id(&self) -> RegistrationId {
        self.registration.id
    }
}
