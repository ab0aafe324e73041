//! Persistence layer: event store, registration ledger, and seat ledger.
//!
//! The admission core talks to storage only through the traits in this
//! module. [`SeatLedger`] is the single writer of `seats_reserved`: every
//! counter change happens in the same atomic unit as the matching
//! registration's `seat_held` flag.
//!
//! Two backends are provided:
//! - [`memory::MemoryStore`] – per-event mutex, used for tests and
//!   single-node runs.
//! - [`postgres::PostgresStore`] – conditional `UPDATE` inside a transaction
//!   via `sqlx::PgPool`.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    AttendeeContact, Event, EventId, EventStatus, Registration, RegistrationId, RejectionReason,
    TransitionPlan,
};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Storage failure, classified by what the caller may safely do next.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Optimistic concurrency conflict; nothing was written. Retry.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Backend unreachable before anything was written.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The write may or may not have committed.
    #[error("ambiguous commit: {0}")]
    Ambiguous(String),

    /// Stored data could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Seat reservation request handed to the ledger.
#[derive(Debug, Clone)]
pub struct SeatRequest {
    /// Target event.
    pub event_id: EventId,
    /// Opaque attendee contact.
    pub attendee_contact: AttendeeContact,
    /// Optional caller idempotency token.
    pub idempotency_key: Option<String>,
}

/// Result of an atomic reservation attempt.
#[derive(Debug, Clone)]
pub enum ReserveOutcome {
    /// Seat reserved and registration created.
    Admitted {
        /// Newly created registration.
        registration: Registration,
        /// Event after the counter update.
        event: Event,
    },
    /// The idempotency key already maps to a registration; nothing changed.
    Replayed {
        /// Registration created by the original request.
        registration: Registration,
    },
    /// Admission rules rejected the request; nothing changed.
    Rejected(RejectionReason),
    /// No event with that ID.
    EventNotFound,
}

/// Result of releasing a registration's seat.
#[derive(Debug, Clone)]
pub enum ReleaseOutcome {
    /// The held seat was returned to the event.
    Released {
        /// Registration with `seat_held = false`.
        registration: Registration,
        /// Event after the counter update.
        event: Event,
    },
    /// The registration held no seat; nothing changed.
    NotHeld(Registration),
    /// No registration with that ID.
    NotFound,
}

/// Result of committing a [`TransitionPlan`].
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    /// The new status (and any seat release) was committed.
    Committed {
        /// Registration after the transition.
        registration: Registration,
        /// Event after the transition.
        event: Event,
    },
    /// The stored status no longer matches the plan; nothing changed.
    Stale(Registration),
    /// No registration with that ID.
    NotFound,
}

/// Event metadata storage.
#[async_trait]
pub trait EventRepository: Send + Sync + std::fmt::Debug {
    /// Stores a new event.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn insert_event(&self, event: &Event) -> Result<(), StoreError>;

    /// Loads an event by ID.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError>;

    /// Lists all events ordered by creation time.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn list_events(&self) -> Result<Vec<Event>, StoreError>;

    /// Writes the metadata fields of `event`.
    ///
    /// Commits only if the stored status is still `event.status` and the
    /// new capacity still covers the seats held at commit time. Returns
    /// `None` when the guard fails or the event is missing.
    ///
    /// `seats_reserved` is left alone except when an unlimited event gains
    /// a capacity: every registration that has not been cancelled then
    /// claims a seat in the same commit, and the new capacity must cover
    /// all of them.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn update_metadata(&self, event: &Event) -> Result<Option<Event>, StoreError>;

    /// Moves the event from `from` to `to`. Returns `None` if the stored
    /// status is not `from` or the event is missing.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn set_status(
        &self,
        id: EventId,
        from: EventStatus,
        to: EventStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Event>, StoreError>;
}

/// Registration record storage (read side).
#[async_trait]
pub trait RegistrationRepository: Send + Sync + std::fmt::Debug {
    /// Loads a registration by ID.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn get_registration(&self, id: RegistrationId)
    -> Result<Option<Registration>, StoreError>;

    /// Lists an event's registrations ordered by creation time.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn list_registrations(&self, event_id: EventId) -> Result<Vec<Registration>, StoreError>;

    /// Finds the registration created with `key` for `event_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn find_by_idempotency_key(
        &self,
        event_id: EventId,
        key: &str,
    ) -> Result<Option<Registration>, StoreError>;
}

/// Atomic seat accounting. The only writer of `seats_reserved` and of
/// registration status.
#[async_trait]
pub trait SeatLedger: Send + Sync + std::fmt::Debug {
    /// Re-checks admissibility, increments the counter if below capacity,
    /// and creates the registration, all in one atomic unit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the attempt lost a race and
    /// may be retried, or another [`StoreError`] on backend failure.
    async fn reserve_seat(
        &self,
        request: SeatRequest,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome, StoreError>;

    /// Decrements the counter iff the registration holds a seat, clearing
    /// `seat_held` in the same atomic unit.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn release_seat(
        &self,
        id: RegistrationId,
        now: DateTime<Utc>,
    ) -> Result<ReleaseOutcome, StoreError>;

    /// Commits a status change if the stored status equals
    /// `plan.expected`, releasing the seat when `plan.releases_seat`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on backend failure.
    async fn commit_transition(
        &self,
        plan: &TransitionPlan,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, StoreError>;
}

/// Everything the admission service needs from storage.
pub trait AdmissionStore: EventRepository + RegistrationRepository + SeatLedger {}

impl<T> AdmissionStore for T where T: EventRepository + RegistrationRepository + SeatLedger {}
