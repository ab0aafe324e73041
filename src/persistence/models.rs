//! Database rows for events and registrations.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::StoreError;
use crate::domain::{AttendeeContact, Event, EventId, Registration, RegistrationId};

/// A row from the `events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    /// Event ID.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Capacity (`0` = unlimited).
    pub capacity: i32,
    /// Held seats.
    pub seats_reserved: i32,
    /// Optional registration deadline.
    pub registration_deadline: Option<DateTime<Utc>>,
    /// Optional event start.
    pub starts_at: Option<DateTime<Utc>>,
    /// Status name.
    pub status: String,
    /// Informational minimum attendance.
    pub min_attendees: Option<i32>,
    /// Informational maximum attendance.
    pub max_attendees: Option<i32>,
    /// Auto-confirm policy flag.
    pub auto_confirm: bool,
    /// Pending policy name.
    pub pending_policy: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for Event {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: EventId::from_uuid(row.id),
            title: row.title,
            capacity: from_db(row.capacity, "capacity")?,
            seats_reserved: from_db(row.seats_reserved, "seats_reserved")?,
            registration_deadline: row.registration_deadline,
            starts_at: row.starts_at,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            min_attendees: row
                .min_attendees
                .map(|v| from_db(v, "min_attendees"))
                .transpose()?,
            max_attendees: row
                .max_attendees
                .map(|v| from_db(v, "max_attendees"))
                .transpose()?,
            auto_confirm: row.auto_confirm,
            pending_policy: row.pending_policy.parse().map_err(StoreError::Corrupt)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `registrations` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RegistrationRow {
    /// Registration ID.
    pub id: Uuid,
    /// Owning event.
    pub event_id: Uuid,
    /// Opaque contact JSON.
    pub attendee_contact: serde_json::Value,
    /// Status name.
    pub status: String,
    /// Whether the registration holds a seat.
    pub seat_held: bool,
    /// Caller idempotency token.
    pub idempotency_key: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Latest status change.
    pub status_changed_at: DateTime<Utc>,
    /// Actor of the latest status change.
    pub status_changed_by: Option<String>,
    /// Check-in timestamp.
    pub checked_in_at: Option<DateTime<Utc>>,
    /// Check-in actor.
    pub checked_in_by: Option<String>,
}

impl TryFrom<RegistrationRow> for Registration {
    type Error = StoreError;

    fn try_from(row: RegistrationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: RegistrationId::from_uuid(row.id),
            event_id: EventId::from_uuid(row.event_id),
            attendee_contact: AttendeeContact::new(row.attendee_contact),
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            seat_held: row.seat_held,
            idempotency_key: row.idempotency_key,
            created_at: row.created_at,
            status_changed_at: row.status_changed_at,
            status_changed_by: row.status_changed_by,
            checked_in_at: row.checked_in_at,
            checked_in_by: row.checked_in_by,
        })
    }
}

/// Converts a non-negative database integer into `u32`.
///
/// # Errors
///
/// Returns [`StoreError::Corrupt`] for negative values.
pub fn from_db(value: i32, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} is negative: {value}")))
}

/// Converts a `u32` into a Postgres `INTEGER`.
///
/// # Errors
///
/// Returns [`StoreError::Corrupt`] for values above `i32::MAX`.
pub fn to_db(value: u32, column: &str) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}
