//! Event DTOs for create, update, list, and organizer reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::common_dto::{PaginationMeta, nullable};
use crate::domain::{
    Event, EventDraft, EventId, EventPatch, PendingPolicy, RegistrationStatus, Viability,
};

/// Request body for `POST /events`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateEventRequest {
    /// Display title.
    pub title: String,
    /// Total sellable seats; `0` (the default) means unlimited.
    #[serde(default)]
    pub capacity: u32,
    /// Last moment at which registration is accepted.
    #[serde(default)]
    pub registration_deadline: Option<DateTime<Utc>>,
    /// Event start; used as the deadline when none is set.
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    /// Informational minimum attendance.
    #[serde(default)]
    pub min_attendees: Option<u32>,
    /// Informational maximum attendance.
    #[serde(default)]
    pub max_attendees: Option<u32>,
    /// Admit straight into `confirmed`.
    #[serde(default)]
    pub auto_confirm: bool,
    /// Pending-at-deadline behavior; the server default applies when omitted.
    #[serde(default)]
    pub pending_policy: Option<PendingPolicy>,
}

impl CreateEventRequest {
    /// Converts into a domain draft, filling in the server's default
    /// pending policy.
    #[must_use]
    pub fn into_draft(self, default_policy: PendingPolicy) -> EventDraft {
        EventDraft {
            title: self.title,
            capacity: self.capacity,
            registration_deadline: self.registration_deadline,
            starts_at: self.starts_at,
            min_attendees: self.min_attendees,
            max_attendees: self.max_attendees,
            auto_confirm: self.auto_confirm,
            pending_policy: self.pending_policy.unwrap_or(default_policy),
        }
    }
}

/// Request body for `PATCH /events/{id}`.
///
/// Omitted fields stay unchanged; an explicit `null` clears a nullable field.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateEventRequest {
    /// New title.
    #[serde(default)]
    pub title: Option<String>,
    /// New capacity. Must not drop below the held seats.
    #[serde(default)]
    pub capacity: Option<u32>,
    /// New deadline, or `null` to clear.
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub registration_deadline: Option<Option<DateTime<Utc>>>,
    /// New start, or `null` to clear.
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub starts_at: Option<Option<DateTime<Utc>>>,
    /// New minimum attendance, or `null` to clear.
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<u32>)]
    pub min_attendees: Option<Option<u32>>,
    /// New maximum attendance, or `null` to clear.
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<u32>)]
    pub max_attendees: Option<Option<u32>>,
    /// New auto-confirm flag.
    #[serde(default)]
    pub auto_confirm: Option<bool>,
    /// New pending policy.
    #[serde(default)]
    pub pending_policy: Option<PendingPolicy>,
}

impl From<UpdateEventRequest> for EventPatch {
    fn from(req: UpdateEventRequest) -> Self {
        Self {
            title: req.title,
            capacity: req.capacity,
            registration_deadline: req.registration_deadline,
            starts_at: req.starts_at,
            min_attendees: req.min_attendees,
            max_attendees: req.max_attendees,
            auto_confirm: req.auto_confirm,
            pending_policy: req.pending_policy,
        }
    }
}

/// Event as returned by the API: the canonical record plus derived fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventResponse {
    /// Canonical event record.
    #[serde(flatten)]
    pub event: Event,
    /// Seats still available; absent for unlimited events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seats_available: Option<u32>,
    /// Deadline actually enforced (explicit deadline or event start).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_deadline: Option<DateTime<Utc>>,
}

impl From<Event> for EventResponse {
    fn from(event: Event) -> Self {
        Self {
            seats_available: event.seats_available(),
            effective_deadline: event.effective_deadline(),
            event,
        }
    }
}

/// Paginated list response for `GET /events`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventListResponse {
    /// Events on this page.
    pub data: Vec<EventResponse>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}

/// Response body for `POST /events/{id}/complete`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompleteEventResponse {
    /// Event after completion.
    pub event: EventResponse,
    /// Confirmed registrations moved to `no-show`.
    pub no_shows_marked: usize,
}

/// Response body for `GET /events/{id}/viability`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ViabilityResponse {
    /// Event identifier.
    pub event_id: EventId,
    /// Configured minimum attendance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_attendees: Option<u32>,
    /// Configured maximum attendance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attendees: Option<u32>,
    /// Verdict and counts.
    pub viability: Viability,
    /// Statuses counted as active.
    pub counted_statuses: Vec<RegistrationStatus>,
}

impl ViabilityResponse {
    /// Builds the report for an evaluated event.
    #[must_use]
    pub fn new(event: &Event, viability: Viability) -> Self {
        Self {
            event_id: event.id,
            min_attendees: event.min_attendees,
            max_attendees: event.max_attendees,
            viability,
            counted_statuses: RegistrationStatus::ALL
                .into_iter()
                .filter(|s| s.is_active())
                .collect(),
        }
    }
}

/// Response body for `POST /events/{id}/pending/release`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReleasePendingResponse {
    /// Event identifier.
    pub event_id: EventId,
    /// Pending registrations cancelled by this sweep.
    pub released: usize,
}
