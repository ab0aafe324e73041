//! Event record: capacity, deadlines, lifecycle status and policy flags.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::EventId;
use crate::error::AdmissionError;

/// Lifecycle status of an event.
///
/// `draft → published → {cancelled, completed}`; a draft may also be
/// cancelled directly. Only `published` events admit registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Being prepared by the organizer; not visible for registration.
    Draft,
    /// Open for registration (subject to deadline and capacity).
    Published,
    /// Called off. Terminal.
    Cancelled,
    /// Took place. Terminal.
    Completed,
}

impl EventStatus {
    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    /// Returns `true` for `cancelled` and `completed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Completed)
    }

    /// Returns `true` if an event may move from `self` to `target`.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Draft, Self::Published)
                | (Self::Draft, Self::Cancelled)
                | (Self::Published, Self::Cancelled)
                | (Self::Published, Self::Completed)
        )
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "cancelled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

/// What happens to `pending` registrations once the deadline has passed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PendingPolicy {
    /// Pending registrations keep their seat until explicitly cancelled.
    #[default]
    HoldSeat,
    /// Pending registrations are cancelled by the deadline sweep.
    ReleaseAtDeadline,
}

impl PendingPolicy {
    /// Returns the canonical snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HoldSeat => "hold_seat",
            Self::ReleaseAtDeadline => "release_at_deadline",
        }
    }
}

impl FromStr for PendingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hold_seat" => Ok(Self::HoldSeat),
            "release_at_deadline" => Ok(Self::ReleaseAtDeadline),
            other => Err(format!("unknown pending policy: {other}")),
        }
    }
}

/// Canonical event record.
///
/// `seats_reserved` is owned by the seat ledger: it is never written by
/// metadata updates and never recomputed by counting registrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Event {
    /// Unique event identifier.
    pub id: EventId,
    /// Display title (opaque to admission).
    pub title: String,
    /// Total sellable seats; `0` means unlimited.
    pub capacity: u32,
    /// Seats currently held by registrations.
    pub seats_reserved: u32,
    /// Last moment at which registration is accepted.
    pub registration_deadline: Option<DateTime<Utc>>,
    /// Event start, used as deadline when none is set.
    pub starts_at: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: EventStatus,
    /// Informational minimum attendance for viability checks.
    pub min_attendees: Option<u32>,
    /// Informational maximum attendance for viability checks.
    pub max_attendees: Option<u32>,
    /// Admissions enter `confirmed` instead of `pending`.
    pub auto_confirm: bool,
    /// Deadline behavior for pending registrations.
    pub pending_policy: PendingPolicy,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last metadata or counter change.
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Builds a new `draft` event from validated input.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::InvalidRequest`] if the draft is
    /// inconsistent (see [`EventDraft::validate`]).
    pub fn from_draft(draft: EventDraft, now: DateTime<Utc>) -> Result<Self, AdmissionError> {
        draft.validate()?;
        Ok(Self {
            id: EventId::new(),
            title: draft.title,
            capacity: draft.capacity,
            seats_reserved: 0,
            registration_deadline: draft.registration_deadline,
            starts_at: draft.starts_at,
            status: EventStatus::Draft,
            min_attendees: draft.min_attendees,
            max_attendees: draft.max_attendees,
            auto_confirm: draft.auto_confirm,
            pending_policy: draft.pending_policy,
            created_at: now,
            updated_at: now,
        })
    }

    /// Returns `true` when the event has no capacity limit.
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.capacity == 0
    }

    /// Deadline used for admission: the explicit registration deadline,
    /// or the event start when none is set.
    #[must_use]
    pub fn effective_deadline(&self) -> Option<DateTime<Utc>> {
        self.registration_deadline.or(self.starts_at)
    }

    /// Seats still available, or `None` for unlimited events.
    #[must_use]
    pub const fn seats_available(&self) -> Option<u32> {
        if self.is_unlimited() {
            None
        } else {
            Some(self.capacity.saturating_sub(self.seats_reserved))
        }
    }

    /// Applies a metadata patch in place.
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::InvalidTransition`] if the event is terminal.
    /// - [`AdmissionError::InvalidRequest`] if the patched event would be
    ///   inconsistent, or capacity would drop below the held seats.
    pub fn apply_patch(&mut self, patch: EventPatch, now: DateTime<Utc>) -> Result<(), AdmissionError> {
        if self.status.is_terminal() {
            return Err(AdmissionError::InvalidTransition {
                from: self.status.to_string(),
                to: "updated".to_string(),
            });
        }

        let mut draft = EventDraft {
            title: self.title.clone(),
            capacity: self.capacity,
            registration_deadline: self.registration_deadline,
            starts_at: self.starts_at,
            min_attendees: self.min_attendees,
            max_attendees: self.max_attendees,
            auto_confirm: self.auto_confirm,
            pending_policy: self.pending_policy,
        };
        if let Some(title) = patch.title {
            draft.title = title;
        }
        if let Some(capacity) = patch.capacity {
            draft.capacity = capacity;
        }
        if let Some(deadline) = patch.registration_deadline {
            draft.registration_deadline = deadline;
        }
        if let Some(starts_at) = patch.starts_at {
            draft.starts_at = starts_at;
        }
        if let Some(min) = patch.min_attendees {
            draft.min_attendees = min;
        }
        if let Some(max) = patch.max_attendees {
            draft.max_attendees = max;
        }
        if let Some(auto_confirm) = patch.auto_confirm {
            draft.auto_confirm = auto_confirm;
        }
        if let Some(policy) = patch.pending_policy {
            draft.pending_policy = policy;
        }
        draft.validate()?;

        if self.seats_reserved > 0 {
            if draft.capacity == 0 {
                return Err(AdmissionError::InvalidRequest(format!(
                    "cannot make event unlimited while {} seats are held",
                    self.seats_reserved
                )));
            }
            if draft.capacity < self.seats_reserved {
                return Err(AdmissionError::InvalidRequest(format!(
                    "capacity {} is below {} held seats",
                    draft.capacity, self.seats_reserved
                )));
            }
        }

        self.title = draft.title;
        self.capacity = draft.capacity;
        self.registration_deadline = draft.registration_deadline;
        self.starts_at = draft.starts_at;
        self.min_attendees = draft.min_attendees;
        self.max_attendees = draft.max_attendees;
        self.auto_confirm = draft.auto_confirm;
        self.pending_policy = draft.pending_policy;
        self.updated_at = now;
        Ok(())
    }
}

/// Input for creating an event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventDraft {
    /// Display title.
    pub title: String,
    /// Total sellable seats; `0` means unlimited.
    pub capacity: u32,
    /// Optional registration deadline.
    pub registration_deadline: Option<DateTime<Utc>>,
    /// Optional event start.
    pub starts_at: Option<DateTime<Utc>>,
    /// Informational minimum attendance.
    pub min_attendees: Option<u32>,
    /// Informational maximum attendance.
    pub max_attendees: Option<u32>,
    /// Admissions enter `confirmed` directly.
    pub auto_confirm: bool,
    /// Deadline behavior for pending registrations.
    pub pending_policy: PendingPolicy,
}

impl EventDraft {
    /// Checks internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::InvalidRequest`] if the title is blank,
    /// `min_attendees > max_attendees`, or the deadline is after the start.
    pub fn validate(&self) -> Result<(), AdmissionError> {
        if self.title.trim().is_empty() {
            return Err(AdmissionError::InvalidRequest("title must not be empty".to_string()));
        }
        if let (Some(min), Some(max)) = (self.min_attendees, self.max_attendees)
            && min > max
        {
            return Err(AdmissionError::InvalidRequest(format!(
                "min_attendees {min} exceeds max_attendees {max}"
            )));
        }
        if let (Some(deadline), Some(start)) = (self.registration_deadline, self.starts_at)
            && deadline > start
        {
            return Err(AdmissionError::InvalidRequest(
                "registration_deadline must not be after starts_at".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial metadata update. `None` leaves a field unchanged; for nullable
/// fields `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPatch {
    /// New title.
    pub title: Option<String>,
    /// New capacity.
    pub capacity: Option<u32>,
    /// New (or cleared) deadline.
    pub registration_deadline: Option<Option<DateTime<Utc>>>,
    /// New (or cleared) start.
    pub starts_at: Option<Option<DateTime<Utc>>>,
    /// New (or cleared) minimum attendance.
    pub min_attendees: Option<Option<u32>>,
    /// New (or cleared) maximum attendance.
    pub max_attendees: Option<Option<u32>>,
    /// New auto-confirm flag.
    pub auto_confirm: Option<bool>,
    /// New pending policy.
    pub pending_policy: Option<PendingPolicy>,
}

/// Organizer-facing attendance viability. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Viability {
    /// No attendance bounds configured.
    Unknown {
        /// Active registrations.
        active: u32,
    },
    /// Fewer active registrations than `min_attendees`.
    BelowMinimum {
        /// Active registrations.
        active: u32,
        /// Registrations still needed to reach the minimum.
        shortfall: u32,
    },
    /// Within the configured bounds.
    Viable {
        /// Active registrations.
        active: u32,
    },
    /// More active registrations than `max_attendees`.
    AboveMaximum {
        /// Active registrations.
        active: u32,
        /// Registrations above the maximum.
        excess: u32,
    },
}

impl Viability {
    /// Evaluates `active` registrations against the event's bounds.
    #[must_use]
    pub fn evaluate(event: &Event, active: u32) -> Self {
        match (event.min_attendees, event.max_attendees) {
            (None, None) => Self::Unknown { active },
            (Some(min), _) if active < min => Self::BelowMinimum {
                active,
                shortfall: min - active,
            },
            (_, Some(max)) if active > max => Self::AboveMaximum {
                active,
                excess: active - max,
            },
            _ => Self::Viable { active },
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn draft() -> EventDraft {
        EventDraft {
            title: "Harbor walk".to_string(),
            capacity: 10,
            ..EventDraft::default()
        }
    }

    #[test]
    fn new_event_starts_as_draft() {
        let Ok(event) = Event::from_draft(draft(), Utc::now()) else {
            panic!("valid draft");
        };
        assert_eq!(event.status, EventStatus::Draft);
        assert_eq!(event.seats_reserved, 0);
        assert_eq!(event.seats_available(), Some(10));
    }

    #[test]
    fn blank_title_rejected() {
        let d = EventDraft {
            title: "  ".to_string(),
            ..draft()
        };
        assert!(Event::from_draft(d, Utc::now()).is_err());
    }

    #[test]
    fn inverted_bounds_rejected() {
        let d = EventDraft {
            min_attendees: Some(5),
            max_attendees: Some(2),
            ..draft()
        };
        assert!(d.validate().is_err());
    }

    #[test]
    fn deadline_after_start_rejected() {
        let now = Utc::now();
        let d = EventDraft {
            registration_deadline: Some(now + Duration::days(2)),
            starts_at: Some(now + Duration::days(1)),
            ..draft()
        };
        assert!(d.validate().is_err());
    }

    #[test]
    fn effective_deadline_falls_back_to_start() {
        let now = Utc::now();
        let Ok(mut event) = Event::from_draft(draft(), now) else {
            panic!("valid draft");
        };
        assert_eq!(event.effective_deadline(), None);
        event.starts_at = Some(now);
        assert_eq!(event.effective_deadline(), Some(now));
        let earlier = now - Duration::hours(1);
        event.registration_deadline = Some(earlier);
        assert_eq!(event.effective_deadline(), Some(earlier));
    }

    #[test]
    fn status_transitions() {
        assert!(EventStatus::Draft.can_transition_to(EventStatus::Published));
        assert!(EventStatus::Published.can_transition_to(EventStatus::Completed));
        assert!(!EventStatus::Draft.can_transition_to(EventStatus::Completed));
        assert!(!EventStatus::Cancelled.can_transition_to(EventStatus::Published));
        assert!(!EventStatus::Published.can_transition_to(EventStatus::Published));
    }

    #[test]
    fn status_parses_from_str() {
        assert_eq!("completed".parse::<EventStatus>(), Ok(EventStatus::Completed));
        assert!("open".parse::<EventStatus>().is_err());
    }

    #[test]
    fn patch_cannot_shrink_below_held_seats() {
        let now = Utc::now();
        let Ok(mut event) = Event::from_draft(draft(), now) else {
            panic!("valid draft");
        };
        event.seats_reserved = 4;
        let shrink = EventPatch {
            capacity: Some(3),
            ..EventPatch::default()
        };
        assert!(event.apply_patch(shrink, now).is_err());
        assert_eq!(event.capacity, 10);

        let unlimited = EventPatch {
            capacity: Some(0),
            ..EventPatch::default()
        };
        assert!(event.apply_patch(unlimited, now).is_err());

        let ok = EventPatch {
            capacity: Some(4),
            title: Some("Harbor walk (small)".to_string()),
            ..EventPatch::default()
        };
        assert!(event.apply_patch(ok, now).is_ok());
        assert_eq!(event.capacity, 4);
        assert_eq!(event.seats_reserved, 4);
    }

    #[test]
    fn patch_rejected_on_terminal_event() {
        let now = Utc::now();
        let Ok(mut event) = Event::from_draft(draft(), now) else {
            panic!("valid draft");
        };
        event.status = EventStatus::Completed;
        let result = event.apply_patch(EventPatch::default(), now);
        let Err(AdmissionError::InvalidTransition { .. }) = result else {
            panic!("expected invalid transition");
        };
    }

    #[test]
    fn patch_can_clear_deadline() {
        let now = Utc::now();
        let Ok(mut event) = Event::from_draft(
            EventDraft {
                registration_deadline: Some(now),
                ..draft()
            },
            now,
        ) else {
            panic!("valid draft");
        };
        let clear = EventPatch {
            registration_deadline: Some(None),
            ..EventPatch::default()
        };
        assert!(event.apply_patch(clear, now).is_ok());
        assert_eq!(event.registration_deadline, None);
    }

    #[test]
    fn viability_verdicts() {
        let Ok(mut event) = Event::from_draft(draft(), Utc::now()) else {
            panic!("valid draft");
        };
        assert_eq!(Viability::evaluate(&event, 3), Viability::Unknown { active: 3 });

        event.min_attendees = Some(5);
        event.max_attendees = Some(8);
        assert_eq!(
            Viability::evaluate(&event, 3),
            Viability::BelowMinimum {
                active: 3,
                shortfall: 2
            }
        );
        assert_eq!(Viability::evaluate(&event, 6), Viability::Viable { active: 6 });
        assert_eq!(
            Viability::evaluate(&event, 9),
            Viability::AboveMaximum {
                active: 9,
                excess: 1
            }
        );
    }
}
