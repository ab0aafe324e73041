//! Registration record and its lifecycle state machine.
//!
//! [`Registration::plan_transition`] is the only place that decides whether a
//! status change is legal. It is total over (current, target): every pair
//! outside the table below is rejected with `INVALID_TRANSITION`.
//!
//! | From                  | To          | Side effect                 |
//! |-----------------------|-------------|-----------------------------|
//! | `pending`             | `confirmed` | none                        |
//! | `pending`/`confirmed` | `cancelled` | seat released               |
//! | `confirmed`           | `attended`  | check-in recorded           |
//! | `confirmed`           | `no-show`   | none (seat stays consumed)  |

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Event, EventId, RegistrationEventType, RegistrationId};
use crate::error::AdmissionError;

/// Lifecycle status of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RegistrationStatus {
    /// Admitted, awaiting organizer confirmation.
    Pending,
    /// Admitted and confirmed.
    Confirmed,
    /// Withdrawn by attendee or admin. Terminal.
    Cancelled,
    /// Checked in at the event. Terminal.
    Attended,
    /// Confirmed but never checked in. Terminal.
    NoShow,
}

impl RegistrationStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Confirmed,
        Self::Cancelled,
        Self::Attended,
        Self::NoShow,
    ];

    /// Returns the canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Attended => "attended",
            Self::NoShow => "no-show",
        }
    }

    /// Returns `true` for states with no outgoing transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Attended | Self::NoShow)
    }

    /// Returns `true` for states that keep a seat on a capacity-bearing
    /// event. Only cancellation gives the seat back.
    #[must_use]
    pub const fn occupies_seat(self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    /// Returns `true` while the registration counts toward attendance.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::Attended)
    }

    /// Returns `true` if `self → target` is in the transition table.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Confirmed)
                | (Self::Pending, Self::Cancelled)
                | (Self::Confirmed, Self::Cancelled)
                | (Self::Confirmed, Self::Attended)
                | (Self::Confirmed, Self::NoShow)
        )
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown registration status: {s}"))
    }
}

/// Attendee contact details. Opaque to admission; format validation
/// belongs to the [`crate::service::ContactValidator`] collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttendeeContact(serde_json::Value);

impl AttendeeContact {
    /// Wraps a JSON value.
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Returns the raw JSON value.
    #[must_use]
    pub const fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Consumes the wrapper.
    #[must_use]
    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

/// One attendee's registration for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Registration {
    /// Unique registration identifier.
    pub id: RegistrationId,
    /// Event this registration belongs to.
    pub event_id: EventId,
    /// Opaque contact blob.
    #[schema(value_type = Object)]
    pub attendee_contact: AttendeeContact,
    /// Lifecycle status.
    pub status: RegistrationStatus,
    /// Whether this registration currently counts against `seats_reserved`.
    pub seat_held: bool,
    /// Caller-supplied idempotency token, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the latest status change.
    pub status_changed_at: DateTime<Utc>,
    /// Actor behind the latest status change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_changed_by: Option<String>,
    /// Check-in timestamp (only in `attended`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_in_at: Option<DateTime<Utc>>,
    /// Who performed the check-in (only in `attended`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checked_in_by: Option<String>,
}

impl Registration {
    /// Builds the record created by a successful admission.
    ///
    /// Starts in `confirmed` when the event auto-confirms, `pending`
    /// otherwise. Holds a seat only when the event has bounded capacity.
    #[must_use]
    pub fn admitted(
        event: &Event,
        attendee_contact: AttendeeContact,
        idempotency_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let status = if event.auto_confirm {
            RegistrationStatus::Confirmed
        } else {
            RegistrationStatus::Pending
        };
        Self {
            id: RegistrationId::new(),
            event_id: event.id,
            attendee_contact,
            status,
            seat_held: !event.is_unlimited(),
            idempotency_key,
            created_at: now,
            status_changed_at: now,
            status_changed_by: None,
            checked_in_at: None,
            checked_in_by: None,
        }
    }

    /// Computes the result of moving to `target`, without mutating `self`.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::InvalidTransition`] for any pair outside the
    /// transition table, including self-transitions.
    pub fn plan_transition(
        &self,
        target: RegistrationStatus,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<TransitionPlan, AdmissionError> {
        if !self.status.can_transition_to(target) {
            return Err(AdmissionError::InvalidTransition {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }

        let mut updated = self.clone();
        updated.status = target;
        updated.status_changed_at = now;
        updated.status_changed_by = Some(actor.to_string());

        // The stored hold may differ from this snapshot if a capacity change
        // claimed seats in between; the ledger frees whatever it finds.
        let releases_seat = target == RegistrationStatus::Cancelled;
        if releases_seat {
            updated.seat_held = false;
        }
        if target == RegistrationStatus::Attended {
            updated.checked_in_at = Some(now);
            updated.checked_in_by = Some(actor.to_string());
        }

        let event_type = match target {
            RegistrationStatus::Confirmed => RegistrationEventType::Confirmed,
            RegistrationStatus::Cancelled => RegistrationEventType::Cancelled,
            RegistrationStatus::Attended => RegistrationEventType::CheckedIn,
            RegistrationStatus::NoShow => RegistrationEventType::NoShow,
            RegistrationStatus::Pending => RegistrationEventType::Registered,
        };

        Ok(TransitionPlan {
            expected: self.status,
            updated,
            releases_seat,
            event_type,
        })
    }
}

/// A validated status change ready to be committed.
///
/// The ledger commits it only if the stored status still equals
/// `expected`; otherwise the caller re-plans against the fresh record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionPlan {
    /// Status the plan was computed from.
    pub expected: RegistrationStatus,
    /// Record after the transition.
    pub updated: Registration,
    /// Whether the seat held by the stored record, if any, must be returned
    /// to the event.
    pub releases_seat: bool,
    /// Domain event to publish after commit.
    pub event_type: RegistrationEventType,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::{EventDraft, EventStatus};

    fn event(capacity: u32, auto_confirm: bool) -> Event {
        let Ok(mut event) = Event::from_draft(
            EventDraft {
                title: "Pottery class".to_string(),
                capacity,
                auto_confirm,
                ..EventDraft::default()
            },
            Utc::now(),
        ) else {
            panic!("valid draft");
        };
        event.status = EventStatus::Published;
        event
    }

    fn registration(status: RegistrationStatus) -> Registration {
        let mut reg = Registration::admitted(
            &event(10, false),
            AttendeeContact::new(serde_json::json!({"email": "ana@example.org"})),
            None,
            Utc::now(),
        );
        reg.status = status;
        reg
    }

    #[test]
    fn admission_respects_auto_confirm() {
        let contact = AttendeeContact::new(serde_json::json!({}));
        let pending = Registration::admitted(&event(3, false), contact.clone(), None, Utc::now());
        assert_eq!(pending.status, RegistrationStatus::Pending);
        assert!(pending.seat_held);

        let confirmed = Registration::admitted(&event(3, true), contact, None, Utc::now());
        assert_eq!(confirmed.status, RegistrationStatus::Confirmed);
    }

    #[test]
    fn unlimited_event_holds_no_seat() {
        let reg = Registration::admitted(
            &event(0, false),
            AttendeeContact::new(serde_json::json!({})),
            None,
            Utc::now(),
        );
        assert!(!reg.seat_held);
    }

    #[test]
    fn transition_table_is_total() {
        let allowed = [
            (RegistrationStatus::Pending, RegistrationStatus::Confirmed),
            (RegistrationStatus::Pending, RegistrationStatus::Cancelled),
            (RegistrationStatus::Confirmed, RegistrationStatus::Cancelled),
            (RegistrationStatus::Confirmed, RegistrationStatus::Attended),
            (RegistrationStatus::Confirmed, RegistrationStatus::NoShow),
        ];
        for from in RegistrationStatus::ALL {
            for to in RegistrationStatus::ALL {
                let reg = registration(from);
                let result = reg.plan_transition(to, "admin", Utc::now());
                if allowed.contains(&(from, to)) {
                    assert!(result.is_ok(), "{from} -> {to} should be allowed");
                } else {
                    let Err(AdmissionError::InvalidTransition { .. }) = result else {
                        panic!("{from} -> {to} should be rejected");
                    };
                }
            }
        }
    }

    #[test]
    fn only_cancelled_gives_up_its_seat() {
        for status in RegistrationStatus::ALL {
            assert_eq!(
                status.occupies_seat(),
                status != RegistrationStatus::Cancelled,
                "{status}"
            );
        }
    }

    #[test]
    fn cancellation_releases_held_seat() {
        let reg = registration(RegistrationStatus::Confirmed);
        let Ok(plan) = reg.plan_transition(RegistrationStatus::Cancelled, "ana", Utc::now()) else {
            panic!("cancel allowed");
        };
        assert!(plan.releases_seat);
        assert!(!plan.updated.seat_held);
        assert_eq!(plan.expected, RegistrationStatus::Confirmed);
        assert_eq!(plan.event_type, RegistrationEventType::Cancelled);
    }

    #[test]
    fn cancellation_frees_whatever_the_ledger_holds() {
        let mut reg = registration(RegistrationStatus::Pending);
        reg.seat_held = false;
        let Ok(plan) = reg.plan_transition(RegistrationStatus::Cancelled, "ana", Utc::now()) else {
            panic!("cancel allowed");
        };
        assert!(plan.releases_seat);
        assert!(!plan.updated.seat_held);
    }

    #[test]
    fn check_in_records_actor_and_time() {
        let reg = registration(RegistrationStatus::Confirmed);
        let now = Utc::now();
        let Ok(plan) = reg.plan_transition(RegistrationStatus::Attended, "door-1", now) else {
            panic!("check-in allowed");
        };
        assert_eq!(plan.updated.checked_in_at, Some(now));
        assert_eq!(plan.updated.checked_in_by.as_deref(), Some("door-1"));
        assert!(plan.updated.seat_held);
        assert_eq!(plan.event_type, RegistrationEventType::CheckedIn);
    }

    #[test]
    fn no_show_keeps_seat() {
        let reg = registration(RegistrationStatus::Confirmed);
        let Ok(plan) = reg.plan_transition(RegistrationStatus::NoShow, "system", Utc::now()) else {
            panic!("no-show allowed");
        };
        assert!(!plan.releases_seat);
        assert!(plan.updated.seat_held);
        assert_eq!(plan.updated.checked_in_at, None);
    }

    #[test]
    fn rejected_transition_leaves_record_untouched() {
        let reg = registration(RegistrationStatus::Attended);
        let before = reg.clone();
        assert!(
            reg.plan_transition(RegistrationStatus::Cancelled, "admin", Utc::now())
                .is_err()
        );
        assert_eq!(reg, before);
    }

    #[test]
    fn status_serializes_kebab_case() {
        let Ok(json) = serde_json::to_string(&RegistrationStatus::NoShow) else {
            panic!("serialization failed");
        };
        assert_eq!(json, "\"no-show\"");
        assert_eq!("no-show".parse::<RegistrationStatus>(), Ok(RegistrationStatus::NoShow));
    }
}
