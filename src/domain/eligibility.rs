//! Event-level admissibility: status, deadline and capacity.
//!
//! [`is_admissible`] is pure. It is consulted inside the atomic seat
//! reservation (authoritative) and exposed standalone so display layers can
//! pre-check an event without attempting a reservation (non-binding).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Event, EventStatus};

/// Why an event does not currently admit registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    /// The event is not `published`.
    EventNotOpen,
    /// The effective deadline is in the past.
    DeadlinePassed,
    /// All seats are held.
    SoldOut,
}

/// Evaluates the admission rules in order; the first failing rule wins.
///
/// 1. status is not `published` → [`RejectionReason::EventNotOpen`]
/// 2. `now` is after the effective deadline → [`RejectionReason::DeadlinePassed`]
/// 3. capacity is bounded and fully held → [`RejectionReason::SoldOut`]
///
/// # Errors
///
/// Returns the first [`RejectionReason`] that applies.
pub fn is_admissible(event: &Event, now: DateTime<Utc>) -> Result<(), RejectionReason> {
    if event.status != EventStatus::Published {
        return Err(RejectionReason::EventNotOpen);
    }
    if let Some(deadline) = event.effective_deadline()
        && now > deadline
    {
        return Err(RejectionReason::DeadlinePassed);
    }
    if !event.is_unlimited() && event.seats_reserved >= event.capacity {
        return Err(RejectionReason::SoldOut);
    }
    Ok(())
}

/// Non-binding admissibility hint returned to display layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Admissibility {
    /// Whether a registration attempt would currently pass the checks.
    pub admissible: bool,
    /// Reason when not admissible.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
}

impl From<Result<(), RejectionReason>> for Admissibility {
    fn from(result: Result<(), RejectionReason>) -> Self {
        match result {
            Ok(()) => Self {
                admissible: true,
                reason: None,
            },
            Err(reason) => Self {
                admissible: false,
                reason: Some(reason),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::EventDraft;
    use chrono::Duration;

    fn published(capacity: u32, now: DateTime<Utc>) -> Event {
        let Ok(mut event) = Event::from_draft(
            EventDraft {
                title: "Night market".to_string(),
                capacity,
                registration_deadline: Some(now + Duration::hours(1)),
                ..EventDraft::default()
            },
            now,
        ) else {
            panic!("valid draft");
        };
        event.status = EventStatus::Published;
        event
    }

    #[test]
    fn open_event_is_admissible() {
        let now = Utc::now();
        assert_eq!(is_admissible(&published(5, now), now), Ok(()));
    }

    #[test]
    fn non_published_is_not_open() {
        let now = Utc::now();
        for status in [
            EventStatus::Draft,
            EventStatus::Cancelled,
            EventStatus::Completed,
        ] {
            let mut event = published(5, now);
            event.status = status;
            assert_eq!(is_admissible(&event, now), Err(RejectionReason::EventNotOpen));
        }
    }

    #[test]
    fn deadline_is_inclusive() {
        let now = Utc::now();
        let mut event = published(5, now);
        event.registration_deadline = Some(now);
        assert_eq!(is_admissible(&event, now), Ok(()));
        assert_eq!(
            is_admissible(&event, now + Duration::milliseconds(1)),
            Err(RejectionReason::DeadlinePassed)
        );
    }

    #[test]
    fn start_time_closes_registration_without_deadline() {
        let now = Utc::now();
        let mut event = published(5, now);
        event.registration_deadline = None;
        event.starts_at = Some(now - Duration::minutes(5));
        assert_eq!(is_admissible(&event, now), Err(RejectionReason::DeadlinePassed));
    }

    #[test]
    fn full_event_is_sold_out() {
        let now = Utc::now();
        let mut event = published(2, now);
        event.seats_reserved = 2;
        assert_eq!(is_admissible(&event, now), Err(RejectionReason::SoldOut));
    }

    #[test]
    fn unlimited_never_sells_out() {
        let now = Utc::now();
        let mut event = published(0, now);
        event.seats_reserved = 0;
        assert_eq!(is_admissible(&event, now), Ok(()));
    }

    #[test]
    fn status_checked_before_deadline_and_capacity() {
        let now = Utc::now();
        let mut event = published(1, now);
        event.status = EventStatus::Draft;
        event.seats_reserved = 1;
        event.registration_deadline = Some(now - Duration::days(1));
        assert_eq!(is_admissible(&event, now), Err(RejectionReason::EventNotOpen));

        event.status = EventStatus::Published;
        assert_eq!(is_admissible(&event, now), Err(RejectionReason::DeadlinePassed));
    }

    #[test]
    fn hint_reports_reason() {
        let hint = Admissibility::from(Err(RejectionReason::SoldOut));
        assert!(!hint.admissible);
        assert_eq!(hint.reason, Some(RejectionReason::SoldOut));
        let Ok(json) = serde_json::to_string(&hint) else {
            panic!("serialization failed");
        };
        assert!(json.contains("SOLD_OUT"));
    }
}
