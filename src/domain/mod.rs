//! Domain layer: events, registrations, admission rules, and notifications.
//!
//! Everything here is storage-agnostic. The eligibility evaluator and the
//! registration state machine are pure; the seat counter is only ever
//! changed by a [`crate::persistence::SeatLedger`].

pub mod clock;
pub mod eligibility;
pub mod event;
pub mod event_bus;
pub mod ids;
pub mod registration;
pub mod registration_event;

pub use clock::{Clock, FixedClock, SystemClock};
pub use eligibility::{Admissibility, RejectionReason, is_admissible};
pub use event::{Event, EventDraft, EventPatch, EventStatus, PendingPolicy, Viability};
pub use event_bus::{EventBus, NotificationDispatcher};
pub use ids::{EventId, RegistrationId};
pub use registration::{AttendeeContact, Registration, RegistrationStatus, TransitionPlan};
pub use registration_event::{RegistrationEvent, RegistrationEventType};
