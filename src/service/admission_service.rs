//! Admission service: seat reservation, registration lifecycle, and event
//! administration.

use std::sync::Arc;

use crate::config::RetryPolicy;
use crate::domain::{
    Admissibility, AttendeeContact, Clock, Event, EventDraft, EventId, EventPatch, EventStatus,
    NotificationDispatcher, PendingPolicy, Registration, RegistrationEvent, RegistrationEventType,
    RegistrationId, RegistrationStatus, SystemClock, Viability, is_admissible,
};
use crate::error::AdmissionError;
use crate::persistence::{
    AdmissionStore, ReleaseOutcome, ReserveOutcome, SeatRequest, StoreError, TransitionOutcome,
};
use crate::service::{ContactValidator, ObjectContactValidator};

/// Maximum accepted idempotency key length.
const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Orchestration layer for all admission operations.
///
/// Stateless coordinator: owns the [`AdmissionStore`] for state and a
/// [`NotificationDispatcher`] for domain events. Every mutation follows the
/// pattern: validate → plan → atomic commit (retrying conflicts) → publish
/// → return result.
#[derive(Debug, Clone)]
pub struct AdmissionService {
    store: Arc<dyn AdmissionStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    validator: Arc<dyn ContactValidator>,
    retry: RetryPolicy,
    default_pending_policy: PendingPolicy,
}

impl AdmissionService {
    /// Creates a service using the system clock, the default contact
    /// validator and the default retry policy.
    #[must_use]
    pub fn new(store: Arc<dyn AdmissionStore>, dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self {
            store,
            dispatcher,
            clock: Arc::new(SystemClock),
            validator: Arc::new(ObjectContactValidator),
            retry: RetryPolicy::default(),
            default_pending_policy: PendingPolicy::default(),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the contact validator.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn ContactValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Replaces the conflict retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the pending policy used when event creation omits one.
    #[must_use]
    pub const fn with_default_pending_policy(mut self, policy: PendingPolicy) -> Self {
        self.default_pending_policy = policy;
        self
    }

    /// Pending policy applied to new events that do not specify one.
    #[must_use]
    pub const fn default_pending_policy(&self) -> PendingPolicy {
        self.default_pending_policy
    }

    // ── Event administration ────────────────────────────────────────────

    /// Creates a new event in `draft`.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::InvalidRequest`] for an inconsistent draft,
    /// or an infrastructure error from storage.
    pub async fn create_event(&self, draft: EventDraft) -> Result<Event, AdmissionError> {
        let event = Event::from_draft(draft, self.clock.now())?;
        self.store.insert_event(&event).await?;
        tracing::info!(event_id = %event.id, capacity = event.capacity, "event created");
        Ok(event)
    }

    /// Loads an event.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] if no such event exists.
    pub async fn get_event(&self, event_id: EventId) -> Result<Event, AdmissionError> {
        self.store
            .get_event(event_id)
            .await?
            .ok_or(AdmissionError::EventNotFound(event_id))
    }

    /// Lists all events, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error from storage.
    pub async fn list_events(&self) -> Result<Vec<Event>, AdmissionError> {
        Ok(self.store.list_events().await?)
    }

    /// Updates event metadata.
    ///
    /// The seat counter only changes when an unlimited event gets a
    /// capacity: its uncancelled registrations then claim seats.
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::EventNotFound`] if no such event exists.
    /// - [`AdmissionError::InvalidTransition`] on terminal events.
    /// - [`AdmissionError::InvalidRequest`] for inconsistent values or a
    ///   capacity below the held seats (or, for a formerly unlimited
    ///   event, below its uncancelled registrations).
    /// - [`AdmissionError::Unavailable`] if concurrent changes exhaust the
    ///   retry budget.
    pub async fn update_event(
        &self,
        event_id: EventId,
        patch: EventPatch,
    ) -> Result<Event, AdmissionError> {
        for attempt in 1..=self.retry.max_attempts {
            let mut event = self.get_event(event_id).await?;
            let was_unlimited = event.is_unlimited();
            event.apply_patch(patch.clone(), self.clock.now())?;
            if was_unlimited && !event.is_unlimited() {
                let occupied = self
                    .store
                    .list_registrations(event_id)
                    .await?
                    .iter()
                    .filter(|r| r.status.occupies_seat())
                    .count();
                if u32::try_from(occupied).unwrap_or(u32::MAX) > event.capacity {
                    return Err(AdmissionError::InvalidRequest(format!(
                        "capacity {} is below {occupied} existing registrations",
                        event.capacity
                    )));
                }
            }
            if let Some(updated) = self.store.update_metadata(&event).await? {
                tracing::info!(%event_id, capacity = updated.capacity, "event updated");
                return Ok(updated);
            }
            tracing::warn!(%event_id, attempt, "event changed during update, retrying");
            self.backoff(attempt).await;
        }
        Err(AdmissionError::Unavailable(format!(
            "event {event_id} kept changing during update"
        )))
    }

    /// Opens a draft event for registration.
    ///
    /// # Errors
    ///
    /// See [`AdmissionService::update_event`]; invalid status moves return
    /// [`AdmissionError::InvalidTransition`].
    pub async fn publish_event(&self, event_id: EventId) -> Result<Event, AdmissionError> {
        self.change_event_status(event_id, EventStatus::Published).await
    }

    /// Cancels a draft or published event. Registrations keep their state.
    ///
    /// # Errors
    ///
    /// See [`AdmissionService::publish_event`].
    pub async fn cancel_event(&self, event_id: EventId) -> Result<Event, AdmissionError> {
        self.change_event_status(event_id, EventStatus::Cancelled).await
    }

    /// Marks a published event as completed, then moves every `confirmed`
    /// registration to `no-show`. Returns the event and the number of
    /// registrations marked.
    ///
    /// # Errors
    ///
    /// See [`AdmissionService::publish_event`].
    pub async fn complete_event(
        &self,
        event_id: EventId,
        actor: &str,
    ) -> Result<(Event, usize), AdmissionError> {
        validate_actor(actor)?;
        self.change_event_status(event_id, EventStatus::Completed).await?;

        let mut marked = 0;
        for registration in self.store.list_registrations(event_id).await? {
            if registration.status != RegistrationStatus::Confirmed {
                continue;
            }
            match self
                .transition(registration.id, RegistrationStatus::NoShow, actor)
                .await
            {
                Ok(_) => marked += 1,
                // Checked in or cancelled concurrently.
                Err(AdmissionError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        tracing::info!(%event_id, marked, "event completed, no-shows recorded");

        let event = self.get_event(event_id).await?;
        Ok((event, marked))
    }

    async fn change_event_status(
        &self,
        event_id: EventId,
        target: EventStatus,
    ) -> Result<Event, AdmissionError> {
        for attempt in 1..=self.retry.max_attempts {
            let event = self.get_event(event_id).await?;
            if !event.status.can_transition_to(target) {
                return Err(AdmissionError::InvalidTransition {
                    from: event.status.to_string(),
                    to: target.to_string(),
                });
            }
            if let Some(updated) = self
                .store
                .set_status(event_id, event.status, target, self.clock.now())
                .await?
            {
                tracing::info!(%event_id, from = %event.status, to = %target, "event status changed");
                return Ok(updated);
            }
            self.backoff(attempt).await;
        }
        Err(AdmissionError::Unavailable(format!(
            "event {event_id} kept changing during status update"
        )))
    }

    /// Organizer-facing attendance viability (informational only).
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] if no such event exists.
    pub async fn viability(&self, event_id: EventId) -> Result<(Event, Viability), AdmissionError> {
        let event = self.get_event(event_id).await?;
        let registrations = self.store.list_registrations(event_id).await?;
        let active = registrations
            .iter()
            .filter(|r| r.status.is_active())
            .count();
        let active = u32::try_from(active).unwrap_or(u32::MAX);
        let viability = Viability::evaluate(&event, active);
        Ok((event, viability))
    }

    // ── Admission ───────────────────────────────────────────────────────

    /// Non-binding admissibility hint for display layers.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] if no such event exists.
    pub async fn check_admissible(&self, event_id: EventId) -> Result<Admissibility, AdmissionError> {
        let event = self.get_event(event_id).await?;
        Ok(Admissibility::from(is_admissible(&event, self.clock.now())))
    }

    /// Attempts to admit one attendee, reserving a seat atomically.
    ///
    /// With an idempotency key, a retry carrying the same contact returns
    /// the original registration without side effects.
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::InvalidRequest`] for a rejected contact or key.
    /// - [`AdmissionError::EventNotFound`], [`AdmissionError::EventNotOpen`],
    ///   [`AdmissionError::DeadlinePassed`], [`AdmissionError::SoldOut`].
    /// - [`AdmissionError::DuplicateRequest`] if the key was used with a
    ///   different contact.
    /// - [`AdmissionError::Unavailable`] / [`AdmissionError::Unknown`] on
    ///   infrastructure failure.
    pub async fn register(
        &self,
        event_id: EventId,
        attendee_contact: AttendeeContact,
        idempotency_key: Option<String>,
    ) -> Result<Registration, AdmissionError> {
        self.validator
            .validate(&attendee_contact)
            .map_err(AdmissionError::InvalidRequest)?;
        if let Some(key) = idempotency_key.as_deref() {
            validate_idempotency_key(key)?;
        }

        let request = SeatRequest {
            event_id,
            attendee_contact,
            idempotency_key,
        };

        for attempt in 1..=self.retry.max_attempts {
            let outcome = self.store.reserve_seat(request.clone(), self.clock.now()).await;
            match outcome {
                Ok(ReserveOutcome::Admitted {
                    registration,
                    event,
                }) => {
                    tracing::info!(
                        %event_id,
                        registration_id = %registration.id,
                        status = %registration.status,
                        seats_reserved = event.seats_reserved,
                        capacity = event.capacity,
                        "registration admitted"
                    );
                    self.publish(RegistrationEventType::Registered, &registration, event);
                    return Ok(registration);
                }
                Ok(ReserveOutcome::Replayed { registration }) => {
                    if registration.attendee_contact != request.attendee_contact {
                        return Err(AdmissionError::DuplicateRequest(format!(
                            "idempotency key already used for registration {}",
                            registration.id
                        )));
                    }
                    tracing::debug!(%event_id, registration_id = %registration.id, "registration replayed");
                    return Ok(registration);
                }
                Ok(ReserveOutcome::Rejected(reason)) => {
                    tracing::info!(%event_id, ?reason, "registration rejected");
                    return Err(reason.into());
                }
                Ok(ReserveOutcome::EventNotFound) => {
                    return Err(AdmissionError::EventNotFound(event_id));
                }
                Err(StoreError::Conflict(msg)) => {
                    tracing::warn!(%event_id, attempt, error = %msg, "seat reservation conflict");
                    self.backoff(attempt).await;
                }
                Err(e) => {
                    if matches!(e, StoreError::Ambiguous(_)) {
                        tracing::warn!(%event_id, error = %e, "seat reservation outcome unknown");
                    }
                    return Err(e.into());
                }
            }
        }

        Err(AdmissionError::Unavailable(format!(
            "seat reservation for event {event_id} conflicted {} times",
            self.retry.max_attempts
        )))
    }

    /// Returns the seat held by a registration to its event. A second call
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::RegistrationNotFound`] if no such
    /// registration exists, or an infrastructure error.
    pub async fn release_seat(
        &self,
        registration_id: RegistrationId,
    ) -> Result<Registration, AdmissionError> {
        for attempt in 1..=self.retry.max_attempts {
            match self
                .store
                .release_seat(registration_id, self.clock.now())
                .await
            {
                Ok(ReleaseOutcome::Released {
                    registration,
                    event,
                }) => {
                    tracing::info!(
                        %registration_id,
                        event_id = %event.id,
                        seats_reserved = event.seats_reserved,
                        "seat released"
                    );
                    return Ok(registration);
                }
                Ok(ReleaseOutcome::NotHeld(registration)) => {
                    tracing::debug!(%registration_id, "seat already released");
                    return Ok(registration);
                }
                Ok(ReleaseOutcome::NotFound) => {
                    return Err(AdmissionError::RegistrationNotFound(registration_id));
                }
                Err(StoreError::Conflict(msg)) => {
                    tracing::warn!(%registration_id, attempt, error = %msg, "seat release conflict");
                    self.backoff(attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(AdmissionError::Unavailable(format!(
            "seat release for registration {registration_id} kept conflicting"
        )))
    }

    // ── Registration lifecycle ──────────────────────────────────────────

    /// Moves a registration to `target`, the single writer of registration
    /// status. Cancellation releases the held seat in the same commit.
    ///
    /// # Errors
    ///
    /// - [`AdmissionError::RegistrationNotFound`] if no such registration.
    /// - [`AdmissionError::InvalidTransition`] for pairs outside the
    ///   transition table; the registration is left unchanged.
    /// - [`AdmissionError::InvalidRequest`] for an empty actor.
    /// - Infrastructure errors from storage.
    pub async fn transition(
        &self,
        registration_id: RegistrationId,
        target: RegistrationStatus,
        actor: &str,
    ) -> Result<Registration, AdmissionError> {
        validate_actor(actor)?;

        for attempt in 1..=self.retry.max_attempts {
            let current = self.get_registration(registration_id).await?;
            let now = self.clock.now();
            let plan = current.plan_transition(target, actor, now)?;

            match self.store.commit_transition(&plan, now).await {
                Ok(TransitionOutcome::Committed {
                    registration,
                    event,
                }) => {
                    tracing::info!(
                        %registration_id,
                        event_id = %event.id,
                        from = %plan.expected,
                        to = %registration.status,
                        actor,
                        seats_reserved = event.seats_reserved,
                        "registration transitioned"
                    );
                    self.publish(plan.event_type, &registration, event);
                    return Ok(registration);
                }
                Ok(TransitionOutcome::Stale(latest)) => {
                    tracing::debug!(
                        %registration_id,
                        expected = %plan.expected,
                        found = %latest.status,
                        "registration changed concurrently, re-planning"
                    );
                }
                Ok(TransitionOutcome::NotFound) => {
                    return Err(AdmissionError::RegistrationNotFound(registration_id));
                }
                Err(StoreError::Conflict(msg)) => {
                    tracing::warn!(%registration_id, attempt, error = %msg, "transition conflict");
                    self.backoff(attempt).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(AdmissionError::Unavailable(format!(
            "registration {registration_id} kept changing during transition"
        )))
    }

    /// Cancels every `pending` registration of an event whose pending
    /// policy is `release_at_deadline` and whose deadline has passed.
    /// Returns the number cancelled; zero under `hold_seat`.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] if no such event exists, or
    /// an infrastructure error.
    pub async fn release_expired_pending(
        &self,
        event_id: EventId,
        actor: &str,
    ) -> Result<usize, AdmissionError> {
        validate_actor(actor)?;
        let event = self.get_event(event_id).await?;
        if event.pending_policy != PendingPolicy::ReleaseAtDeadline {
            return Ok(0);
        }
        let Some(deadline) = event.effective_deadline() else {
            return Ok(0);
        };
        if self.clock.now() <= deadline {
            return Ok(0);
        }

        let mut released = 0;
        for registration in self.store.list_registrations(event_id).await? {
            if registration.status != RegistrationStatus::Pending {
                continue;
            }
            match self
                .transition(registration.id, RegistrationStatus::Cancelled, actor)
                .await
            {
                Ok(_) => released += 1,
                Err(AdmissionError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        tracing::info!(%event_id, released, "expired pending registrations released");
        Ok(released)
    }

    /// Loads a registration.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::RegistrationNotFound`] if no such
    /// registration exists.
    pub async fn get_registration(
        &self,
        registration_id: RegistrationId,
    ) -> Result<Registration, AdmissionError> {
        self.store
            .get_registration(registration_id)
            .await?
            .ok_or(AdmissionError::RegistrationNotFound(registration_id))
    }

    /// Lists an event's registrations, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::EventNotFound`] if no such event exists.
    pub async fn list_registrations(
        &self,
        event_id: EventId,
    ) -> Result<Vec<Registration>, AdmissionError> {
        self.get_event(event_id).await?;
        Ok(self.store.list_registrations(event_id).await?)
    }

    fn publish(&self, event_type: RegistrationEventType, registration: &Registration, event: Event) {
        self.dispatcher.publish(RegistrationEvent::new(
            event_type,
            registration.clone(),
            event,
            self.clock.now(),
        ));
    }

    async fn backoff(&self, attempt: u32) {
        if attempt < self.retry.max_attempts && !self.retry.backoff.is_zero() {
            tokio::time::sleep(self.retry.backoff.saturating_mul(attempt)).await;
        }
    }
}

fn validate_actor(actor: &str) -> Result<(), AdmissionError> {
    if actor.trim().is_empty() {
        return Err(AdmissionError::InvalidRequest("actor must not be empty".to_string()));
    }
    Ok(())
}

fn validate_idempotency_key(key: &str) -> Result<(), AdmissionError> {
    if key.trim().is_empty() || key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(AdmissionError::InvalidRequest(format!(
            "idempotency key must be 1 to {MAX_IDEMPOTENCY_KEY_LEN} characters"
        )));
    }
    Ok(())
}
