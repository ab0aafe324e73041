//! In-memory admission store with per-event fine-grained locking.
//!
//! Each event and its registrations live in one [`EventLedger`] behind its
//! own [`tokio::sync::Mutex`]. Holding that mutex is the row-level lock: the
//! admission check, counter increment, and registration insert for one event
//! are serialized, while different events proceed concurrently.
//!
//! Faults can be queued with [`MemoryStore::inject_fault`] to exercise retry
//! and reconciliation paths deterministically.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use super::{
    EventRepository, RegistrationRepository, ReleaseOutcome, ReserveOutcome, SeatLedger,
    SeatRequest, StoreError, TransitionOutcome,
};
use crate::domain::{
    Event, EventId, EventStatus, Registration, RegistrationId, TransitionPlan, is_admissible,
};

/// One event together with everything that counts against its seats.
#[derive(Debug)]
struct EventLedger {
    event: Event,
    registrations: HashMap<RegistrationId, Registration>,
    idempotency: HashMap<String, RegistrationId>,
}

impl EventLedger {
    fn new(event: Event) -> Self {
        Self {
            event,
            registrations: HashMap::new(),
            idempotency: HashMap::new(),
        }
    }

    fn release(&mut self, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.event.seats_reserved = self.event.seats_reserved.checked_sub(1).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "seat counter underflow for event {}",
                self.event.id
            ))
        })?;
        self.event.updated_at = now;
        Ok(())
    }
}

/// In-memory [`AdmissionStore`](super::AdmissionStore).
///
/// # Concurrency
///
/// - Seat operations on the same event are serialized.
/// - Seat operations on different events are concurrent.
/// - The registration index is a synchronous lock and is never held across
///   an `.await`. A reservation takes it before its first write, so a
///   cancelled call either admits fully (indexed) or not at all.
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: RwLock<HashMap<EventId, Arc<Mutex<EventLedger>>>>,
    index: std::sync::RwLock<HashMap<RegistrationId, EventId>>,
    faults: std::sync::Mutex<VecDeque<StoreError>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a fault returned by the next seat-ledger call.
    ///
    /// [`StoreError::Ambiguous`] is special: the write is applied and the
    /// error is returned afterwards, mimicking a lost commit acknowledgement.
    pub fn inject_fault(&self, fault: StoreError) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push_back(fault);
        }
    }

    fn take_fault(&self) -> Option<StoreError> {
        self.faults.lock().ok().and_then(|mut faults| faults.pop_front())
    }

    /// Pops a queued fault. Returns `Err` for faults that abort before
    /// writing and `Ok(Some(_))` for a deferred ambiguous outcome.
    fn before_write(&self) -> Result<Option<StoreError>, StoreError> {
        match self.take_fault() {
            None => Ok(None),
            Some(fault @ StoreError::Ambiguous(_)) => Ok(Some(fault)),
            Some(fault) => Err(fault),
        }
    }

    async fn ledger(&self, id: EventId) -> Option<Arc<Mutex<EventLedger>>> {
        self.events.read().await.get(&id).cloned()
    }

    async fn ledger_for_registration(
        &self,
        id: RegistrationId,
    ) -> Option<Arc<Mutex<EventLedger>>> {
        let event_id = self
            .index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()?;
        self.ledger(event_id).await
    }
}

fn finish<T>(value: T, deferred: Option<StoreError>) -> Result<T, StoreError> {
    match deferred {
        Some(fault) => Err(fault),
        None => Ok(value),
    }
}

#[async_trait]
impl EventRepository for MemoryStore {
    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        let mut map = self.events.write().await;
        if map.contains_key(&event.id) {
            return Err(StoreError::Conflict(format!("event {} already exists", event.id)));
        }
        map.insert(event.id, Arc::new(Mutex::new(EventLedger::new(event.clone()))));
        Ok(())
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError> {
        let Some(slot) = self.ledger(id).await else {
            return Ok(None);
        };
        let ledger = slot.lock().await;
        Ok(Some(ledger.event.clone()))
    }

    async fn list_events(&self) -> Result<Vec<Event>, StoreError> {
        let map = self.events.read().await;
        let mut events = Vec::with_capacity(map.len());
        for slot in map.values() {
            events.push(slot.lock().await.event.clone());
        }
        events.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn update_metadata(&self, event: &Event) -> Result<Option<Event>, StoreError> {
        let Some(slot) = self.ledger(event.id).await else {
            return Ok(None);
        };
        let mut ledger = slot.lock().await;
        if ledger.event.status != event.status {
            return Ok(None);
        }
        let claiming = ledger.event.is_unlimited() && !event.is_unlimited();
        let held = if claiming {
            let occupied = ledger
                .registrations
                .values()
                .filter(|r| r.status.occupies_seat())
                .count();
            u32::try_from(occupied).map_err(|_| {
                StoreError::Corrupt(format!(
                    "registration count overflow for event {}",
                    event.id
                ))
            })?
        } else {
            ledger.event.seats_reserved
        };
        if held > 0 && (event.is_unlimited() || event.capacity < held) {
            return Ok(None);
        }

        let ledger = &mut *ledger;
        if claiming {
            for registration in ledger.registrations.values_mut() {
                if registration.status.occupies_seat() {
                    registration.seat_held = true;
                }
            }
        }
        let stored = &mut ledger.event;
        stored.seats_reserved = held;
        stored.title.clone_from(&event.title);
        stored.capacity = event.capacity;
        stored.registration_deadline = event.registration_deadline;
        stored.starts_at = event.starts_at;
        stored.min_attendees = event.min_attendees;
        stored.max_attendees = event.max_attendees;
        stored.auto_confirm = event.auto_confirm;
        stored.pending_policy = event.pending_policy;
        stored.updated_at = event.updated_at;
        Ok(Some(stored.clone()))
    }

    async fn set_status(
        &self,
        id: EventId,
        from: EventStatus,
        to: EventStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Event>, StoreError> {
        let Some(slot) = self.ledger(id).await else {
            return Ok(None);
        };
        let mut ledger = slot.lock().await;
        if ledger.event.status != from {
            return Ok(None);
        }
        ledger.event.status = to;
        ledger.event.updated_at = now;
        Ok(Some(ledger.event.clone()))
    }
}

#[async_trait]
impl RegistrationRepository for MemoryStore {
    async fn get_registration(
        &self,
        id: RegistrationId,
    ) -> Result<Option<Registration>, StoreError> {
        let Some(slot) = self.ledger_for_registration(id).await else {
            return Ok(None);
        };
        let ledger = slot.lock().await;
        Ok(ledger.registrations.get(&id).cloned())
    }

    async fn list_registrations(&self, event_id: EventId) -> Result<Vec<Registration>, StoreError> {
        let Some(slot) = self.ledger(event_id).await else {
            return Ok(Vec::new());
        };
        let ledger = slot.lock().await;
        let mut registrations: Vec<_> = ledger.registrations.values().cloned().collect();
        registrations.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(registrations)
    }

    async fn find_by_idempotency_key(
        &self,
        event_id: EventId,
        key: &str,
    ) -> Result<Option<Registration>, StoreError> {
        let Some(slot) = self.ledger(event_id).await else {
            return Ok(None);
        };
        let ledger = slot.lock().await;
        Ok(ledger
            .idempotency
            .get(key)
            .and_then(|id| ledger.registrations.get(id))
            .cloned())
    }
}

#[async_trait]
impl SeatLedger for MemoryStore {
    async fn reserve_seat(
        &self,
        request: SeatRequest,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome, StoreError> {
        let deferred = self.before_write()?;
        let Some(slot) = self.ledger(request.event_id).await else {
            return finish(ReserveOutcome::EventNotFound, deferred);
        };
        let mut ledger = slot.lock().await;

        if let Some(key) = request.idempotency_key.as_deref()
            && let Some(existing) = ledger
                .idempotency
                .get(key)
                .and_then(|id| ledger.registrations.get(id))
        {
            return finish(
                ReserveOutcome::Replayed {
                    registration: existing.clone(),
                },
                deferred,
            );
        }

        if let Err(reason) = is_admissible(&ledger.event, now) {
            return finish(ReserveOutcome::Rejected(reason), deferred);
        }

        let registration = Registration::admitted(
            &ledger.event,
            request.attendee_contact,
            request.idempotency_key,
            now,
        );
        // No await past this point: the write below is all-or-nothing.
        let mut index = self.index.write().unwrap_or_else(PoisonError::into_inner);
        if registration.seat_held {
            ledger.event.seats_reserved =
                ledger.event.seats_reserved.checked_add(1).ok_or_else(|| {
                    StoreError::Corrupt(format!(
                        "seat counter overflow for event {}",
                        request.event_id
                    ))
                })?;
            ledger.event.updated_at = now;
        }
        if let Some(key) = registration.idempotency_key.clone() {
            ledger.idempotency.insert(key, registration.id);
        }
        ledger.registrations.insert(registration.id, registration.clone());
        index.insert(registration.id, request.event_id);
        drop(index);

        let event = ledger.event.clone();
        finish(ReserveOutcome::Admitted { registration, event }, deferred)
    }

    async fn release_seat(
        &self,
        id: RegistrationId,
        now: DateTime<Utc>,
    ) -> Result<ReleaseOutcome, StoreError> {
        let deferred = self.before_write()?;
        let Some(slot) = self.ledger_for_registration(id).await else {
            return finish(ReleaseOutcome::NotFound, deferred);
        };
        let mut ledger = slot.lock().await;
        let Some(current) = ledger.registrations.get(&id).cloned() else {
            return finish(ReleaseOutcome::NotFound, deferred);
        };
        if !current.seat_held {
            return finish(ReleaseOutcome::NotHeld(current), deferred);
        }

        ledger.release(now)?;
        let mut registration = current;
        registration.seat_held = false;
        ledger.registrations.insert(id, registration.clone());

        let event = ledger.event.clone();
        finish(ReleaseOutcome::Released { registration, event }, deferred)
    }

    async fn commit_transition(
        &self,
        plan: &TransitionPlan,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, StoreError> {
        let deferred = self.before_write()?;
        let id = plan.updated.id;
        let Some(slot) = self.ledger_for_registration(id).await else {
            return finish(TransitionOutcome::NotFound, deferred);
        };
        let mut ledger = slot.lock().await;
        let Some(current) = ledger.registrations.get(&id).cloned() else {
            return finish(TransitionOutcome::NotFound, deferred);
        };
        if current.status != plan.expected {
            return finish(TransitionOutcome::Stale(current), deferred);
        }

        let mut registration = plan.updated.clone();
        if plan.releases_seat {
            if current.seat_held {
                ledger.release(now)?;
            }
            registration.seat_held = false;
        } else {
            registration.seat_held = current.seat_held;
        }
        ledger.registrations.insert(id, registration.clone());

        let event = ledger.event.clone();
        finish(TransitionOutcome::Committed { registration, event }, deferred)
    }
}
