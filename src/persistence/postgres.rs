//! PostgreSQL implementation of the admission store.
//!
//! Seat reservation is a single conditional `UPDATE ... WHERE seats_reserved
//! < capacity` executed in the same transaction as the registration insert.
//! Status changes lock the registration row (`FOR UPDATE`) and compare the
//! stored status before writing.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::models::{EventRow, RegistrationRow, to_db};
use super::{
    EventRepository, RegistrationRepository, ReleaseOutcome, ReserveOutcome, SeatLedger,
    SeatRequest, StoreError, TransitionOutcome,
};
use crate::config::AdmissionConfig;
use crate::domain::{
    Event, EventId, EventStatus, Registration, RegistrationEvent, RegistrationId, TransitionPlan,
    is_admissible,
};

const EVENT_COLUMNS: &str = "id, title, capacity, seats_reserved, registration_deadline, \
     starts_at, status, min_attendees, max_attendees, auto_confirm, pending_policy, \
     created_at, updated_at";

const REGISTRATION_COLUMNS: &str = "id, event_id, attendee_contact, status, seat_held, \
     idempotency_key, created_at, status_changed_at, status_changed_by, checked_in_at, \
     checked_in_by";

/// PostgreSQL-backed admission store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new store with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the database is unreachable.
    pub async fn connect(config: &AdmissionConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database_max_connections)
            .min_connections(config.database_min_connections)
            .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self::new(pool))
    }

    /// Applies the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    /// Appends a domain event to the audit log.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure.
    pub async fn append_audit(&self, event: &RegistrationEvent) -> Result<i64, StoreError> {
        let payload =
            serde_json::to_value(event).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO registration_events (event_id, registration_id, event_type, payload) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(*event.event_id().as_uuid())
        .bind(*event.registration_id().as_uuid())
        .bind(event.event_type.as_str())
        .bind(&payload)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }

    /// Spawns a task that appends every event received from `rx` to the
    /// audit log until the channel closes.
    #[must_use]
    pub fn spawn_audit_writer(
        self,
        mut rx: broadcast::Receiver<RegistrationEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = self.append_audit(&event).await {
                            tracing::error!(
                                error = %e,
                                registration_id = %event.registration_id(),
                                event_type = %event.event_type,
                                "failed to append audit event"
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "audit writer lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool.begin().await.map_err(classify)
    }
}

/// Maps a `sqlx` error onto the retry taxonomy.
fn classify(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            // serialization_failure, deadlock_detected, unique_violation
            Some("40001" | "40P01" | "23505") => StoreError::Conflict(err.to_string()),
            _ => StoreError::Unavailable(err.to_string()),
        },
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::TypeNotFound { .. } => StoreError::Corrupt(err.to_string()),
        _ => StoreError::Unavailable(err.to_string()),
    }
}

/// Commits a transaction. Transport failures at this point leave the
/// outcome unknown and are reported as [`StoreError::Ambiguous`].
async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), StoreError> {
    tx.commit().await.map_err(|e| match classify(e) {
        StoreError::Unavailable(msg) => StoreError::Ambiguous(msg),
        other => other,
    })
}

async fn rollback(tx: Transaction<'static, Postgres>) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "rollback failed");
    }
}

async fn lock_registration(
    tx: &mut Transaction<'static, Postgres>,
    id: RegistrationId,
) -> Result<Option<Registration>, StoreError> {
    let sql = format!("SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1 FOR UPDATE");
    sqlx::query_as::<_, RegistrationRow>(&sql)
        .bind(*id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(classify)?
        .map(Registration::try_from)
        .transpose()
}

async fn decrement_seat(
    tx: &mut Transaction<'static, Postgres>,
    event_id: EventId,
    now: DateTime<Utc>,
) -> Result<Event, StoreError> {
    let sql = format!(
        "UPDATE events SET seats_reserved = seats_reserved - 1, updated_at = $2 \
         WHERE id = $1 AND seats_reserved > 0 RETURNING {EVENT_COLUMNS}"
    );
    let row = sqlx::query_as::<_, EventRow>(&sql)
        .bind(*event_id.as_uuid())
        .bind(now)
        .fetch_optional(&mut **tx)
        .await
        .map_err(classify)?
        .ok_or_else(|| StoreError::Corrupt(format!("seat counter underflow for event {event_id}")))?;
    Event::try_from(row)
}

async fn load_event(
    tx: &mut Transaction<'static, Postgres>,
    event_id: EventId,
    lock: &str,
) -> Result<Option<Event>, StoreError> {
    let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 {lock}");
    sqlx::query_as::<_, EventRow>(&sql)
        .bind(*event_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(classify)?
        .map(Event::try_from)
        .transpose()
}

#[async_trait]
impl EventRepository for PostgresStore {
    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO events (id, title, capacity, seats_reserved, registration_deadline, \
             starts_at, status, min_attendees, max_attendees, auto_confirm, pending_policy, \
             created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(*event.id.as_uuid())
        .bind(&event.title)
        .bind(to_db(event.capacity, "capacity")?)
        .bind(to_db(event.seats_reserved, "seats_reserved")?)
        .bind(event.registration_deadline)
        .bind(event.starts_at)
        .bind(event.status.as_str())
        .bind(event.min_attendees.map(|v| to_db(v, "min_attendees")).transpose()?)
        .bind(event.max_attendees.map(|v| to_db(v, "max_attendees")).transpose()?)
        .bind(event.auto_confirm)
        .bind(event.pending_policy.as_str())
        .bind(event.created_at)
        .bind(event.updated_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        sqlx::query_as::<_, EventRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?
            .map(Event::try_from)
            .transpose()
    }

    async fn list_events(&self) -> Result<Vec<Event>, StoreError> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY created_at, id");
        sqlx::query_as::<_, EventRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?
            .into_iter()
            .map(Event::try_from)
            .collect()
    }

    async fn update_metadata(&self, event: &Event) -> Result<Option<Event>, StoreError> {
        let mut tx = self.begin().await?;
        // FOR UPDATE waits out unlimited-capacity inserts holding FOR SHARE.
        let Some(stored) = load_event(&mut tx, event.id, "FOR UPDATE").await? else {
            rollback(tx).await;
            return Ok(None);
        };
        if stored.status != event.status {
            rollback(tx).await;
            return Ok(None);
        }

        let held = if stored.is_unlimited() && !event.is_unlimited() {
            let claimed = sqlx::query(
                "UPDATE registrations SET seat_held = TRUE \
                 WHERE event_id = $1 AND status <> 'cancelled'",
            )
            .bind(*event.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(classify)?
            .rows_affected();
            u32::try_from(claimed).map_err(|_| {
                StoreError::Corrupt(format!(
                    "registration count overflow for event {}",
                    event.id
                ))
            })?
        } else {
            stored.seats_reserved
        };
        if held > 0 && (event.is_unlimited() || event.capacity < held) {
            rollback(tx).await;
            return Ok(None);
        }

        let sql = format!(
            "UPDATE events SET title = $2, capacity = $3, registration_deadline = $4, \
             starts_at = $5, min_attendees = $6, max_attendees = $7, auto_confirm = $8, \
             pending_policy = $9, updated_at = $10, seats_reserved = $11 \
             WHERE id = $1 RETURNING {EVENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(*event.id.as_uuid())
            .bind(&event.title)
            .bind(to_db(event.capacity, "capacity")?)
            .bind(event.registration_deadline)
            .bind(event.starts_at)
            .bind(event.min_attendees.map(|v| to_db(v, "min_attendees")).transpose()?)
            .bind(event.max_attendees.map(|v| to_db(v, "max_attendees")).transpose()?)
            .bind(event.auto_confirm)
            .bind(event.pending_policy.as_str())
            .bind(event.updated_at)
            .bind(to_db(held, "seats_reserved")?)
            .fetch_one(&mut *tx)
            .await
            .map_err(classify)?;
        commit(tx).await?;
        Event::try_from(row).map(Some)
    }

    async fn set_status(
        &self,
        id: EventId,
        from: EventStatus,
        to: EventStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Event>, StoreError> {
        let sql = format!(
            "UPDATE events SET status = $3, updated_at = $4 \
             WHERE id = $1 AND status = $2 RETURNING {EVENT_COLUMNS}"
        );
        sqlx::query_as::<_, EventRow>(&sql)
            .bind(*id.as_uuid())
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?
            .map(Event::try_from)
            .transpose()
    }
}

#[async_trait]
impl RegistrationRepository for PostgresStore {
    async fn get_registration(
        &self,
        id: RegistrationId,
    ) -> Result<Option<Registration>, StoreError> {
        let sql = format!("SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1");
        sqlx::query_as::<_, RegistrationRow>(&sql)
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?
            .map(Registration::try_from)
            .transpose()
    }

    async fn list_registrations(&self, event_id: EventId) -> Result<Vec<Registration>, StoreError> {
        let sql = format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations \
             WHERE event_id = $1 ORDER BY created_at, id"
        );
        sqlx::query_as::<_, RegistrationRow>(&sql)
            .bind(*event_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(classify)?
            .into_iter()
            .map(Registration::try_from)
            .collect()
    }

    async fn find_by_idempotency_key(
        &self,
        event_id: EventId,
        key: &str,
    ) -> Result<Option<Registration>, StoreError> {
        let sql = format!(
            "SELECT {REGISTRATION_COLUMNS} FROM registrations \
             WHERE event_id = $1 AND idempotency_key = $2"
        );
        sqlx::query_as::<_, RegistrationRow>(&sql)
            .bind(*event_id.as_uuid())
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?
            .map(Registration::try_from)
            .transpose()
    }
}

#[async_trait]
impl SeatLedger for PostgresStore {
    async fn reserve_seat(
        &self,
        request: SeatRequest,
        now: DateTime<Utc>,
    ) -> Result<ReserveOutcome, StoreError> {
        let event_uuid: Uuid = request.event_id.into();
        let mut tx = self.begin().await?;

        if let Some(key) = request.idempotency_key.as_deref() {
            let sql = format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations \
                 WHERE event_id = $1 AND idempotency_key = $2"
            );
            let existing = sqlx::query_as::<_, RegistrationRow>(&sql)
                .bind(event_uuid)
                .bind(key)
                .fetch_optional(&mut *tx)
                .await
                .map_err(classify)?;
            if let Some(row) = existing {
                rollback(tx).await;
                return Ok(ReserveOutcome::Replayed {
                    registration: Registration::try_from(row)?,
                });
            }
        }

        // Increment-if-below-capacity. Under READ COMMITTED a concurrent
        // increment makes Postgres re-check the WHERE clause on the new row
        // version, so the last seat is granted exactly once.
        let sql = format!(
            "UPDATE events SET seats_reserved = seats_reserved + 1, updated_at = $2 \
             WHERE id = $1 AND status = 'published' \
             AND capacity > 0 AND seats_reserved < capacity \
             AND (COALESCE(registration_deadline, starts_at) IS NULL \
                  OR COALESCE(registration_deadline, starts_at) >= $2) \
             RETURNING {EVENT_COLUMNS}"
        );
        let bumped = sqlx::query_as::<_, EventRow>(&sql)
            .bind(event_uuid)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await
            .map_err(classify)?;

        let event = match bumped {
            Some(row) => Event::try_from(row)?,
            None => {
                // FOR SHARE keeps the status from changing under an
                // unlimited-capacity insert.
                let Some(event) = load_event(&mut tx, request.event_id, "FOR SHARE").await? else {
                    rollback(tx).await;
                    return Ok(ReserveOutcome::EventNotFound);
                };
                match is_admissible(&event, now) {
                    Err(reason) => {
                        rollback(tx).await;
                        return Ok(ReserveOutcome::Rejected(reason));
                    }
                    Ok(()) if !event.is_unlimited() => {
                        rollback(tx).await;
                        return Err(StoreError::Conflict(format!(
                            "seat counter for event {} moved during reservation",
                            request.event_id
                        )));
                    }
                    Ok(()) => event,
                }
            }
        };

        let registration = Registration::admitted(
            &event,
            request.attendee_contact,
            request.idempotency_key,
            now,
        );
        sqlx::query(
            "INSERT INTO registrations (id, event_id, attendee_contact, status, seat_held, \
             idempotency_key, created_at, status_changed_at, status_changed_by, checked_in_at, \
             checked_in_by) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(*registration.id.as_uuid())
        .bind(event_uuid)
        .bind(registration.attendee_contact.as_value())
        .bind(registration.status.as_str())
        .bind(registration.seat_held)
        .bind(registration.idempotency_key.as_deref())
        .bind(registration.created_at)
        .bind(registration.status_changed_at)
        .bind(registration.status_changed_by.as_deref())
        .bind(registration.checked_in_at)
        .bind(registration.checked_in_by.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        commit(tx).await?;
        Ok(ReserveOutcome::Admitted {
            registration,
            event,
        })
    }

    async fn release_seat(
        &self,
        id: RegistrationId,
        now: DateTime<Utc>,
    ) -> Result<ReleaseOutcome, StoreError> {
        let mut tx = self.begin().await?;
        let Some(mut registration) = lock_registration(&mut tx, id).await? else {
            rollback(tx).await;
            return Ok(ReleaseOutcome::NotFound);
        };
        if !registration.seat_held {
            rollback(tx).await;
            return Ok(ReleaseOutcome::NotHeld(registration));
        }

        sqlx::query("UPDATE registrations SET seat_held = FALSE WHERE id = $1")
            .bind(*id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(classify)?;
        let event = decrement_seat(&mut tx, registration.event_id, now).await?;
        commit(tx).await?;

        registration.seat_held = false;
        Ok(ReleaseOutcome::Released {
            registration,
            event,
        })
    }

    async fn commit_transition(
        &self,
        plan: &TransitionPlan,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, StoreError> {
        let mut tx = self.begin().await?;
        let Some(current) = lock_registration(&mut tx, plan.updated.id).await? else {
            rollback(tx).await;
            return Ok(TransitionOutcome::NotFound);
        };
        if current.status != plan.expected {
            rollback(tx).await;
            return Ok(TransitionOutcome::Stale(current));
        }

        let mut registration = plan.updated.clone();
        registration.seat_held = if plan.releases_seat {
            false
        } else {
            current.seat_held
        };

        sqlx::query(
            "UPDATE registrations SET status = $2, seat_held = $3, status_changed_at = $4, \
             status_changed_by = $5, checked_in_at = $6, checked_in_by = $7 WHERE id = $1",
        )
        .bind(*registration.id.as_uuid())
        .bind(registration.status.as_str())
        .bind(registration.seat_held)
        .bind(registration.status_changed_at)
        .bind(registration.status_changed_by.as_deref())
        .bind(registration.checked_in_at)
        .bind(registration.checked_in_by.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        let event = if plan.releases_seat && current.seat_held {
            decrement_seat(&mut tx, registration.event_id, now).await?
        } else {
            load_event(&mut tx, registration.event_id, "")
                .await?
                .ok_or_else(|| {
                    StoreError::Corrupt(format!(
                        "registration {} references missing event",
                        registration.id
                    ))
                })?
        };
        commit(tx).await?;

        Ok(TransitionOutcome::Committed {
            registration,
            event,
        })
    }
}
