//! Event handlers: create, list, get, update, lifecycle, and organizer
//! reports.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    ActorRequest, CompleteEventResponse, CreateEventRequest, EventListResponse, EventResponse,
    PaginationParams, ReleasePendingResponse, UpdateEventRequest, ViabilityResponse,
};
use crate::app_state::AppState;
use crate::domain::{Admissibility, EventId};
use crate::error::{AdmissionError, ErrorResponse};

/// `POST /events` — Create an event in `draft`.
///
/// # Errors
///
/// Returns [`AdmissionError::InvalidRequest`] for inconsistent input.
#[utoipa::path(
    post,
    path = "/api/v1/events",
    tag = "Events",
    summary = "Create an event",
    description = "Creates an event in `draft`. Capacity `0` means unlimited. The event must be published before it admits registrations.",
    request_body = CreateEventRequest,
    responses(
        (status = 201, description = "Event created", body = EventResponse),
        (status = 400, description = "Invalid event definition", body = ErrorResponse),
    )
)]
pub async fn create_event(
    State(state): State<AppState>,
    Json(req): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, AdmissionError> {
    let draft = req.into_draft(state.service.default_pending_policy());
    let event = state.service.create_event(draft).await?;
    Ok((StatusCode::CREATED, Json(EventResponse::from(event))))
}

/// `GET /events` — List events with pagination.
///
/// # Errors
///
/// Returns [`AdmissionError`] on storage failures.
#[utoipa::path(
    get,
    path = "/api/v1/events",
    tag = "Events",
    summary = "List events",
    description = "Returns a paginated list of events, oldest first.",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated event list", body = EventListResponse),
        (status = 503, description = "Storage unavailable", body = ErrorResponse),
    )
)]
pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, AdmissionError> {
    let events = state.service.list_events().await?;
    let (page, pagination) = params.paginate(events);
    Ok(Json(EventListResponse {
        data: page.into_iter().map(EventResponse::from).collect(),
        pagination,
    }))
}

/// `GET /events/{id}` — Get event details.
///
/// # Errors
///
/// Returns [`AdmissionError::EventNotFound`] if the event does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/events/{id}",
    tag = "Events",
    summary = "Get event details",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    responses(
        (status = 200, description = "Event details", body = EventResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<impl IntoResponse, AdmissionError> {
    let event = state.service.get_event(event_id).await?;
    Ok(Json(EventResponse::from(event)))
}

/// `PATCH /events/{id}` — Update event metadata.
///
/// # Errors
///
/// Returns [`AdmissionError`] if the event is missing, terminal, or the
/// patch is inconsistent.
#[utoipa::path(
    patch,
    path = "/api/v1/events/{id}",
    tag = "Events",
    summary = "Update an event",
    description = "Partially updates event metadata. Capacity cannot drop below the seats currently held. Capping an unlimited event makes its uncancelled registrations claim seats, so the new capacity must cover them.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    request_body = UpdateEventRequest,
    responses(
        (status = 200, description = "Event updated", body = EventResponse),
        (status = 400, description = "Invalid update", body = ErrorResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
        (status = 409, description = "Event is cancelled or completed", body = ErrorResponse),
    )
)]
pub async fn update_event(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
    Json(req): Json<UpdateEventRequest>,
) -> Result<impl IntoResponse, AdmissionError> {
    let event = state.service.update_event(event_id, req.into()).await?;
    Ok(Json(EventResponse::from(event)))
}

/// `POST /events/{id}/publish` — Open an event for registration.
///
/// # Errors
///
/// Returns [`AdmissionError::InvalidTransition`] unless the event is a draft.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/publish",
    tag = "Events",
    summary = "Publish an event",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    responses(
        (status = 200, description = "Event published", body = EventResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
        (status = 409, description = "Event is not a draft", body = ErrorResponse),
    )
)]
pub async fn publish_event(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<impl IntoResponse, AdmissionError> {
    let event = state.service.publish_event(event_id).await?;
    Ok(Json(EventResponse::from(event)))
}

/// `POST /events/{id}/cancel` — Cancel an event.
///
/// # Errors
///
/// Returns [`AdmissionError::InvalidTransition`] if the event is already
/// cancelled or completed.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/cancel",
    tag = "Events",
    summary = "Cancel an event",
    description = "Stops admission. Existing registrations keep their status.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    responses(
        (status = 200, description = "Event cancelled", body = EventResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
        (status = 409, description = "Event already terminal", body = ErrorResponse),
    )
)]
pub async fn cancel_event(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<impl IntoResponse, AdmissionError> {
    let event = state.service.cancel_event(event_id).await?;
    Ok(Json(EventResponse::from(event)))
}

/// `POST /events/{id}/complete` — Close a published event and record
/// no-shows.
///
/// # Errors
///
/// Returns [`AdmissionError::InvalidTransition`] unless the event is
/// published.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/complete",
    tag = "Events",
    summary = "Complete an event",
    description = "Marks a published event as completed and moves every confirmed registration that never checked in to `no-show`.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    request_body = ActorRequest,
    responses(
        (status = 200, description = "Event completed", body = CompleteEventResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
        (status = 409, description = "Event is not published", body = ErrorResponse),
    )
)]
pub async fn complete_event(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
    Json(req): Json<ActorRequest>,
) -> Result<impl IntoResponse, AdmissionError> {
    let (event, no_shows_marked) = state.service.complete_event(event_id, &req.actor).await?;
    Ok(Json(CompleteEventResponse {
        event: EventResponse::from(event),
        no_shows_marked,
    }))
}

/// `GET /events/{id}/admissibility` — Non-binding admission pre-check.
///
/// # Errors
///
/// Returns [`AdmissionError::EventNotFound`] if the event does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/events/{id}/admissibility",
    tag = "Events",
    summary = "Check admissibility",
    description = "Evaluates status, deadline and capacity without reserving anything. The answer may be stale by the time a registration is attempted.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    responses(
        (status = 200, description = "Admissibility hint", body = Admissibility),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn check_admissible(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<impl IntoResponse, AdmissionError> {
    let admissibility = state.service.check_admissible(event_id).await?;
    Ok(Json(admissibility))
}

/// `GET /events/{id}/viability` — Attendance against configured bounds.
///
/// # Errors
///
/// Returns [`AdmissionError::EventNotFound`] if the event does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/events/{id}/viability",
    tag = "Events",
    summary = "Attendance viability",
    description = "Compares active registrations (pending, confirmed, attended) with min/max attendees. Informational only; admission does not consult it.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    responses(
        (status = 200, description = "Viability report", body = ViabilityResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn viability(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
) -> Result<impl IntoResponse, AdmissionError> {
    let (event, viability) = state.service.viability(event_id).await?;
    Ok(Json(ViabilityResponse::new(&event, viability)))
}

/// `POST /events/{id}/pending/release` — Cancel expired pending
/// registrations.
///
/// # Errors
///
/// Returns [`AdmissionError::EventNotFound`] if the event does not exist.
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/pending/release",
    tag = "Events",
    summary = "Release expired pending registrations",
    description = "For events using the `release_at_deadline` policy, cancels every registration still pending after the deadline and frees its seat. A no-op under `hold_seat` or before the deadline.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
    ),
    request_body = ActorRequest,
    responses(
        (status = 200, description = "Sweep result", body = ReleasePendingResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn release_expired_pending(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
    Json(req): Json<ActorRequest>,
) -> Result<impl IntoResponse, AdmissionError> {
    let released = state
        .service
        .release_expired_pending(event_id, &req.actor)
        .await?;
    Ok(Json(ReleasePendingResponse { event_id, released }))
}

/// Event management routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/events", post(create_event).get(list_events))
        .route("/events/{id}", get(get_event).patch(update_event))
        .route("/events/{id}/publish", post(publish_event))
        .route("/events/{id}/cancel", post(cancel_event))
        .route("/events/{id}/complete", post(complete_event))
        .route("/events/{id}/admissibility", get(check_admissible))
        .route("/events/{id}/viability", get(viability))
        .route("/events/{id}/pending/release", post(release_expired_pending))
}
