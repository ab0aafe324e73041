//! Registration handlers: admission, lookup, lifecycle transitions, and seat
//! release.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    IDEMPOTENCY_KEY_HEADER, PaginationParams, RegisterRequest, RegistrationListResponse,
    TransitionRequest,
};
use crate::app_state::AppState;
use crate::domain::{EventId, Registration, RegistrationId};
use crate::error::{AdmissionError, ErrorResponse};

/// `POST /events/{id}/registrations` — Register one attendee.
///
/// # Errors
///
/// Returns a business rejection (`EVENT_NOT_OPEN`, `DEADLINE_PASSED`,
/// `SOLD_OUT`, `DUPLICATE_REQUEST`), `EVENT_NOT_FOUND`, or an infrastructure
/// outcome (`UNAVAILABLE`, `UNKNOWN`).
#[utoipa::path(
    post,
    path = "/api/v1/events/{id}/registrations",
    tag = "Registrations",
    summary = "Register an attendee",
    description = "Atomically reserves a seat and creates the registration. Send an `Idempotency-Key` header to make retries safe: a repeated key with the same contact returns the original registration.",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
        ("Idempotency-Key" = Option<String>, Header, description = "Caller token for safe retries"),
    ),
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration created (or replayed)", body = Registration),
        (status = 400, description = "Invalid contact or key", body = ErrorResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
        (status = 409, description = "Not open, deadline passed, sold out, or duplicate key", body = ErrorResponse),
        (status = 503, description = "Storage unavailable; retry", body = ErrorResponse),
        (status = 504, description = "Outcome unknown; retry with the same key", body = ErrorResponse),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
    headers: HeaderMap,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AdmissionError> {
    let idempotency_key = idempotency_key(&headers)?;
    let registration = state
        .service
        .register(event_id, req.attendee_contact, idempotency_key)
        .await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

/// `GET /events/{id}/registrations` — List an event's registrations.
///
/// # Errors
///
/// Returns [`AdmissionError::EventNotFound`] if the event does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/events/{id}/registrations",
    tag = "Registrations",
    summary = "List registrations",
    params(
        ("id" = uuid::Uuid, Path, description = "Event UUID"),
        PaginationParams,
    ),
    responses(
        (status = 200, description = "Paginated registration list", body = RegistrationListResponse),
        (status = 404, description = "Event not found", body = ErrorResponse),
    )
)]
pub async fn list_registrations(
    State(state): State<AppState>,
    Path(event_id): Path<EventId>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, AdmissionError> {
    let registrations = state.service.list_registrations(event_id).await?;
    let (data, pagination) = params.paginate(registrations);
    Ok(Json(RegistrationListResponse { data, pagination }))
}

/// `GET /registrations/{id}` — Get a registration.
///
/// # Errors
///
/// Returns [`AdmissionError::RegistrationNotFound`] if it does not exist.
#[utoipa::path(
    get,
    path = "/api/v1/registrations/{id}",
    tag = "Registrations",
    summary = "Get a registration",
    params(
        ("id" = uuid::Uuid, Path, description = "Registration UUID"),
    ),
    responses(
        (status = 200, description = "Registration", body = Registration),
        (status = 404, description = "Registration not found", body = ErrorResponse),
    )
)]
pub async fn get_registration(
    State(state): State<AppState>,
    Path(registration_id): Path<RegistrationId>,
) -> Result<impl IntoResponse, AdmissionError> {
    let registration = state.service.get_registration(registration_id).await?;
    Ok(Json(registration))
}

/// `POST /registrations/{id}/transition` — Change registration status.
///
/// # Errors
///
/// Returns [`AdmissionError::InvalidTransition`] for moves outside the
/// lifecycle table, leaving the registration unchanged.
#[utoipa::path(
    post,
    path = "/api/v1/registrations/{id}/transition",
    tag = "Registrations",
    summary = "Transition a registration",
    description = "Moves a registration along its lifecycle: pending → confirmed | cancelled, confirmed → cancelled | attended | no-show. Cancelling releases the held seat.",
    params(
        ("id" = uuid::Uuid, Path, description = "Registration UUID"),
    ),
    request_body = TransitionRequest,
    responses(
        (status = 200, description = "Registration after the transition", body = Registration),
        (status = 400, description = "Missing actor", body = ErrorResponse),
        (status = 404, description = "Registration not found", body = ErrorResponse),
        (status = 409, description = "Transition not allowed", body = ErrorResponse),
    )
)]
pub async fn transition(
    State(state): State<AppState>,
    Path(registration_id): Path<RegistrationId>,
    Json(req): Json<TransitionRequest>,
) -> Result<impl IntoResponse, AdmissionError> {
    let registration = state
        .service
        .transition(registration_id, req.target, &req.actor)
        .await?;
    Ok(Json(registration))
}

/// `POST /registrations/{id}/release-seat` — Return a held seat.
///
/// # Errors
///
/// Returns [`AdmissionError::RegistrationNotFound`] if it does not exist.
#[utoipa::path(
    post,
    path = "/api/v1/registrations/{id}/release-seat",
    tag = "Registrations",
    summary = "Release a held seat",
    description = "Returns the registration's seat to its event without changing status. Idempotent: releasing twice frees one seat.",
    params(
        ("id" = uuid::Uuid, Path, description = "Registration UUID"),
    ),
    responses(
        (status = 200, description = "Registration after release", body = Registration),
        (status = 404, description = "Registration not found", body = ErrorResponse),
    )
)]
pub async fn release_seat(
    State(state): State<AppState>,
    Path(registration_id): Path<RegistrationId>,
) -> Result<impl IntoResponse, AdmissionError> {
    let registration = state.service.release_seat(registration_id).await?;
    Ok(Json(registration))
}

/// Registration routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/events/{id}/registrations",
            post(register).get(list_registrations),
        )
        .route("/registrations/{id}", get(get_registration))
        .route("/registrations/{id}/transition", post(transition))
        .route("/registrations/{id}/release-seat", post(release_seat))
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, AdmissionError> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .map(|value| {
            value.to_str().map(str::to_string).map_err(|_| {
                AdmissionError::InvalidRequest(
                    "Idempotency-Key header must be visible ASCII".to_string(),
                )
            })
        })
        .transpose()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn missing_header_means_no_key() {
        let Ok(None) = idempotency_key(&HeaderMap::new()) else {
            panic!("absent header should yield no key");
        };
    }

    #[test]
    fn header_value_is_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(IDEMPOTENCY_KEY_HEADER, HeaderValue::from_static("order-42"));
        let Ok(Some(key)) = idempotency_key(&headers) else {
            panic!("header should be read");
        };
        assert_eq!(key, "order-42");
    }

    #[test]
    fn non_ascii_header_is_rejected() {
        let mut headers = HeaderMap::new();
        let Ok(value) = HeaderValue::from_bytes(&[0xE2, 0x82, 0xAC]) else {
            panic!("opaque bytes are a valid header value");
        };
        headers.insert(IDEMPOTENCY_KEY_HEADER, value);
        let Err(AdmissionError::InvalidRequest(_)) = idempotency_key(&headers) else {
            panic!("non-ASCII key must be rejected");
        };
    }
}
