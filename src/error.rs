//! Admission error types with HTTP status code mapping.
//!
//! [`AdmissionError`] is the central error type of the service. Business-rule
//! rejections (`SOLD_OUT`, `DEADLINE_PASSED`, ...) are ordinary variants so
//! callers can tell them apart from infrastructure failures (`UNAVAILABLE`,
//! `UNKNOWN`). Every variant maps to a stable string code, an HTTP status and
//! a retryable flag.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{EventId, RegistrationId, RejectionReason};
use crate::persistence::StoreError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": "SOLD_OUT",
///     "message": "event is sold out",
///     "retryable": false
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with taxonomy code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Stable error code from the admission taxonomy.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Whether the client may safely retry (with the same idempotency key).
    pub retryable: bool,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Service error enum with HTTP status code mapping.
///
/// | Code                 | Category        | HTTP Status                 |
/// |----------------------|-----------------|-----------------------------|
/// | `INVALID_REQUEST`    | Input           | 400 Bad Request             |
/// | `*_NOT_FOUND`        | Input           | 404 Not Found               |
/// | business rejections  | Business rule   | 409 Conflict                |
/// | `UNAVAILABLE`        | Infrastructure  | 503 Service Unavailable     |
/// | `UNKNOWN`            | Infrastructure  | 504 Gateway Timeout         |
/// | `INTERNAL`           | Server          | 500 Internal Server Error   |
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// Event with the given ID was not found.
    #[error("event not found: {0}")]
    EventNotFound(EventId),

    /// Registration with the given ID was not found.
    #[error("registration not found: {0}")]
    RegistrationNotFound(RegistrationId),

    /// The event is not in the `published` state.
    #[error("event is not open for registration")]
    EventNotOpen,

    /// The registration deadline (or event start) has passed.
    #[error("registration deadline has passed")]
    DeadlinePassed,

    /// Every seat of the event is held.
    #[error("event is sold out")]
    SoldOut,

    /// The requested status change is not allowed from the current status.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// An idempotency key was reused for a different request.
    #[error("duplicate request: {0}")]
    DuplicateRequest(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Storage is unreachable or the conflict retry budget was exhausted.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The storage outcome is ambiguous; the caller must reconcile.
    #[error("outcome unknown: {0}")]
    Unknown(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AdmissionError {
    /// Returns the taxonomy code for this variant.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EventNotFound(_) => "EVENT_NOT_FOUND",
            Self::RegistrationNotFound(_) => "REGISTRATION_NOT_FOUND",
            Self::EventNotOpen => "EVENT_NOT_OPEN",
            Self::DeadlinePassed => "DEADLINE_PASSED",
            Self::SoldOut => "SOLD_OUT",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::DuplicateRequest(_) => "DUPLICATE_REQUEST",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Unknown(_) => "UNKNOWN",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::EventNotFound(_) | Self::RegistrationNotFound(_) => StatusCode::NOT_FOUND,
            Self::EventNotOpen
            | Self::DeadlinePassed
            | Self::SoldOut
            | Self::InvalidTransition { .. }
            | Self::DuplicateRequest(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unknown(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` when a retry may succeed without changing the request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Unknown(_))
    }

    /// Returns `true` for expected business-rule rejections.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::EventNotOpen
                | Self::DeadlinePassed
                | Self::SoldOut
                | Self::InvalidTransition { .. }
                | Self::DuplicateRequest(_)
        )
    }
}

impl From<RejectionReason> for AdmissionError {
    fn from(reason: RejectionReason) -> Self {
        match reason {
            RejectionReason::EventNotOpen => Self::EventNotOpen,
            RejectionReason::DeadlinePassed => Self::DeadlinePassed,
            RejectionReason::SoldOut => Self::SoldOut,
        }
    }
}

impl From<StoreError> for AdmissionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) | StoreError::Unavailable(msg) => Self::Unavailable(msg),
            StoreError::Ambiguous(msg) => Self::Unknown(msg),
            StoreError::Corrupt(msg) => Self::Internal(msg),
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code().to_string(),
                message: self.to_string(),
                retryable: self.is_retryable(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_rejections_map_to_conflict() {
        for err in [
            AdmissionError::EventNotOpen,
            AdmissionError::DeadlinePassed,
            AdmissionError::SoldOut,
            AdmissionError::DuplicateRequest("k".to_string()),
        ] {
            assert_eq!(err.status_code(), StatusCode::CONFLICT);
            assert!(err.is_rejection());
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn infrastructure_errors_are_retryable() {
        let unavailable = AdmissionError::from(StoreError::Unavailable("down".to_string()));
        assert_eq!(unavailable.code(), "UNAVAILABLE");
        assert!(unavailable.is_retryable());

        let unknown = AdmissionError::from(StoreError::Ambiguous("commit lost".to_string()));
        assert_eq!(unknown.code(), "UNKNOWN");
        assert_eq!(unknown.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert!(unknown.is_retryable());
    }

    #[test]
    fn rejection_reason_converts() {
        let err = AdmissionError::from(RejectionReason::SoldOut);
        assert_eq!(err.code(), "SOLD_OUT");
    }

    #[test]
    fn not_found_has_404() {
        let err = AdmissionError::EventNotFound(EventId::new());
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "EVENT_NOT_FOUND");
    }
}
