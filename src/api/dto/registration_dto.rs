//! Registration DTOs: admission, transitions, and listings.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::common_dto::PaginationMeta;
use crate::domain::{AttendeeContact, Registration, RegistrationStatus};

/// Header carrying the caller's idempotency token on `POST .../registrations`.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Request body for `POST /events/{id}/registrations`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegisterRequest {
    /// Opaque contact details (name, email, phone, ...).
    #[schema(value_type = Object)]
    pub attendee_contact: AttendeeContact,
}

/// Request body for `POST /registrations/{id}/transition`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TransitionRequest {
    /// Target status.
    pub target: RegistrationStatus,
    /// Who performs the change (attendee id, admin id, `"system"`).
    pub actor: String,
}

/// Paginated list response for `GET /events/{id}/registrations`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegistrationListResponse {
    /// Registrations on this page.
    pub data: Vec<Registration>,
    /// Pagination metadata.
    pub pagination: PaginationMeta,
}
