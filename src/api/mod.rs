//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` stays at the
//! root.

pub mod dto;
pub mod handlers;

use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::app_state::AppState;
use crate::ws::handler::ws_handler;

/// OpenAPI document for every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "admission-gateway",
        description = "Event registration and capacity admission control"
    ),
    paths(
        handlers::system::health_handler,
        handlers::events::create_event,
        handlers::events::list_events,
        handlers::events::get_event,
        handlers::events::update_event,
        handlers::events::publish_event,
        handlers::events::cancel_event,
        handlers::events::complete_event,
        handlers::events::check_admissible,
        handlers::events::viability,
        handlers::events::release_expired_pending,
        handlers::registrations::register,
        handlers::registrations::list_registrations,
        handlers::registrations::get_registration,
        handlers::registrations::transition,
        handlers::registrations::release_seat,
    ),
    tags(
        (name = "System", description = "Service health"),
        (name = "Events", description = "Event administration and admission pre-checks"),
        (name = "Registrations", description = "Seat admission and registration lifecycle"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}

/// Builds the served application: REST API, WebSocket feed, Swagger UI
/// (with the `swagger-ui` feature), and the HTTP middleware stack.
///
/// Requests running longer than `request_timeout` are answered with
/// `504 Gateway Timeout`; their admission outcome is unknown to the caller.
pub fn build_app(state: AppState, request_timeout: Duration) -> Router {
    let router = build_router().route("/ws", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::GATEWAY_TIMEOUT,
                    request_timeout,
                )),
        )
        .with_state(state)
}
