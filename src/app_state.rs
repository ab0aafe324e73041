//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::EventBus;
use crate::service::AdmissionService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Admission service for all business logic.
    pub service: Arc<AdmissionService>,
    /// Event bus for WebSocket subscriptions.
    pub event_bus: EventBus,
    /// Per-connection cap on followed events.
    pub ws_max_subscriptions: usize,
}
