//! admission-gateway server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use admission_gateway::api;
use admission_gateway::app_state::AppState;
use admission_gateway::config::AdmissionConfig;
use admission_gateway::domain::EventBus;
use admission_gateway::persistence::{AdmissionStore, MemoryStore, PostgresStore};
use admission_gateway::service::AdmissionService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = AdmissionConfig::from_env()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("invalid configuration")?;
    tracing::info!(addr = %config.listen_addr, "starting admission-gateway");

    let event_bus = EventBus::new(config.event_bus_capacity);

    // Build persistence layer
    let store: Arc<dyn AdmissionStore> = if config.persistence_enabled {
        let postgres = PostgresStore::connect(&config)
            .await
            .context("connecting to PostgreSQL")?;
        postgres.migrate().await.context("running migrations")?;
        if config.event_log_enabled {
            let _audit = postgres.clone().spawn_audit_writer(event_bus.subscribe());
            tracing::info!("audit log writer started");
        }
        tracing::info!("using PostgreSQL seat ledger");
        Arc::new(postgres)
    } else {
        tracing::info!("using in-memory seat ledger");
        Arc::new(MemoryStore::new())
    };

    // Build service layer
    let service = AdmissionService::new(store, Arc::new(event_bus.clone()))
        .with_retry_policy(config.retry_policy())
        .with_default_pending_policy(config.default_pending_policy);

    let app_state = AppState {
        service: Arc::new(service),
        event_bus,
        ws_max_subscriptions: config.ws_max_subscriptions,
    };
    let app = api::build_app(app_state, config.request_timeout());

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
