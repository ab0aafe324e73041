//! Shared harness: boots the full application on an ephemeral port.

#![allow(dead_code, clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use admission_gateway::api;
use admission_gateway::app_state::AppState;
use admission_gateway::domain::EventBus;
use admission_gateway::persistence::{AdmissionStore, MemoryStore};
use admission_gateway::service::AdmissionService;
use serde_json::{Value, json};

/// A running server and a client pointed at it.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let event_bus = EventBus::new(1024);
        let store: Arc<dyn AdmissionStore> = Arc::new(MemoryStore::new());
        let service = AdmissionService::new(store, Arc::new(event_bus.clone()));
        let state = AppState {
            service: Arc::new(service),
            event_bus,
            ws_max_subscriptions: 4,
        };
        let app = api::build_app(state, Duration::from_secs(5));

        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("failed to bind ephemeral port");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("listener has no address");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self {
            addr,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Creates and publishes an event, returning its id.
    pub async fn open_event(&self, capacity: u32) -> String {
        let created = self
            .post_json("/api/v1/events", &json!({ "title": "Repair café", "capacity": capacity }))
            .await;
        assert_eq!(created.0, reqwest::StatusCode::CREATED);
        let Some(id) = created.1.get("id").and_then(Value::as_str) else {
            panic!("created event has no id: {}", created.1);
        };
        let id = id.to_string();
        let published = self
            .post_json(&format!("/api/v1/events/{id}/publish"), &json!({}))
            .await;
        assert_eq!(published.0, reqwest::StatusCode::OK);
        id
    }

    pub async fn register(&self, event_id: &str, name: &str, key: Option<&str>) -> (reqwest::StatusCode, Value) {
        let mut request = self
            .client
            .post(self.url(&format!("/api/v1/events/{event_id}/registrations")))
            .json(&json!({ "attendee_contact": { "name": name } }));
        if let Some(key) = key {
            request = request.header("Idempotency-Key", key);
        }
        let Ok(resp) = request.send().await else {
            panic!("request failed");
        };
        read(resp).await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> (reqwest::StatusCode, Value) {
        let Ok(resp) = self.client.post(self.url(path)).json(body).send().await else {
            panic!("POST {path} failed");
        };
        read(resp).await
    }

    pub async fn get_json(&self, path: &str) -> (reqwest::StatusCode, Value) {
        let Ok(resp) = self.client.get(self.url(path)).send().await else {
            panic!("GET {path} failed");
        };
        read(resp).await
    }
}

async fn read(resp: reqwest::Response) -> (reqwest::StatusCode, Value) {
    let status = resp.status();
    let body = resp.json::<Value>().await.unwrap_or(Value::Null);
    (status, body)
}

/// Extracts `error.code` from an error body.
pub fn error_code(body: &Value) -> Option<&str> {
    body.get("error")?.get("code")?.as_str()
}
