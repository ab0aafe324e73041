//! WebSocket connection loop.
//!
//! Handles the read/write loop for a single WebSocket connection,
//! dispatching incoming commands and forwarding filtered registration events.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use super::subscription::SubscriptionManager;
use crate::domain::{EventId, RegistrationEvent};
use crate::service::AdmissionService;

/// Runs the read/write loop for a single WebSocket connection.
///
/// - Reads commands from the client and dispatches them.
/// - Forwards matching events from the [`broadcast::Receiver`] to the client.
pub async fn run_connection(
    socket: WebSocket,
    mut event_rx: broadcast::Receiver<RegistrationEvent>,
    service: Arc<AdmissionService>,
    mut subs: SubscriptionManager,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text_message(&text, &mut subs, &service).await;
                        if let Some(json) = encode(&reply)
                            && ws_tx.send(Message::text(json)).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if !subs.matches(&event) {
                            continue;
                        }
                        let Ok(payload) = serde_json::to_value(&event) else {
                            tracing::warn!(registration_id = %event.registration_id(), "failed to encode registration event");
                            continue;
                        };
                        let msg = WsMessage::new(uuid::Uuid::new_v4().to_string(), WsMessageType::Event, payload);
                        if let Some(json) = encode(&msg)
                            && ws_tx.send(Message::text(json)).await.is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                        let notice = WsMessage::error(String::new(), "LAGGED", &format!("{n} events dropped"));
                        if let Some(json) = encode(&notice)
                            && ws_tx.send(Message::text(json)).await.is_err()
                        {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

fn encode(msg: &WsMessage) -> Option<String> {
    serde_json::to_string(msg).ok()
}

/// Handles one text frame from the client and builds the reply.
async fn handle_text_message(
    text: &str,
    subs: &mut SubscriptionManager,
    service: &AdmissionService,
) -> WsMessage {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        return WsMessage::error(String::new(), "MALFORMED", "malformed JSON");
    };
    if msg.msg_type != WsMessageType::Command {
        return WsMessage::error(msg.id, "BAD_COMMAND", "expected a command message");
    }
    let Ok(command) = serde_json::from_value::<WsCommand>(msg.payload) else {
        return WsMessage::error(msg.id, "BAD_COMMAND", "unknown command");
    };

    match command {
        WsCommand::Subscribe {
            event_ids,
            event_types,
        } => {
            let wildcard = event_ids.iter().any(|id| id == "*");
            let ids = parse_event_ids(&event_ids);
            if let Err(e) = subs.subscribe(&ids, wildcard, &event_types) {
                return WsMessage::error(msg.id, "SUBSCRIPTION_LIMIT", &e.to_string());
            }
            WsMessage::new(
                msg.id,
                WsMessageType::Response,
                serde_json::json!({
                    "subscribed": ids,
                    "count": subs.count(),
                    "wildcard": subs.is_subscribed_all(),
                    "event_types": subs.event_types(),
                }),
            )
        }
        WsCommand::Unsubscribe { event_ids } => {
            let ids = parse_event_ids(&event_ids);
            subs.unsubscribe(&ids);
            WsMessage::new(
                msg.id,
                WsMessageType::Response,
                serde_json::json!({
                    "unsubscribed": ids,
                    "remaining_count": subs.count(),
                }),
            )
        }
        WsCommand::CheckAdmissible { event_id } => {
            let Ok(uuid) = event_id.parse::<uuid::Uuid>() else {
                return WsMessage::error(msg.id, "INVALID_REQUEST", "event_id must be a UUID");
            };
            match service.check_admissible(EventId::from_uuid(uuid)).await {
                Ok(admissibility) => WsMessage::new(
                    msg.id,
                    WsMessageType::Response,
                    serde_json::to_value(admissibility).unwrap_or_default(),
                ),
                Err(e) => WsMessage::error(msg.id, e.code(), &e.to_string()),
            }
        }
    }
}

/// Parses event IDs, skipping the wildcard and anything that is not a UUID.
fn parse_event_ids(raw: &[String]) -> Vec<EventId> {
    raw.iter()
        .filter_map(|s| s.parse::<uuid::Uuid>().ok())
        .map(EventId::from_uuid)
        .collect()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::EventBus;
    use crate::persistence::{AdmissionStore, MemoryStore};

    fn service() -> AdmissionService {
        AdmissionService::new(
            Arc::new(MemoryStore::new()) as Arc<dyn AdmissionStore>,
            Arc::new(EventBus::new(16)),
        )
    }

    fn command(payload: serde_json::Value) -> String {
        serde_json::json!({
            "id": "req-1",
            "type": "command",
            "timestamp": chrono::Utc::now(),
            "payload": payload,
        })
        .to_string()
    }

    #[tokio::test]
    async fn subscribe_registers_ids() {
        let mut subs = SubscriptionManager::new();
        let id = EventId::new();
        let text = command(serde_json::json!({
            "command": "subscribe",
            "event_ids": [id.to_string(), "not-a-uuid"],
        }));
        let reply = handle_text_message(&text, &mut subs, &service()).await;
        assert_eq!(reply.msg_type, WsMessageType::Response);
        assert_eq!(reply.id, "req-1");
        assert_eq!(subs.count(), 1);
    }

    #[tokio::test]
    async fn subscribe_past_limit_is_refused() {
        let mut subs = SubscriptionManager::with_limit(1);
        let text = command(serde_json::json!({
            "command": "subscribe",
            "event_ids": [EventId::new().to_string(), EventId::new().to_string()],
        }));
        let reply = handle_text_message(&text, &mut subs, &service()).await;
        assert_eq!(reply.msg_type, WsMessageType::Error);
        assert_eq!(
            reply.payload.get("code"),
            Some(&serde_json::json!("SUBSCRIPTION_LIMIT"))
        );
        assert_eq!(subs.count(), 0);
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        let mut subs = SubscriptionManager::new();
        let reply = handle_text_message("{nope", &mut subs, &service()).await;
        assert_eq!(reply.msg_type, WsMessageType::Error);
    }

    #[tokio::test]
    async fn admissibility_for_unknown_event_reports_not_found() {
        let mut subs = SubscriptionManager::new();
        let text = command(serde_json::json!({
            "command": "check_admissible",
            "event_id": EventId::new().to_string(),
        }));
        let reply = handle_text_message(&text, &mut subs, &service()).await;
        assert_eq!(reply.msg_type, WsMessageType::Error);
        assert_eq!(
            reply.payload.get("code"),
            Some(&serde_json::json!("EVENT_NOT_FOUND"))
        );
    }
}
