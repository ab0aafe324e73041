//! End-to-end tests of the REST surface against the in-memory ledger.

#![allow(clippy::panic)]

mod common;

use reqwest::StatusCode;
use serde_json::{Value, json};
use tokio_test::assert_ok;

use common::{TestApp, error_code};

fn id_of(body: &Value) -> String {
    let Some(id) = body.get("id").and_then(Value::as_str) else {
        panic!("body has no id: {body}");
    };
    id.to_string()
}

#[tokio::test]
async fn health_reports_healthy() {
    let app = TestApp::spawn().await;
    let resp = assert_ok!(app.client.get(app.url("/health")).send().await);
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = assert_ok!(resp.json().await);
    assert_eq!(body.get("status"), Some(&json!("healthy")));
}

#[tokio::test]
async fn last_seat_sells_out_and_cancellation_frees_it() {
    let app = TestApp::spawn().await;
    let event_id = app.open_event(1).await;

    let (status, first) = app.register(&event_id, "ana", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first.get("status"), Some(&json!("pending")));
    assert_eq!(first.get("seat_held"), Some(&json!(true)));

    let (status, rejected) = app.register(&event_id, "ben", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&rejected), Some("SOLD_OUT"));
    assert_eq!(
        rejected.get("error").and_then(|e| e.get("retryable")),
        Some(&json!(false))
    );

    let registration_id = id_of(&first);
    let (status, cancelled) = app
        .post_json(
            &format!("/api/v1/registrations/{registration_id}/transition"),
            &json!({ "target": "cancelled", "actor": "ana" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled.get("seat_held"), Some(&json!(false)));

    let (_, event) = app.get_json(&format!("/api/v1/events/{event_id}")).await;
    assert_eq!(event.get("seats_reserved"), Some(&json!(0)));

    let (status, _) = app.register(&event_id, "ben", None).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn idempotency_key_replays_original_registration() {
    let app = TestApp::spawn().await;
    let event_id = app.open_event(3).await;

    let (status, first) = app.register(&event_id, "cara", Some("cara-checkout-1")).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, replay) = app.register(&event_id, "cara", Some("cara-checkout-1")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(id_of(&first), id_of(&replay));

    let (_, event) = app.get_json(&format!("/api/v1/events/{event_id}")).await;
    assert_eq!(event.get("seats_reserved"), Some(&json!(1)));

    let (status, dup) = app.register(&event_id, "dan", Some("cara-checkout-1")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&dup), Some("DUPLICATE_REQUEST"));
}

#[tokio::test]
async fn draft_event_is_not_open() {
    let app = TestApp::spawn().await;
    let (status, event) = app
        .post_json("/api/v1/events", &json!({ "title": "Draft only", "capacity": 5 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let event_id = id_of(&event);

    let (status, hint) = app
        .get_json(&format!("/api/v1/events/{event_id}/admissibility"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hint.get("admissible"), Some(&json!(false)));
    assert_eq!(hint.get("reason"), Some(&json!("EVENT_NOT_OPEN")));

    let (status, body) = app.register(&event_id, "eve", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), Some("EVENT_NOT_OPEN"));
}

#[tokio::test]
async fn past_deadline_is_rejected() {
    let app = TestApp::spawn().await;
    let deadline = chrono::Utc::now() - chrono::Duration::minutes(1);
    let (_, event) = app
        .post_json(
            "/api/v1/events",
            &json!({ "title": "Yesterday", "capacity": 5, "registration_deadline": deadline }),
        )
        .await;
    let event_id = id_of(&event);
    let _ = app
        .post_json(&format!("/api/v1/events/{event_id}/publish"), &json!({}))
        .await;

    let (status, body) = app.register(&event_id, "fay", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), Some("DEADLINE_PASSED"));
}

#[tokio::test]
async fn attended_registration_cannot_be_cancelled() {
    let app = TestApp::spawn().await;
    let event_id = app.open_event(2).await;
    let (_, reg) = app.register(&event_id, "gus", None).await;
    let path = format!("/api/v1/registrations/{}/transition", id_of(&reg));

    for target in ["confirmed", "attended"] {
        let (status, _) = app
            .post_json(&path, &json!({ "target": target, "actor": "door" }))
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = app
        .post_json(&path, &json!({ "target": "cancelled", "actor": "admin" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error_code(&body), Some("INVALID_TRANSITION"));

    let (_, after) = app
        .get_json(&format!("/api/v1/registrations/{}", id_of(&reg)))
        .await;
    assert_eq!(after.get("status"), Some(&json!("attended")));
    assert_eq!(after.get("checked_in_by"), Some(&json!("door")));
}

#[tokio::test]
async fn unknown_ids_return_not_found() {
    let app = TestApp::spawn().await;
    let missing = uuid::Uuid::new_v4();

    let (status, body) = app.register(&missing.to_string(), "hal", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), Some("EVENT_NOT_FOUND"));

    let (status, body) = app
        .get_json(&format!("/api/v1/registrations/{missing}"))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), Some("REGISTRATION_NOT_FOUND"));
}

#[tokio::test]
async fn release_seat_is_idempotent() {
    let app = TestApp::spawn().await;
    let event_id = app.open_event(2).await;
    let (_, reg) = app.register(&event_id, "ivy", None).await;
    let path = format!("/api/v1/registrations/{}/release-seat", id_of(&reg));

    for _ in 0..2 {
        let (status, body) = app.post_json(&path, &json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.get("seat_held"), Some(&json!(false)));
    }
    let (_, event) = app.get_json(&format!("/api/v1/events/{event_id}")).await;
    assert_eq!(event.get("seats_reserved"), Some(&json!(0)));
    assert_eq!(event.get("seats_available"), Some(&json!(2)));
}

#[tokio::test]
async fn capacity_cannot_shrink_below_held_seats() {
    let app = TestApp::spawn().await;
    let event_id = app.open_event(3).await;
    for name in ["jo", "kai"] {
        let _ = app.register(&event_id, name, None).await;
    }

    let Ok(resp) = app
        .client
        .patch(app.url(&format!("/api/v1/events/{event_id}")))
        .json(&json!({ "capacity": 1 }))
        .send()
        .await
    else {
        panic!("PATCH failed");
    };
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = assert_ok!(
        app.client
            .patch(app.url(&format!("/api/v1/events/{event_id}")))
            .json(&json!({ "capacity": 2, "title": "Repair café (full)" }))
            .send()
            .await
    );
    assert_eq!(resp.status(), StatusCode::OK);
    let event: Value = assert_ok!(resp.json().await);
    assert_eq!(event.get("seats_available"), Some(&json!(0)));
    assert_eq!(event.get("seats_reserved"), Some(&json!(2)));
}

#[tokio::test]
async fn registrations_are_listed_with_pagination() {
    let app = TestApp::spawn().await;
    let event_id = app.open_event(0).await;
    for i in 0..5 {
        let (status, reg) = app.register(&event_id, &format!("guest{i}"), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(reg.get("seat_held"), Some(&json!(false)));
    }

    let (status, page) = app
        .get_json(&format!(
            "/api/v1/events/{event_id}/registrations?page=2&per_page=2"
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let Some(data) = page.get("data").and_then(Value::as_array) else {
        panic!("missing data: {page}");
    };
    assert_eq!(data.len(), 2);
    assert_eq!(
        page.get("pagination").and_then(|p| p.get("total")),
        Some(&json!(5))
    );
}

#[tokio::test]
async fn completing_event_reports_no_shows_and_viability() {
    let app = TestApp::spawn().await;
    let (_, event) = app
        .post_json(
            "/api/v1/events",
            &json!({ "title": "Board games", "capacity": 10, "min_attendees": 2, "auto_confirm": true }),
        )
        .await;
    let event_id = id_of(&event);
    let _ = app
        .post_json(&format!("/api/v1/events/{event_id}/publish"), &json!({}))
        .await;
    let (_, reg) = app.register(&event_id, "lou", None).await;
    assert_eq!(reg.get("status"), Some(&json!("confirmed")));

    let (status, viability) = app
        .get_json(&format!("/api/v1/events/{event_id}/viability"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        viability.get("viability").and_then(|v| v.get("verdict")),
        Some(&json!("below_minimum"))
    );

    let (status, done) = app
        .post_json(
            &format!("/api/v1/events/{event_id}/complete"),
            &json!({ "actor": "system" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done.get("no_shows_marked"), Some(&json!(1)));

    let (_, after) = app
        .get_json(&format!("/api/v1/registrations/{}", id_of(&reg)))
        .await;
    assert_eq!(after.get("status"), Some(&json!("no-show")));
}
