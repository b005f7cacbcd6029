//! API Integration Tests
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot`:
//! - JSON submission, tally and reset
//! - identity and roster checks
//! - HTML live view and its form routes
//! - live SSE stream and subscription release

mod common;

use axum::http::StatusCode;
use classpulse_core::{
    api::{build_router, Event, EventType},
    ClassId, DocumentStore, InMemoryStore,
};
use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tower::ServiceExt;

#[tokio::test]
async fn test_health() {
    let app = build_router(test_state(Arc::new(InMemoryStore::new())));
    let response = app
        .oneshot(empty_request("GET", "/health", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["instance_id"], "test");
}

#[tokio::test]
async fn test_list_classes() {
    let app = build_router(test_state(Arc::new(InMemoryStore::new())));
    let response = app
        .oneshot(empty_request("GET", "/classes", Some(ALICE)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!([
            { "id": "cp2106", "name": "Orbital" },
            { "id": "open101", "name": "Open lecture" }
        ])
    );
}

#[tokio::test]
async fn test_errors_carry_json_body() {
    let app = build_router(test_state(Arc::new(InMemoryStore::new())));
    let response = app
        .oneshot(empty_request("GET", "/classes/nope/feedback", Some(ALICE)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("nope"));
}

#[tokio::test]
async fn test_submit_then_counts() {
    let store = Arc::new(InMemoryStore::new());
    let app = build_router(test_state(store.clone()));

    for (who, reaction) in [(ALICE, "fast"), (BOB, "fast"), (ALICE, "fast"), (BOB, "slow")] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/classes/cp2106/feedback",
                Some(who),
                json!({ "reaction": reaction }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .oneshot(empty_request("GET", "/classes/cp2106/feedback", Some(ALICE)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["total"], 4);
    assert_eq!(body["counts"]["counts"], json!([3, 1, 0, 0]));
    assert_eq!(body["bars"][0]["percent"], 75);
    assert_eq!(body["bars"][1]["percent"], 25);
    assert_eq!(body["bars"][0]["label"], "3 out of 4 find the lecture **fast**");
    assert_eq!(body["can_reset"], false);

    let entries = store.list_entries(&ClassId::new("cp2106")).await.unwrap();
    assert!(entries.iter().all(|e| e.submitter == ALICE || e.submitter == BOB));
}

#[tokio::test]
async fn test_invalid_reaction_is_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let app = build_router(test_state(store.clone()));

    let response = app
        .oneshot(json_request(
            "POST",
            "/classes/cp2106/feedback",
            Some(ALICE),
            json!({ "reaction": "bored" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(store
        .list_entries(&ClassId::new("cp2106"))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_identity_and_roster_checks() {
    let app = build_router(test_state(Arc::new(InMemoryStore::new())));

    let anonymous = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/classes/cp2106/feedback",
            None,
            json!({ "reaction": "good" }),
        ))
        .await
        .unwrap();
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let outsider = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/classes/cp2106/feedback",
            Some(OUTSIDER),
            json!({ "reaction": "good" }),
        ))
        .await
        .unwrap();
    assert_eq!(outsider.status(), StatusCode::FORBIDDEN);

    let open_class = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/classes/open101/feedback",
            Some(OUTSIDER),
            json!({ "reaction": "good" }),
        ))
        .await
        .unwrap();
    assert_eq!(open_class.status(), StatusCode::CREATED);

    let unknown = app
        .oneshot(empty_request("GET", "/classes/nope/feedback", Some(ALICE)))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reset_is_gated_server_side() {
    let store = Arc::new(InMemoryStore::new());
    let state = test_state(store.clone());
    let mut activity = state.events.subscribe();
    let app = build_router(state);

    for _ in 0..3 {
        app.clone()
            .oneshot(json_request(
                "POST",
                "/classes/cp2106/feedback",
                Some(ALICE),
                json!({ "reaction": "confusing" }),
            ))
            .await
            .unwrap();
    }

    let student = app
        .clone()
        .oneshot(empty_request("POST", "/classes/cp2106/feedback/reset", Some(ALICE)))
        .await
        .unwrap();
    assert_eq!(student.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        store.list_entries(&ClassId::new("cp2106")).await.unwrap().len(),
        3
    );

    let tutor = app
        .oneshot(empty_request("POST", "/classes/cp2106/feedback/reset", Some(TUTOR)))
        .await
        .unwrap();
    assert_eq!(tutor.status(), StatusCode::OK);
    let report = body_json(tutor).await;
    assert_eq!(report["requested"], 3);
    assert_eq!(report["deleted"], 3);
    assert_eq!(report["failed"], json!([]));
    assert!(store
        .list_entries(&ClassId::new("cp2106"))
        .await
        .unwrap()
        .is_empty());

    // Three submissions then one reset on the activity stream
    let mut kinds = Vec::new();
    while let Ok(event) = activity.try_recv() {
        kinds.push(event);
    }
    assert_eq!(kinds.len(), 4);
    assert!(matches!(
        kinds.last().map(|e: &Event| &e.event_type),
        Some(EventType::FeedbackReset { deleted: 3, failed: 0, .. })
    ));
}

#[tokio::test]
async fn test_live_page_and_forms() {
    let store = Arc::new(InMemoryStore::new());
    let app = build_router(test_state(store.clone()));

    let page = app
        .clone()
        .oneshot(empty_request("GET", "/classes/cp2106/live", Some(ALICE)))
        .await
        .unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    let html = body_string(page).await;
    assert!(html.contains("action=\"/classes/cp2106/live\""));
    assert!(html.contains("0 out of 0 find the lecture <strong>fast</strong>"));
    assert!(!html.contains("Reset responses"));

    let submitted = app
        .clone()
        .oneshot(form_request("/classes/cp2106/live", Some(ALICE), "reaction=slow"))
        .await
        .unwrap();
    assert_eq!(submitted.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        submitted.headers().get("location").unwrap(),
        "/classes/cp2106/live"
    );

    let rejected = app
        .clone()
        .oneshot(form_request("/classes/cp2106/live", Some(ALICE), "reaction=bored"))
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    let html = body_string(rejected).await;
    assert!(html.contains("Failed to submit feedback"));
    assert!(html.contains("1 out of 1 find the lecture <strong>slow</strong>"));

    let tutor_page = app
        .clone()
        .oneshot(empty_request("GET", "/classes/cp2106/live", Some(TUTOR)))
        .await
        .unwrap();
    assert!(body_string(tutor_page).await.contains("Reset responses"));

    let reset = app
        .oneshot(form_request("/classes/cp2106/live/reset", Some(TUTOR), ""))
        .await
        .unwrap();
    assert_eq!(reset.status(), StatusCode::OK);
    let html = body_string(reset).await;
    assert!(html.contains("Reset 1 responses"));
    assert!(html.contains("0 out of 0 find the lecture <strong>slow</strong>"));
}

#[tokio::test]
async fn test_stream_pushes_live_tally_and_releases_query() {
    let store = Arc::new(InMemoryStore::new());
    let class = ClassId::new("cp2106");
    let app = build_router(test_state(store.clone()));

    let response = app
        .oneshot(empty_request("GET", "/classes/cp2106/feedback/stream", Some(ALICE)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.subscriber_count(&class), 1);

    let mut body = Box::pin(response.into_body().into_data_stream());
    let mut seen = String::new();

    async fn read_until(
        body: &mut (impl tokio_stream::Stream<Item = Result<axum::body::Bytes, axum::Error>> + Unpin),
        seen: &mut String,
        needle: &str,
    ) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !seen.contains(needle) {
                let chunk = body.next().await.expect("stream ended").unwrap();
                seen.push_str(&String::from_utf8_lossy(&chunk));
            }
        })
        .await
        .expect("event not received in time");
    }

    read_until(&mut body, &mut seen, "\"state\":\"live\"").await;
    assert!(seen.contains("event: state"));

    store
        .write_entry(&classpulse_core::FeedbackEntry::new(
            class.clone(),
            classpulse_core::Reaction::Good,
            ALICE,
        ))
        .await
        .unwrap();
    read_until(&mut body, &mut seen, "[0,0,0,1]").await;

    drop(body);
    tokio::time::timeout(Duration::from_secs(2), async {
        while store.subscriber_count(&class) != 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("live query not released after disconnect");
}
