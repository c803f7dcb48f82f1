//! End-to-end tests for interaction recording and skip-burst detection.

mod common;

use common::*;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn play_event_is_recorded() {
    let server = TestServer::spawn().await;
    server.store.insert_track(track("t1", "Artist A", "Pop"));

    let client = TestClient::for_user(server.base_url.clone(), USER_1);
    let body = client.post_event("t1", "PLAY").await;

    assert_eq!(body["success"], true);
    assert_eq!(body["refreshTriggered"], false);
    let interaction = &body["interaction"];
    assert!(interaction["id"].as_i64().unwrap() > 0);
    assert_eq!(interaction["externalUserId"], USER_1);
    assert_eq!(interaction["trackId"], "t1");
    assert_eq!(interaction["eventType"], "PLAY");
}

#[tokio::test]
async fn unknown_track_is_a_client_error() {
    let server = TestServer::spawn().await;
    let client = TestClient::for_user(server.base_url.clone(), USER_1);

    let response = client
        .post_interaction(json!({ "trackId": "missing", "eventType": "PLAY" }))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "validation_error");
}

#[tokio::test]
async fn unknown_event_type_is_a_client_error() {
    let server = TestServer::spawn().await;
    server.store.insert_track(track("t1", "Artist A", "Pop"));

    let client = TestClient::for_user(server.base_url.clone(), USER_1);
    let response = client
        .post_interaction(json!({ "trackId": "t1", "eventType": "HUM" }))
        .await;
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn client_timestamp_and_context_are_echoed_but_not_trusted() {
    let server = TestServer::spawn().await;
    server.store.insert_track(track("t1", "Artist A", "Pop"));

    let client = TestClient::for_user(server.base_url.clone(), USER_1);
    let response = client
        .post_interaction(json!({
            "trackId": "t1",
            "eventType": "PLAY",
            "clientTs": 1_700_000_000,
            "context": { "mood": "HAPPY", "activity": "WORK" },
        }))
        .await;
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    let interaction = &body["interaction"];
    assert_eq!(interaction["clientTs"], 1_700_000_000);
    assert_eq!(interaction["context"]["mood"], "HAPPY");
    // The server clock, not clientTs, stamps the event.
    assert!(interaction["createdAt"].as_str().is_some());
}

#[tokio::test]
async fn body_user_id_is_ignored_in_favor_of_identity() {
    let server = TestServer::spawn().await;
    server.store.insert_track(track("t1", "Artist A", "Pop"));

    let client = TestClient::for_user(server.base_url.clone(), USER_1);
    let response = client
        .post_interaction(json!({
            "trackId": "t1",
            "eventType": "PLAY",
            "externalUserId": "someone-else",
        }))
        .await;
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["interaction"]["externalUserId"], USER_1);
}

#[tokio::test]
async fn single_skip_does_not_trigger_a_refresh() {
    let server = TestServer::spawn().await;
    server.store.insert_track(track("t1", "Artist A", "Pop"));

    let client = TestClient::for_user(server.base_url.clone(), USER_1);
    let body = client.post_event("t1", "SKIP").await;
    assert_eq!(body["refreshTriggered"], false);
}

#[tokio::test]
async fn skip_burst_flags_a_refresh() {
    let server = TestServer::spawn().await;
    server.store.insert_track(track("t1", "Artist A", "Pop"));
    server.store.insert_track(track("t2", "Artist B", "Pop"));

    let client = TestClient::for_user(server.base_url.clone(), USER_1);
    let first = client.post_event("t1", "SKIP").await;
    assert_eq!(first["refreshTriggered"], false);
    let second = client.post_event("t2", "SKIP").await;
    assert_eq!(second["refreshTriggered"], true);
}

#[tokio::test]
async fn skips_outside_the_window_do_not_count() {
    let server = TestServer::spawn().await;
    server.store.insert_track(track("t1", "Artist A", "Pop"));
    server.store.insert_track(track("t2", "Artist B", "Pop"));

    let client = TestClient::for_user(server.base_url.clone(), USER_1);
    client.post_event("t1", "SKIP").await;
    // Age the first skip past the 60 s window.
    server
        .store
        .backdate_interactions(USER_1, std::time::Duration::from_secs(120));

    let body = client.post_event("t2", "SKIP").await;
    assert_eq!(body["refreshTriggered"], false);
}

#[tokio::test]
async fn interactions_require_identity() {
    let server = TestServer::spawn().await;
    let response = reqwest::Client::new()
        .post(format!("{}/interactions", server.base_url))
        .json(&json!({ "trackId": "t1", "eventType": "PLAY" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
