//! Typed HTTP and WebSocket clients for the e2e suite.

use std::time::Duration;

use encore_server::server::EXTERNAL_USER_ID_HEADER;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct TestClient {
    base_url: String,
    user_id: String,
    client: reqwest::Client,
}

impl TestClient {
    pub fn for_user(base_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            user_id: user_id.into(),
            client: reqwest::Client::new(),
        }
    }

    pub async fn get_me(&self) -> reqwest::Response {
        self.client
            .get(format!("{}/me", self.base_url))
            .header(EXTERNAL_USER_ID_HEADER, &self.user_id)
            .send()
            .await
            .expect("GET /me failed")
    }

    pub async fn put_preferences(&self, body: Value) -> reqwest::Response {
        self.client
            .put(format!("{}/me/preferences", self.base_url))
            .header(EXTERNAL_USER_ID_HEADER, &self.user_id)
            .json(&body)
            .send()
            .await
            .expect("PUT /me/preferences failed")
    }

    pub async fn set_preferred_genres(&self, genres: &[&str]) {
        let response = self
            .put_preferences(json!({ "preferredGenres": genres }))
            .await;
        assert!(
            response.status().is_success(),
            "failed to set preferences: {}",
            response.status()
        );
    }

    /// `query` is the raw query string, e.g. `limit=5&mood=HAPPY`.
    pub async fn get_recommendations(&self, query: &str) -> reqwest::Response {
        let url = if query.is_empty() {
            format!("{}/recommendations", self.base_url)
        } else {
            format!("{}/recommendations?{query}", self.base_url)
        };
        self.client
            .get(url)
            .header(EXTERNAL_USER_ID_HEADER, &self.user_id)
            .send()
            .await
            .expect("GET /recommendations failed")
    }

    /// Fetch recommendations and return the response track IDs.
    pub async fn recommended_track_ids(&self, query: &str) -> Vec<String> {
        let response = self.get_recommendations(query).await;
        assert!(
            response.status().is_success(),
            "recommendations failed: {}",
            response.status()
        );
        let body: Value = response.json().await.unwrap();
        body["tracks"]
            .as_array()
            .expect("tracks missing")
            .iter()
            .map(|t| t["id"].as_str().unwrap().to_string())
            .collect()
    }

    pub async fn post_interaction(&self, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/interactions", self.base_url))
            .header(EXTERNAL_USER_ID_HEADER, &self.user_id)
            .json(&body)
            .send()
            .await
            .expect("POST /interactions failed")
    }

    pub async fn post_event(&self, track_id: &str, event_type: &str) -> Value {
        let response = self
            .post_interaction(json!({ "trackId": track_id, "eventType": event_type }))
            .await;
        assert!(
            response.status().is_success(),
            "interaction failed: {}",
            response.status()
        );
        response.json().await.unwrap()
    }

    /// Request without the identity header, for auth tests.
    pub async fn get_unauthenticated(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{path}", self.base_url))
            .send()
            .await
            .expect("request failed")
    }
}

/// Open a push-channel connection for a user.
pub async fn connect_ws(base_url: &str, user_id: &str) -> WsClient {
    let ws_url = format!(
        "{}/recommendations/ws?userId={user_id}",
        base_url.replace("http://", "ws://")
    );
    let (ws, _) = connect_async(ws_url)
        .await
        .expect("Failed to connect to push channel");
    ws
}

/// Send an envelope on the push channel.
pub async fn send_ws(ws: &mut WsClient, msg_type: &str) {
    let envelope = json!({ "type": msg_type });
    ws.send(Message::Text(envelope.to_string().into()))
        .await
        .expect("ws send failed");
}

/// Wait for the next envelope with the given type, discarding others.
pub async fn wait_for_message(ws: &mut WsClient, msg_type: &str, wait: Duration) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return None;
        }
        let frame = match timeout(remaining, ws.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(_))) | Ok(None) => return None,
            Err(_) => return None,
        };
        if let Message::Text(text) = frame {
            let value: Value = serde_json::from_str(&text).ok()?;
            if value["type"] == msg_type {
                return Some(value);
            }
        }
    }
}
