//! Push session registry.
//!
//! Tracks all live push sessions, organized per user. The registry holds
//! the only strong reference to a session's outgoing channel; dropping the
//! entry on disconnect severs it, so a departed connection can never
//! receive another emit.

use std::collections::HashMap;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::messages::ServerMessage;
use crate::metrics;

/// Error type for send operations.
#[derive(Debug, Clone, PartialEq)]
pub enum SendError {
    /// The target session is not registered.
    NotConnected,
    /// The session's channel is closed (connection went away).
    Disconnected,
}

/// Per-user sets of live push sessions.
///
/// Sessions are keyed by a per-connection UUID so a user can hold many
/// concurrent connections (several tabs, several devices).
pub struct SessionRegistry {
    /// user_id -> (session_id -> outgoing channel)
    sessions: RwLock<HashMap<String, HashMap<Uuid, mpsc::Sender<ServerMessage>>>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new session and return the receiver for its outgoing
    /// messages. The caller forwards messages from this receiver to the
    /// socket.
    pub async fn register(&self, user_id: &str, session_id: Uuid) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(32);
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(user_id.to_string())
            .or_default()
            .insert(session_id, tx);
        metrics::LIVE_SESSIONS.inc();
        rx
    }

    /// Remove a session; cleans up the user entry when it becomes empty.
    /// Safe to call twice for the same session.
    pub async fn unregister(&self, user_id: &str, session_id: Uuid) {
        let mut sessions = self.sessions.write().await;
        if let Some(user_sessions) = sessions.get_mut(user_id) {
            if user_sessions.remove(&session_id).is_some() {
                metrics::LIVE_SESSIONS.dec();
            }
            if user_sessions.is_empty() {
                sessions.remove(user_id);
            }
        }
    }

    /// Send a message to one session.
    pub async fn send_to_session(
        &self,
        user_id: &str,
        session_id: Uuid,
        message: ServerMessage,
    ) -> Result<(), SendError> {
        let sessions = self.sessions.read().await;
        let Some(sender) = sessions
            .get(user_id)
            .and_then(|user_sessions| user_sessions.get(&session_id))
        else {
            return Err(SendError::NotConnected);
        };
        sender
            .send(message)
            .await
            .map_err(|_| SendError::Disconnected)
    }

    /// Snapshot of the user's session channels, for fan-out.
    pub async fn senders_for_user(
        &self,
        user_id: &str,
    ) -> Vec<(Uuid, mpsc::Sender<ServerMessage>)> {
        let sessions = self.sessions.read().await;
        sessions
            .get(user_id)
            .map(|user_sessions| {
                user_sessions
                    .iter()
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of live sessions for one user.
    pub async fn session_count(&self, user_id: &str) -> usize {
        let sessions = self.sessions.read().await;
        sessions.get(user_id).map(|s| s.len()).unwrap_or(0)
    }

    /// Total sessions across all users.
    pub async fn total_sessions(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.values().map(|s| s.len()).sum()
    }

    /// Count of users with at least one live session.
    pub async fn connected_user_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }
}
