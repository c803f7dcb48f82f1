//! Push engine.
//!
//! Delivers `recommendations:update` events to every live session of a
//! user. Triggers for one user are strictly serialized behind a per-user
//! lock; distinct users fan out concurrently. Everything past the trigger
//! boundary is best effort: a failed pipeline rerun or a failed emit
//! leaves sessions silent until the next successful trigger.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::deadline::Deadline;
use crate::metrics;
use crate::model::Track;
use crate::recs::{RecommendationPipeline, RecommendationRequest};
use crate::server::websocket::{msg_types, ServerMessage, SessionRegistry};

/// Why a refresh was pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshReason {
    SkipDetected,
    ContextChange,
    ManualRefresh,
}

impl RefreshReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshReason::SkipDetected => "skip_detected",
            RefreshReason::ContextChange => "context_change",
            RefreshReason::ManualRefresh => "manual_refresh",
        }
    }
}

/// Payload of a `recommendations:update` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationsUpdate {
    pub tracks: Vec<Track>,
    pub reason: RefreshReason,
}

pub struct PushEngine {
    registry: Arc<SessionRegistry>,
    pipeline: Arc<RecommendationPipeline>,
    config: AppConfig,
    /// Per-user serialization locks, created lazily on first trigger.
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PushEngine {
    pub fn new(
        registry: Arc<SessionRegistry>,
        pipeline: Arc<RecommendationPipeline>,
        config: AppConfig,
    ) -> Self {
        Self {
            registry,
            pipeline,
            config,
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.user_locks.lock().unwrap();
        locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Invalidate the user's cache, rerun the pipeline, and fan the fresh
    /// list out to every live session. Never fails; failures are logged
    /// and the sessions stay silent.
    pub async fn trigger_refresh(&self, user_id: &str, reason: RefreshReason) {
        metrics::PUSH_TRIGGERS_TOTAL
            .with_label_values(&[reason.as_str()])
            .inc();

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        self.pipeline.invalidate(user_id).await;

        let deadline = Deadline::after(self.config.request_deadline);
        let request = RecommendationRequest {
            context: None,
            limit: Some(self.config.default_limit),
        };
        let response = match self
            .pipeline
            .get_recommendations(deadline, user_id, request)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(user_id, reason = reason.as_str(), error = %err,
                    "refresh pipeline failed, skipping fan-out");
                return;
            }
        };

        let message = ServerMessage::new(
            msg_types::RECOMMENDATIONS_UPDATE,
            RecommendationsUpdate {
                tracks: response.tracks,
                reason,
            },
        );

        for (session_id, sender) in self.registry.senders_for_user(user_id).await {
            let emit = tokio::time::timeout(self.config.emit_deadline, sender.send(message.clone()));
            match emit.await {
                Ok(Ok(())) => {
                    metrics::PUSH_EMITS_TOTAL.with_label_values(&["ok"]).inc();
                }
                Ok(Err(_)) => {
                    debug!(user_id, %session_id, "emit to closed session skipped");
                    metrics::PUSH_EMITS_TOTAL.with_label_values(&["closed"]).inc();
                }
                Err(_) => {
                    warn!(user_id, %session_id, "emit abandoned on deadline");
                    metrics::PUSH_EMITS_TOTAL
                        .with_label_values(&["timeout"])
                        .inc();
                }
            }
        }
    }
}
