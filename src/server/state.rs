use std::sync::Arc;
use std::time::Instant;

use axum::extract::FromRef;

use crate::config::AppConfig;
use crate::push::PushEngine;
use crate::recs::RecommendationPipeline;
use crate::server::websocket::SessionRegistry;
use crate::store::RecommendationStore;

pub type GuardedStore = Arc<dyn RecommendationStore>;
pub type GuardedPipeline = Arc<RecommendationPipeline>;
pub type GuardedPushEngine = Arc<PushEngine>;
pub type GuardedSessionRegistry = Arc<SessionRegistry>;

#[derive(Clone)]
pub struct ServerState {
    pub config: AppConfig,
    pub start_time: Instant,
    pub store: GuardedStore,
    pub pipeline: GuardedPipeline,
    pub push: GuardedPushEngine,
    pub registry: GuardedSessionRegistry,
}

impl FromRef<ServerState> for GuardedStore {
    fn from_ref(input: &ServerState) -> Self {
        input.store.clone()
    }
}

impl FromRef<ServerState> for GuardedPipeline {
    fn from_ref(input: &ServerState) -> Self {
        input.pipeline.clone()
    }
}

impl FromRef<ServerState> for GuardedPushEngine {
    fn from_ref(input: &ServerState) -> Self {
        input.push.clone()
    }
}

impl FromRef<ServerState> for GuardedSessionRegistry {
    fn from_ref(input: &ServerState) -> Self {
        input.registry.clone()
    }
}

impl FromRef<ServerState> for AppConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
