//! Recommendation pipeline orchestration.
//!
//! Request path: cache lookup, cold-start or personalized candidate
//! generation, avoid filtering, context rerank, artist diversity, cache
//! store. The interaction write path lives here too because skip-burst
//! detection is a side duty of the pipeline; the transport relays the
//! resulting signal to the push engine.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, warn};

use super::diversity::enforce_artist_diversity;
use super::rerank::rerank_by_context;
use crate::cache::{CacheKey, RecommendationCache};
use crate::config::AppConfig;
use crate::deadline::Deadline;
use crate::error::CoreResult;
use crate::graph::InterestGraphEngine;
use crate::metrics;
use crate::model::{
    EventKind, Interaction, InterestGraphDoc, ListeningContext, NewInteraction,
    RecommendationResponse, Track, UserProfile,
};
use crate::store::RecommendationStore;
use crate::taste::ProfileEmbeddingEngine;

/// Parameters of one recommendation request.
#[derive(Debug, Clone, Default)]
pub struct RecommendationRequest {
    pub context: Option<ListeningContext>,
    pub limit: Option<usize>,
}

/// Result of recording an interaction.
#[derive(Debug, Clone)]
pub struct InteractionOutcome {
    pub interaction: Interaction,
    /// True when this event completed a skip burst; the caller owes the
    /// push engine a `skip_detected` trigger.
    pub refresh_triggered: bool,
}

pub struct RecommendationPipeline {
    store: Arc<dyn RecommendationStore>,
    cache: Arc<dyn RecommendationCache>,
    graph: InterestGraphEngine,
    taste: ProfileEmbeddingEngine,
    config: AppConfig,
}

impl RecommendationPipeline {
    pub fn new(
        store: Arc<dyn RecommendationStore>,
        cache: Arc<dyn RecommendationCache>,
        config: AppConfig,
    ) -> Self {
        Self {
            graph: InterestGraphEngine::new(store.clone()),
            taste: ProfileEmbeddingEngine::new(store.clone()),
            store,
            cache,
            config,
        }
    }

    /// Produce the ordered, diverse, context-adjusted list for a user.
    pub async fn get_recommendations(
        &self,
        deadline: Deadline,
        user_id: &str,
        request: RecommendationRequest,
    ) -> CoreResult<RecommendationResponse> {
        let limit = request
            .limit
            .unwrap_or(self.config.default_limit)
            .clamp(1, self.config.max_limit);
        let context = request.context.filter(|ctx| !ctx.is_empty());
        let key = CacheKey::recommendations(user_id, context.as_ref());

        if let Some(cached) = self.cache_lookup(&key).await {
            metrics::record_cache_lookup(true);
            return Ok(cached);
        }
        metrics::record_cache_lookup(false);

        let started = Instant::now();
        let profile = self.store.find_or_create_profile(deadline, user_id).await?;
        let stats = self.store.interaction_stats(deadline, user_id).await?;

        let cold_start = stats.total == 0
            || (profile.preferred_genres.is_empty() && profile.profile_embedding.is_none());

        let mut tracks = if cold_start {
            self.cold_start_candidates(deadline, &profile, limit).await?
        } else {
            self.personalized_candidates(deadline, user_id, limit).await?
        };

        if let Some(ctx) = context.as_ref() {
            rerank_by_context(&mut tracks, ctx);
        }
        let mut tracks = enforce_artist_diversity(tracks, self.config.max_same_artist);
        tracks.truncate(limit);

        let response = RecommendationResponse {
            tracks,
            context,
            generated_at: Utc::now(),
        };

        self.cache_store(&key, &response).await;
        metrics::record_pipeline_run(
            if cold_start { "cold_start" } else { "personalized" },
            started.elapsed(),
        );
        Ok(response)
    }

    /// Drop every cached entry of the user.
    pub async fn invalidate(&self, user_id: &str) {
        let prefix = CacheKey::user_prefix(user_id);
        if let Err(err) = self.cache.delete_prefix(&prefix).await {
            warn!(user_id, error = %err, "cache invalidation failed");
        }
    }

    /// Persist an interaction, kick the best-effort interest-graph
    /// refresh, and run skip-burst detection.
    pub async fn record_interaction(
        &self,
        deadline: Deadline,
        event: NewInteraction,
    ) -> CoreResult<InteractionOutcome> {
        let interaction = self.store.append_interaction(deadline, event).await?;
        let user_id = interaction.external_user_id.clone();

        if self.config.interest_graph_enabled {
            let graph = self.graph.clone();
            let budget = self.config.graph_refresh_deadline;
            let user = user_id.clone();
            tokio::spawn(async move {
                if let Err(err) = graph.refresh(Deadline::after(budget), &user).await {
                    debug!(user_id = %user, error = %err, "interest graph refresh failed");
                }
            });
        }

        let mut refresh_triggered = false;
        if interaction.event_type == EventKind::Skip {
            let skips = self
                .store
                .count_recent_skips(deadline, &user_id, self.config.skip_window)
                .await?;
            if skips >= self.config.skip_threshold {
                self.invalidate(&user_id).await;
                metrics::SKIP_BURSTS_TOTAL.inc();
                refresh_triggered = true;
            }
        }

        Ok(InteractionOutcome {
            interaction,
            refresh_triggered,
        })
    }

    async fn cache_lookup(&self, key: &CacheKey) -> Option<RecommendationResponse> {
        let raw = match self.cache.get(key).await {
            Ok(value) => value?,
            Err(err) => {
                warn!(%key, error = %err, "cache read failed, treating as miss");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(response) => Some(response),
            Err(err) => {
                warn!(%key, error = %err, "cached entry unreadable, treating as miss");
                None
            }
        }
    }

    async fn cache_store(&self, key: &CacheKey, response: &RecommendationResponse) {
        let raw = match serde_json::to_string(response) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%key, error = %err, "response serialization failed, skipping cache");
                return;
            }
        };
        if let Err(err) = self.cache.set(key, raw, self.config.cache_ttl).await {
            warn!(%key, error = %err, "cache write dropped");
        }
    }

    async fn cold_start_candidates(
        &self,
        deadline: Deadline,
        profile: &UserProfile,
        limit: usize,
    ) -> CoreResult<Vec<Track>> {
        let fetch = limit * self.config.coldstart_overfetch;
        let tracks = if profile.preferred_genres.is_empty() {
            self.store.popular_global(deadline, fetch).await?
        } else {
            self.store
                .popular_by_genre(deadline, &profile.preferred_genres, &[], fetch)
                .await?
        };
        Ok(tracks)
    }

    async fn personalized_candidates(
        &self,
        deadline: Deadline,
        user_id: &str,
        limit: usize,
    ) -> CoreResult<Vec<Track>> {
        // Best effort: continue with the stored embedding on failure.
        if let Err(err) = self.taste.recompute(deadline, user_id).await {
            warn!(user_id, error = %err, "profile embedding recompute failed, using existing");
        }

        let exclusions = self
            .store
            .recent_skip_track_ids(
                deadline,
                user_id,
                self.config.skip_exclusion_hours,
                self.config.skip_exclusion_limit,
            )
            .await?;

        // Reload to pick up the freshly recomputed embedding.
        let profile = self.store.find_or_create_profile(deadline, user_id).await?;

        match profile.profile_embedding.as_deref() {
            Some(embedding) => {
                let mut candidates = self
                    .store
                    .ann_candidates_by_embedding(
                        deadline,
                        embedding,
                        &exclusions,
                        limit * self.config.ann_overfetch,
                    )
                    .await?;

                if !profile.disliked_genres.is_empty() {
                    candidates.retain(|t| !profile.disliked_genres.contains(&t.genre));
                }

                if let Some(doc) = self.interest_graph(deadline, user_id).await {
                    let threshold = self.config.avoid_threshold;
                    candidates.retain(|t| !is_avoided(&doc, t, threshold));
                }

                Ok(candidates)
            }
            None => {
                let tracks = self
                    .store
                    .popular_by_genre(
                        deadline,
                        &profile.preferred_genres,
                        &exclusions,
                        limit * self.config.coldstart_overfetch,
                    )
                    .await?;
                Ok(tracks)
            }
        }
    }

    /// Best-effort graph fetch; any failure downgrades to "no bias".
    async fn interest_graph(
        &self,
        deadline: Deadline,
        user_id: &str,
    ) -> Option<InterestGraphDoc> {
        if !self.config.interest_graph_enabled {
            return None;
        }
        match self.graph.get_or_compute(deadline, user_id).await {
            Ok(doc) => doc,
            Err(err) => {
                warn!(user_id, error = %err, "interest graph unavailable, continuing unbiased");
                None
            }
        }
    }
}

fn is_avoided(doc: &InterestGraphDoc, track: &Track, threshold: f64) -> bool {
    let artist_score = doc.avoid_artists.get(&track.artist).copied().unwrap_or(0.0);
    let genre_score = doc.avoid_genres.get(&track.genre).copied().unwrap_or(0.0);
    artist_score >= threshold || genre_score >= threshold
}
