//! In-memory store implementation.
//!
//! Backs the test suites with the same observable semantics as the
//! Postgres store: cosine candidate ordering, popularity served from a
//! snapshot that only changes on refresh, and the transactional
//! profile-embedding recomputation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::trait_def::{RecommendationStore, StoreError};
use super::weighted_mean_embedding;
use crate::deadline::Deadline;
use crate::model::{
    EventKind, Interaction, InteractionMetaRow, InteractionStats, InterestGraphDoc,
    NewInteraction, Track, UserProfile,
};

struct StoredGraph {
    doc: InterestGraphDoc,
    revision: i64,
}

#[derive(Default)]
struct Inner {
    tracks: Vec<Track>,
    interactions: Vec<Interaction>,
    next_interaction_id: i64,
    profiles: HashMap<String, UserProfile>,
    graphs: HashMap<String, StoredGraph>,
    /// Popularity snapshot; only [`refresh_popular_tracks`] rebuilds it,
    /// mirroring the out-of-band materialized aggregate.
    popularity: HashMap<String, i64>,
}

/// In-memory recommendation store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a track into the catalog (the ingestion side in production).
    pub fn insert_track(&self, track: Track) {
        self.inner.lock().unwrap().tracks.push(track);
    }

    /// Current revision of a user's interest-graph row.
    pub fn graph_revision(&self, user_id: &str) -> Option<i64> {
        self.inner
            .lock()
            .unwrap()
            .graphs
            .get(user_id)
            .map(|g| g.revision)
    }

    /// Shift all of a user's interactions into the past. Lets tests place
    /// events outside the skip window or the exclusion horizon.
    pub fn backdate_interactions(&self, user_id: &str, by: Duration) {
        let delta = chrono::Duration::from_std(by).expect("backdate duration out of range");
        let mut inner = self.inner.lock().unwrap();
        for interaction in inner
            .interactions
            .iter_mut()
            .filter(|i| i.external_user_id == user_id)
        {
            interaction.created_at -= delta;
        }
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

fn guard(deadline: Deadline) -> Result<(), StoreError> {
    if deadline.is_elapsed() {
        return Err(StoreError::Timeout);
    }
    Ok(())
}

#[async_trait]
impl RecommendationStore for MemoryStore {
    async fn append_interaction(
        &self,
        deadline: Deadline,
        event: NewInteraction,
    ) -> Result<Interaction, StoreError> {
        guard(deadline)?;
        let mut inner = self.inner.lock().unwrap();
        if !inner.tracks.iter().any(|t| t.id == event.track_id) {
            return Err(StoreError::ForeignKey("track".into()));
        }
        inner.next_interaction_id += 1;
        let interaction = Interaction {
            id: inner.next_interaction_id,
            external_user_id: event.external_user_id,
            track_id: event.track_id,
            event_type: event.event_type,
            event_value: event.event_value,
            context: event.context,
            client_ts: event.client_ts,
            created_at: Utc::now(),
        };
        inner.interactions.push(interaction.clone());
        Ok(interaction)
    }

    async fn count_recent_skips(
        &self,
        deadline: Deadline,
        user_id: &str,
        window: Duration,
    ) -> Result<u64, StoreError> {
        guard(deadline)?;
        let cutoff = Utc::now() - chrono::Duration::from_std(window).unwrap_or_default();
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .interactions
            .iter()
            .filter(|i| {
                i.external_user_id == user_id
                    && i.event_type == EventKind::Skip
                    && i.created_at > cutoff
            })
            .count() as u64)
    }

    async fn recent_skip_track_ids(
        &self,
        deadline: Deadline,
        user_id: &str,
        hours_back: u32,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        guard(deadline)?;
        let cutoff = Utc::now() - chrono::Duration::hours(hours_back as i64);
        let inner = self.inner.lock().unwrap();
        let mut seen = Vec::new();
        for interaction in inner.interactions.iter().rev() {
            if interaction.external_user_id == user_id
                && interaction.event_type == EventKind::Skip
                && interaction.created_at > cutoff
                && !seen.contains(&interaction.track_id)
            {
                seen.push(interaction.track_id.clone());
                if seen.len() == limit {
                    break;
                }
            }
        }
        Ok(seen)
    }

    async fn interaction_stats(
        &self,
        deadline: Deadline,
        user_id: &str,
    ) -> Result<InteractionStats, StoreError> {
        guard(deadline)?;
        let inner = self.inner.lock().unwrap();
        let mut stats = InteractionStats::default();
        for interaction in inner
            .interactions
            .iter()
            .filter(|i| i.external_user_id == user_id)
        {
            stats.total += 1;
            match interaction.event_type {
                EventKind::Like => stats.like_count += 1,
                EventKind::Skip => stats.skip_count += 1,
                EventKind::Play => stats.play_count += 1,
                _ => {}
            }
        }
        Ok(stats)
    }

    async fn recent_interactions_with_track_meta(
        &self,
        deadline: Deadline,
        user_id: &str,
        limit: usize,
        window_days: u32,
        kinds: &[EventKind],
    ) -> Result<Vec<InteractionMetaRow>, StoreError> {
        guard(deadline)?;
        let cutoff = Utc::now() - chrono::Duration::days(window_days as i64);
        let inner = self.inner.lock().unwrap();
        let mut recent: Vec<&Interaction> = inner
            .interactions
            .iter()
            .filter(|i| {
                i.external_user_id == user_id
                    && i.created_at > cutoff
                    && kinds.contains(&i.event_type)
            })
            .collect();
        // Interaction IDs are assigned in append order, which breaks
        // timestamp ties the way the store's created_at ordering does.
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        recent.truncate(limit);
        Ok(recent
            .into_iter()
            .filter_map(|i| {
                inner
                    .tracks
                    .iter()
                    .find(|t| t.id == i.track_id)
                    .map(|t| InteractionMetaRow {
                        event_type: i.event_type,
                        created_at: i.created_at,
                        artist: t.artist.clone(),
                        genre: t.genre.clone(),
                    })
            })
            .collect())
    }

    async fn recent_track_ids_for_user(
        &self,
        deadline: Deadline,
        user_id: &str,
        limit: usize,
        kinds: &[EventKind],
    ) -> Result<Vec<String>, StoreError> {
        guard(deadline)?;
        let inner = self.inner.lock().unwrap();
        let mut recent: Vec<&Interaction> = inner
            .interactions
            .iter()
            .filter(|i| i.external_user_id == user_id && kinds.contains(&i.event_type))
            .collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        recent.truncate(limit);
        recent.reverse();
        Ok(recent.iter().map(|i| i.track_id.clone()).collect())
    }

    async fn ann_candidates_by_embedding(
        &self,
        deadline: Deadline,
        embedding: &[f32],
        exclude_ids: &[String],
        limit: usize,
    ) -> Result<Vec<Track>, StoreError> {
        guard(deadline)?;
        let inner = self.inner.lock().unwrap();
        let mut scored: Vec<(f64, usize, Track)> = inner
            .tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| !exclude_ids.contains(&t.id))
            .filter_map(|(idx, t)| {
                t.embedding
                    .as_ref()
                    .map(|e| (cosine_distance(e, embedding), idx, t.clone()))
            })
            .collect();
        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });
        Ok(scored.into_iter().take(limit).map(|(_, _, t)| t).collect())
    }

    async fn popular_by_genre(
        &self,
        deadline: Deadline,
        genres: &[String],
        exclude_ids: &[String],
        limit: usize,
    ) -> Result<Vec<Track>, StoreError> {
        guard(deadline)?;
        let inner = self.inner.lock().unwrap();
        let mut scored: Vec<(i64, usize, Track)> = inner
            .tracks
            .iter()
            .enumerate()
            .filter(|(_, t)| genres.contains(&t.genre) && !exclude_ids.contains(&t.id))
            .filter_map(|(idx, t)| {
                inner
                    .popularity
                    .get(&t.id)
                    .map(|score| (*score, idx, t.clone()))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        Ok(scored.into_iter().take(limit).map(|(_, _, t)| t).collect())
    }

    async fn popular_global(
        &self,
        deadline: Deadline,
        limit: usize,
    ) -> Result<Vec<Track>, StoreError> {
        guard(deadline)?;
        let inner = self.inner.lock().unwrap();
        let mut scored: Vec<(i64, usize, Track)> = inner
            .tracks
            .iter()
            .enumerate()
            .filter_map(|(idx, t)| {
                inner
                    .popularity
                    .get(&t.id)
                    .map(|score| (*score, idx, t.clone()))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        Ok(scored.into_iter().take(limit).map(|(_, _, t)| t).collect())
    }

    async fn refresh_popular_tracks(&self, deadline: Deadline) -> Result<(), StoreError> {
        guard(deadline)?;
        let mut inner = self.inner.lock().unwrap();
        let mut counts: HashMap<String, i64> = HashMap::new();
        for interaction in &inner.interactions {
            if matches!(interaction.event_type, EventKind::Play | EventKind::Like) {
                *counts.entry(interaction.track_id.clone()).or_default() += 1;
            }
        }
        inner.popularity = counts;
        Ok(())
    }

    async fn get_interest_graph(
        &self,
        deadline: Deadline,
        user_id: &str,
    ) -> Result<Option<InterestGraphDoc>, StoreError> {
        guard(deadline)?;
        let inner = self.inner.lock().unwrap();
        Ok(inner.graphs.get(user_id).map(|g| g.doc.clone()))
    }

    async fn upsert_interest_graph(
        &self,
        deadline: Deadline,
        user_id: &str,
        doc: &InterestGraphDoc,
    ) -> Result<(), StoreError> {
        guard(deadline)?;
        let mut inner = self.inner.lock().unwrap();
        inner
            .graphs
            .entry(user_id.to_string())
            .and_modify(|g| {
                g.doc = doc.clone();
                g.revision += 1;
            })
            .or_insert_with(|| StoredGraph {
                doc: doc.clone(),
                revision: 1,
            });
        Ok(())
    }

    async fn upsert_profile_embedding(
        &self,
        deadline: Deadline,
        user_id: &str,
    ) -> Result<(), StoreError> {
        guard(deadline)?;
        let mut inner = self.inner.lock().unwrap();
        let cutoff = Utc::now() - chrono::Duration::days(90);
        let mut qualifying: Vec<&Interaction> = inner
            .interactions
            .iter()
            .filter(|i| {
                i.external_user_id == user_id
                    && i.created_at > cutoff
                    && matches!(
                        i.event_type,
                        EventKind::Like | EventKind::Play | EventKind::Skip
                    )
            })
            .collect();
        qualifying.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let contributions: Vec<(EventKind, Vec<f32>)> = qualifying
            .into_iter()
            .filter_map(|i| {
                inner
                    .tracks
                    .iter()
                    .find(|t| t.id == i.track_id)
                    .and_then(|t| t.embedding.clone())
                    .map(|e| (i.event_type, e))
            })
            .take(50)
            .collect();

        if let Some(mean) = weighted_mean_embedding(&contributions) {
            if let Some(profile) = inner.profiles.get_mut(user_id) {
                profile.profile_embedding = Some(mean);
            }
        }
        Ok(())
    }

    async fn find_or_create_profile(
        &self,
        deadline: Deadline,
        user_id: &str,
    ) -> Result<UserProfile, StoreError> {
        guard(deadline)?;
        let mut inner = self.inner.lock().unwrap();
        let profile = inner
            .profiles
            .entry(user_id.to_string())
            .and_modify(|p| p.last_active_at = Utc::now())
            .or_insert_with(|| UserProfile {
                external_user_id: user_id.to_string(),
                preferred_genres: Vec::new(),
                disliked_genres: Vec::new(),
                last_active_at: Utc::now(),
                profile_embedding: None,
            });
        Ok(profile.clone())
    }

    async fn update_preferences(
        &self,
        deadline: Deadline,
        user_id: &str,
        preferred_genres: &[String],
        disliked_genres: Option<&[String]>,
    ) -> Result<UserProfile, StoreError> {
        guard(deadline)?;
        let mut inner = self.inner.lock().unwrap();
        let profile = inner
            .profiles
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile {
                external_user_id: user_id.to_string(),
                preferred_genres: Vec::new(),
                disliked_genres: Vec::new(),
                last_active_at: Utc::now(),
                profile_embedding: None,
            });
        profile.preferred_genres = preferred_genres.to_vec();
        if let Some(disliked) = disliked_genres {
            profile.disliked_genres = disliked.to_vec();
        }
        profile.last_active_at = Utc::now();
        Ok(profile.clone())
    }
}
