//! RecommendationStore trait definition.

use std::time::Duration;

use async_trait::async_trait;

use crate::deadline::Deadline;
use crate::model::{
    EventKind, Interaction, InteractionMetaRow, InteractionStats, InterestGraphDoc,
    NewInteraction, Track, UserProfile,
};

/// Storage-layer failures. Callers never retry at this layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A referenced entity does not exist (foreign-key violation).
    #[error("{0} reference does not exist")]
    ForeignKey(String),

    /// The query itself failed for a reason not attributable to input.
    #[error("query failed: {0}")]
    Query(String),

    /// The request deadline elapsed before the call completed.
    #[error("store call timed out")]
    Timeout,
}

/// Trait for the track & interaction storage backend.
///
/// Every operation takes the request [`Deadline`]; implementations race
/// their I/O against the remaining budget and surface
/// [`StoreError::Timeout`] when it runs out.
#[async_trait]
pub trait RecommendationStore: Send + Sync {
    // =========================================================================
    // Interactions
    // =========================================================================

    /// Append one interaction event. The referenced track must exist.
    async fn append_interaction(
        &self,
        deadline: Deadline,
        event: NewInteraction,
    ) -> Result<Interaction, StoreError>;

    /// Count `SKIP` events for the user inside `(now - window, now]`.
    async fn count_recent_skips(
        &self,
        deadline: Deadline,
        user_id: &str,
        window: Duration,
    ) -> Result<u64, StoreError>;

    /// Distinct track IDs the user skipped within the last `hours_back`
    /// hours, most recently skipped first, bounded by `limit`.
    async fn recent_skip_track_ids(
        &self,
        deadline: Deadline,
        user_id: &str,
        hours_back: u32,
        limit: usize,
    ) -> Result<Vec<String>, StoreError>;

    /// All-time interaction counts for cold-start detection.
    async fn interaction_stats(
        &self,
        deadline: Deadline,
        user_id: &str,
    ) -> Result<InteractionStats, StoreError>;

    /// Recent interactions joined to track metadata, newest first.
    /// Feeds the interest-graph computation.
    async fn recent_interactions_with_track_meta(
        &self,
        deadline: Deadline,
        user_id: &str,
        limit: usize,
        window_days: u32,
        kinds: &[EventKind],
    ) -> Result<Vec<InteractionMetaRow>, StoreError>;

    /// Track IDs of the user's most recent interactions in chronological
    /// order (oldest first). Reserved for sequence-aware rerankers.
    async fn recent_track_ids_for_user(
        &self,
        deadline: Deadline,
        user_id: &str,
        limit: usize,
        kinds: &[EventKind],
    ) -> Result<Vec<String>, StoreError>;

    // =========================================================================
    // Candidates
    // =========================================================================

    /// Tracks ordered by ascending cosine distance to `embedding`. Only
    /// tracks with an embedding are eligible; `exclude_ids` are filtered.
    async fn ann_candidates_by_embedding(
        &self,
        deadline: Deadline,
        embedding: &[f32],
        exclude_ids: &[String],
        limit: usize,
    ) -> Result<Vec<Track>, StoreError>;

    /// Tracks in the given genres ordered by descending popularity.
    async fn popular_by_genre(
        &self,
        deadline: Deadline,
        genres: &[String],
        exclude_ids: &[String],
        limit: usize,
    ) -> Result<Vec<Track>, StoreError>;

    /// Most popular tracks across all genres.
    async fn popular_global(
        &self,
        deadline: Deadline,
        limit: usize,
    ) -> Result<Vec<Track>, StoreError>;

    /// Rebuild the popularity aggregate the popular queries read.
    async fn refresh_popular_tracks(&self, deadline: Deadline) -> Result<(), StoreError>;

    // =========================================================================
    // Interest graph
    // =========================================================================

    /// Fetch the user's interest-graph document, if any.
    async fn get_interest_graph(
        &self,
        deadline: Deadline,
        user_id: &str,
    ) -> Result<Option<InterestGraphDoc>, StoreError>;

    /// Replace the user's document, atomically incrementing its revision.
    async fn upsert_interest_graph(
        &self,
        deadline: Deadline,
        user_id: &str,
        doc: &InterestGraphDoc,
    ) -> Result<(), StoreError>;

    // =========================================================================
    // Profiles
    // =========================================================================

    /// Recompute the profile embedding inside the store as the weighted
    /// mean over the user's last 50 qualifying interactions within 90
    /// days. No-op when nothing qualifies. Runs as a single transaction.
    async fn upsert_profile_embedding(
        &self,
        deadline: Deadline,
        user_id: &str,
    ) -> Result<(), StoreError>;

    /// Fetch the user's profile, creating it on first observation.
    /// Single-statement upsert, safe under concurrent first access.
    async fn find_or_create_profile(
        &self,
        deadline: Deadline,
        user_id: &str,
    ) -> Result<UserProfile, StoreError>;

    /// Replace the preferred set; replaces the disliked set only when one
    /// is supplied. Creates the profile when missing.
    async fn update_preferences(
        &self,
        deadline: Deadline,
        user_id: &str,
        preferred_genres: &[String],
        disliked_genres: Option<&[String]>,
    ) -> Result<UserProfile, StoreError>;
}
