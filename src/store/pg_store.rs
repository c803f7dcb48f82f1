//! Postgres-backed store implementation.
//!
//! Expects the host platform's schema: `tracks` and `user_profiles` with
//! `vector(256)` embedding columns (HNSW, cosine), the append-only
//! `interactions` table, the `user_interest_graph` JSONB table, and the
//! `popular_tracks` materialized aggregate. Migrations live with the host
//! platform, not here.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::warn;

use super::trait_def::{RecommendationStore, StoreError};
use super::weighted_mean_embedding;
use crate::deadline::Deadline;
use crate::model::{
    EventKind, Interaction, InteractionMetaRow, InteractionStats, InterestGraphDoc,
    NewInteraction, Track, UserProfile,
};

const TRACK_COLUMNS: &str =
    "id, title, artist, genre, duration, external_url, preview_url, audio_features, embedding";

/// Postgres-backed recommendation store.
#[derive(Clone)]
pub struct PgRecommendationStore {
    pool: PgPool,
}

impl PgRecommendationStore {
    /// Connect with a bounded pool.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Race a query future against the remaining request budget.
async fn timed<T, F>(deadline: Deadline, op: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>> + Send,
{
    let Some(remaining) = deadline.remaining() else {
        return Err(StoreError::Timeout);
    };
    match tokio::time::timeout(remaining, op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(map_sqlx_error(err)),
        Err(_) => Err(StoreError::Timeout),
    }
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => {
            // The only foreign key reachable from this gateway is
            // interactions.track_id -> tracks.id.
            if db.code().as_deref() == Some("23503") {
                return StoreError::ForeignKey("track".into());
            }
            StoreError::Query(db.message().to_string())
        }
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Query(err.to_string()),
    }
}

fn kinds_as_strings(kinds: &[EventKind]) -> Vec<String> {
    kinds.iter().map(|k| k.as_str().to_string()).collect()
}

#[derive(sqlx::FromRow)]
struct TrackRow {
    id: String,
    title: String,
    artist: String,
    genre: Option<String>,
    duration: i32,
    external_url: String,
    preview_url: Option<String>,
    audio_features: Option<serde_json::Value>,
    embedding: Option<Vector>,
}

impl From<TrackRow> for Track {
    fn from(row: TrackRow) -> Self {
        Track {
            id: row.id,
            title: row.title,
            artist: row.artist,
            genre: row.genre.unwrap_or_default(),
            duration: row.duration,
            external_url: row.external_url,
            preview_url: row.preview_url,
            audio_features: row
                .audio_features
                .and_then(|value| serde_json::from_value(value).ok()),
            embedding: row.embedding.map(|v| v.to_vec()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    external_user_id: String,
    preferred_genres: Vec<String>,
    disliked_genres: Vec<String>,
    last_active_at: DateTime<Utc>,
    profile_embedding: Option<Vector>,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        UserProfile {
            external_user_id: row.external_user_id,
            preferred_genres: row.preferred_genres,
            disliked_genres: row.disliked_genres,
            last_active_at: row.last_active_at,
            profile_embedding: row.profile_embedding.map(|v| v.to_vec()),
        }
    }
}

const PROFILE_COLUMNS: &str =
    "external_user_id, preferred_genres, disliked_genres, last_active_at, profile_embedding";

#[async_trait]
impl RecommendationStore for PgRecommendationStore {
    async fn append_interaction(
        &self,
        deadline: Deadline,
        event: NewInteraction,
    ) -> Result<Interaction, StoreError> {
        let context_json = event
            .context
            .as_ref()
            .map(|ctx| serde_json::to_value(ctx).unwrap_or(serde_json::Value::Null));

        let pool = self.pool.clone();
        let external_user_id = event.external_user_id.clone();
        let track_id = event.track_id.clone();
        let (id, created_at): (i64, DateTime<Utc>) = timed(deadline, async move {
            sqlx::query_as(
                "INSERT INTO interactions \
                 (external_user_id, track_id, event_type, event_value, context, client_ts) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 RETURNING id, created_at",
            )
            .bind(&event.external_user_id)
            .bind(&event.track_id)
            .bind(event.event_type.as_str())
            .bind(event.event_value)
            .bind(context_json)
            .bind(event.client_ts)
            .fetch_one(&pool)
            .await
        })
        .await?;

        Ok(Interaction {
            id,
            external_user_id,
            track_id,
            event_type: event.event_type,
            event_value: event.event_value,
            context: event.context,
            client_ts: event.client_ts,
            created_at,
        })
    }

    async fn count_recent_skips(
        &self,
        deadline: Deadline,
        user_id: &str,
        window: Duration,
    ) -> Result<u64, StoreError> {
        let pool = self.pool.clone();
        let user = user_id.to_string();
        let secs = window.as_secs_f64();
        let count: i64 = timed(deadline, async move {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM interactions \
                 WHERE external_user_id = $1 \
                   AND event_type = 'SKIP' \
                   AND created_at > NOW() - make_interval(secs => $2)",
            )
            .bind(&user)
            .bind(secs)
            .fetch_one(&pool)
            .await
        })
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn recent_skip_track_ids(
        &self,
        deadline: Deadline,
        user_id: &str,
        hours_back: u32,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let pool = self.pool.clone();
        let user = user_id.to_string();
        timed(deadline, async move {
            sqlx::query_scalar(
                "SELECT track_id FROM interactions \
                 WHERE external_user_id = $1 \
                   AND event_type = 'SKIP' \
                   AND created_at > NOW() - make_interval(hours => $2) \
                 GROUP BY track_id \
                 ORDER BY MAX(created_at) DESC \
                 LIMIT $3",
            )
            .bind(&user)
            .bind(hours_back as i32)
            .bind(limit as i64)
            .fetch_all(&pool)
            .await
        })
        .await
    }

    async fn interaction_stats(
        &self,
        deadline: Deadline,
        user_id: &str,
    ) -> Result<InteractionStats, StoreError> {
        let pool = self.pool.clone();
        let user = user_id.to_string();
        let (total, like_count, skip_count, play_count): (i64, i64, i64, i64) =
            timed(deadline, async move {
                sqlx::query_as(
                    "SELECT COUNT(*), \
                            COUNT(*) FILTER (WHERE event_type = 'LIKE'), \
                            COUNT(*) FILTER (WHERE event_type = 'SKIP'), \
                            COUNT(*) FILTER (WHERE event_type = 'PLAY') \
                     FROM interactions WHERE external_user_id = $1",
                )
                .bind(&user)
                .fetch_one(&pool)
                .await
            })
            .await?;
        Ok(InteractionStats {
            total,
            like_count,
            skip_count,
            play_count,
        })
    }

    async fn recent_interactions_with_track_meta(
        &self,
        deadline: Deadline,
        user_id: &str,
        limit: usize,
        window_days: u32,
        kinds: &[EventKind],
    ) -> Result<Vec<InteractionMetaRow>, StoreError> {
        let pool = self.pool.clone();
        let user = user_id.to_string();
        let kind_names = kinds_as_strings(kinds);
        let rows: Vec<(String, DateTime<Utc>, String, String)> = timed(deadline, async move {
            sqlx::query_as(
                "SELECT i.event_type, i.created_at, \
                        COALESCE(t.artist, ''), COALESCE(t.genre, '') \
                 FROM interactions i \
                 JOIN tracks t ON t.id = i.track_id \
                 WHERE i.external_user_id = $1 \
                   AND i.created_at > NOW() - make_interval(days => $2) \
                   AND i.event_type = ANY($3) \
                 ORDER BY i.created_at DESC \
                 LIMIT $4",
            )
            .bind(&user)
            .bind(window_days as i32)
            .bind(&kind_names)
            .bind(limit as i64)
            .fetch_all(&pool)
            .await
        })
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(event_type, created_at, artist, genre)| {
                event_type
                    .parse::<EventKind>()
                    .ok()
                    .map(|event_type| InteractionMetaRow {
                        event_type,
                        created_at,
                        artist,
                        genre,
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
        let pool = self.pool.clone();
        let user = user_id.to_string();
        let kind_names = kinds_as_strings(kinds);
        timed(deadline, async move {
            sqlx::query_scalar(
                "SELECT track_id FROM ( \
                     SELECT track_id, created_at FROM interactions \
                     WHERE external_user_id = $1 AND event_type = ANY($2) \
                     ORDER BY created_at DESC \
                     LIMIT $3 \
                 ) recent ORDER BY created_at ASC",
            )
            .bind(&user)
            .bind(&kind_names)
            .bind(limit as i64)
            .fetch_all(&pool)
            .await
        })
        .await
    }

    async fn ann_candidates_by_embedding(
        &self,
        deadline: Deadline,
        embedding: &[f32],
        exclude_ids: &[String],
        limit: usize,
    ) -> Result<Vec<Track>, StoreError> {
        let pool = self.pool.clone();
        let query_vector = Vector::from(embedding.to_vec());
        let excluded = exclude_ids.to_vec();
        let sql = format!(
            "SELECT {TRACK_COLUMNS} FROM tracks \
             WHERE embedding IS NOT NULL \
               AND NOT (id = ANY($2)) \
             ORDER BY embedding <=> $1 \
             LIMIT $3"
        );
        let rows: Vec<TrackRow> = timed(deadline, async move {
            sqlx::query_as(&sql)
                .bind(query_vector)
                .bind(&excluded)
                .bind(limit as i64)
                .fetch_all(&pool)
                .await
        })
        .await?;
        Ok(rows.into_iter().map(Track::from).collect())
    }

    async fn popular_by_genre(
        &self,
        deadline: Deadline,
        genres: &[String],
        exclude_ids: &[String],
        limit: usize,
    ) -> Result<Vec<Track>, StoreError> {
        let pool = self.pool.clone();
        let genres = genres.to_vec();
        let excluded = exclude_ids.to_vec();
        let rows: Vec<TrackRow> = timed(deadline, async move {
            sqlx::query_as(
                "SELECT t.id, t.title, t.artist, t.genre, t.duration, t.external_url, \
                        t.preview_url, t.audio_features, t.embedding \
                 FROM tracks t \
                 JOIN popular_tracks p ON p.track_id = t.id \
                 WHERE t.genre = ANY($1) \
                   AND NOT (t.id = ANY($2)) \
                 ORDER BY p.popularity_score DESC \
                 LIMIT $3",
            )
            .bind(&genres)
            .bind(&excluded)
            .bind(limit as i64)
            .fetch_all(&pool)
            .await
        })
        .await?;
        Ok(rows.into_iter().map(Track::from).collect())
    }

    async fn popular_global(
        &self,
        deadline: Deadline,
        limit: usize,
    ) -> Result<Vec<Track>, StoreError> {
        let pool = self.pool.clone();
        let rows: Vec<TrackRow> = timed(deadline, async move {
            sqlx::query_as(
                "SELECT t.id, t.title, t.artist, t.genre, t.duration, t.external_url, \
                        t.preview_url, t.audio_features, t.embedding \
                 FROM tracks t \
                 JOIN popular_tracks p ON p.track_id = t.id \
                 ORDER BY p.popularity_score DESC \
                 LIMIT $1",
            )
            .bind(limit as i64)
            .fetch_all(&pool)
            .await
        })
        .await?;
        Ok(rows.into_iter().map(Track::from).collect())
    }

    async fn refresh_popular_tracks(&self, deadline: Deadline) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        timed(deadline, async move {
            sqlx::query("REFRESH MATERIALIZED VIEW CONCURRENTLY popular_tracks")
                .execute(&pool)
                .await
                .map(|_| ())
        })
        .await
    }

    async fn get_interest_graph(
        &self,
        deadline: Deadline,
        user_id: &str,
    ) -> Result<Option<InterestGraphDoc>, StoreError> {
        let pool = self.pool.clone();
        let user = user_id.to_string();
        let raw: Option<serde_json::Value> = timed(deadline, async move {
            sqlx::query_scalar(
                "SELECT graph FROM user_interest_graph WHERE external_user_id = $1",
            )
            .bind(&user)
            .fetch_optional(&pool)
            .await
        })
        .await?;

        Ok(raw.and_then(|value| match serde_json::from_value(value) {
            Ok(doc) => Some(doc),
            Err(err) => {
                warn!(user_id, error = %err, "discarding unreadable interest graph document");
                None
            }
        }))
    }

    async fn upsert_interest_graph(
        &self,
        deadline: Deadline,
        user_id: &str,
        doc: &InterestGraphDoc,
    ) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let user = user_id.to_string();
        let graph = serde_json::to_value(doc)
            .map_err(|err| StoreError::Query(format!("graph serialization: {err}")))?;
        timed(deadline, async move {
            sqlx::query(
                "INSERT INTO user_interest_graph (external_user_id, graph, version, updated_at) \
                 VALUES ($1, $2, 1, NOW()) \
                 ON CONFLICT (external_user_id) DO UPDATE \
                 SET graph = EXCLUDED.graph, \
                     version = user_interest_graph.version + 1, \
                     updated_at = NOW()",
            )
            .bind(&user)
            .bind(graph)
            .execute(&pool)
            .await
            .map(|_| ())
        })
        .await
    }

    async fn upsert_profile_embedding(
        &self,
        deadline: Deadline,
        user_id: &str,
    ) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let user = user_id.to_string();
        timed(deadline, async move {
            let mut tx = pool.begin().await?;

            let rows: Vec<(String, Vector)> = sqlx::query_as(
                "SELECT i.event_type, t.embedding \
                 FROM interactions i \
                 JOIN tracks t ON t.id = i.track_id \
                 WHERE i.external_user_id = $1 \
                   AND i.created_at > NOW() - INTERVAL '90 days' \
                   AND i.event_type IN ('LIKE', 'PLAY', 'SKIP') \
                   AND t.embedding IS NOT NULL \
                 ORDER BY i.created_at DESC \
                 LIMIT 50",
            )
            .bind(&user)
            .fetch_all(&mut *tx)
            .await?;

            let contributions: Vec<(EventKind, Vec<f32>)> = rows
                .into_iter()
                .filter_map(|(kind, embedding)| {
                    kind.parse::<EventKind>().ok().map(|k| (k, embedding.to_vec()))
                })
                .collect();

            if let Some(mean) = weighted_mean_embedding(&contributions) {
                sqlx::query(
                    "UPDATE user_profiles SET profile_embedding = $2 \
                     WHERE external_user_id = $1",
                )
                .bind(&user)
                .bind(Vector::from(mean))
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await
        })
        .await
    }

    async fn find_or_create_profile(
        &self,
        deadline: Deadline,
        user_id: &str,
    ) -> Result<UserProfile, StoreError> {
        let pool = self.pool.clone();
        let user = user_id.to_string();
        let sql = format!(
            "INSERT INTO user_profiles (external_user_id, preferred_genres, disliked_genres, last_active_at) \
             VALUES ($1, '{{}}', '{{}}', NOW()) \
             ON CONFLICT (external_user_id) DO UPDATE SET last_active_at = NOW() \
             RETURNING {PROFILE_COLUMNS}"
        );
        let row: ProfileRow = timed(deadline, async move {
            sqlx::query_as(&sql).bind(&user).fetch_one(&pool).await
        })
        .await?;
        Ok(row.into())
    }

    async fn update_preferences(
        &self,
        deadline: Deadline,
        user_id: &str,
        preferred_genres: &[String],
        disliked_genres: Option<&[String]>,
    ) -> Result<UserProfile, StoreError> {
        let pool = self.pool.clone();
        let user = user_id.to_string();
        let preferred = preferred_genres.to_vec();
        let disliked = disliked_genres.map(|d| d.to_vec());
        let sql = format!(
            "INSERT INTO user_profiles (external_user_id, preferred_genres, disliked_genres, last_active_at) \
             VALUES ($1, $2, COALESCE($3, '{{}}'::text[]), NOW()) \
             ON CONFLICT (external_user_id) DO UPDATE \
             SET preferred_genres = EXCLUDED.preferred_genres, \
                 disliked_genres = COALESCE($3, user_profiles.disliked_genres), \
                 last_active_at = NOW() \
             RETURNING {PROFILE_COLUMNS}"
        );
        let row: ProfileRow = timed(deadline, async move {
            sqlx::query_as(&sql)
                .bind(&user)
                .bind(&preferred)
                .bind(&disliked)
                .fetch_one(&pool)
                .await
        })
        .await?;
        Ok(row.into())
    }
}
