//! Recommendation cache.
//!
//! A narrow key-value surface over GET / SETEX / prefix-DEL. All keys are
//! prefixed `recommendations:{user}:` so a user's entries can be
//! invalidated as a group. The pipeline owns serialization and swallows
//! cache failures (read errors are a miss, write errors are dropped).

mod memory_cache;
mod redis_cache;

pub use memory_cache::MemoryCache;
pub use redis_cache::RedisCache;

use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;

use crate::model::ListeningContext;

/// Cache key for a (user, normalized context) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    user_id: String,
    context_fingerprint: String,
}

impl CacheKey {
    pub fn recommendations(user_id: &str, context: Option<&ListeningContext>) -> Self {
        Self {
            user_id: user_id.to_string(),
            context_fingerprint: ListeningContext::fingerprint(context),
        }
    }

    /// Prefix shared by every key of one user.
    pub fn user_prefix(user_id: &str) -> String {
        format!("recommendations:{user_id}:")
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "recommendations:{}:{}",
            self.user_id, self.context_fingerprint
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::Backend(err.to_string())
    }
}

/// Trait for the recommendation cache backend.
#[async_trait]
pub trait RecommendationCache: Send + Sync {
    /// Fetch a raw entry.
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError>;

    /// Store a raw entry with a TTL.
    async fn set(&self, key: &CacheKey, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Delete every key carrying the given prefix. Completion guarantees
    /// that a subsequent `get` on a covered key misses.
    async fn delete_prefix(&self, prefix: &str) -> Result<(), CacheError>;
}
