//! Profile embedding engine.
//!
//! The 256-d taste vector is derived, never user-supplied, and the heavy
//! lifting happens inside the store so candidate vectors never cross the
//! wire. This engine is the seam the pipeline calls; failures downgrade to
//! "keep whatever the profile currently holds".

use std::sync::Arc;

use crate::deadline::Deadline;
use crate::store::{RecommendationStore, StoreError};

#[derive(Clone)]
pub struct ProfileEmbeddingEngine {
    store: Arc<dyn RecommendationStore>,
}

impl ProfileEmbeddingEngine {
    pub fn new(store: Arc<dyn RecommendationStore>) -> Self {
        Self { store }
    }

    /// Recompute the user's profile embedding from recent interactions.
    ///
    /// Idempotent and safe to call concurrently; the store transaction
    /// provides the ordering. After this returns, a profile fetch reflects
    /// the new embedding (or the previous one when nothing qualified).
    pub async fn recompute(&self, deadline: Deadline, user_id: &str) -> Result<(), StoreError> {
        self.store.upsert_profile_embedding(deadline, user_id).await
    }
}
