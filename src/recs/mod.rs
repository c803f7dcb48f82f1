//! Recommendation pipeline.

mod diversity;
mod pipeline;
mod rerank;

pub use diversity::enforce_artist_diversity;
pub use pipeline::{InteractionOutcome, RecommendationPipeline, RecommendationRequest};
pub use rerank::{context_score, rerank_by_context};
