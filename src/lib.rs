//! Encore recommendation server library.
//!
//! Exposes the internal modules for the end-to-end test suite and
//! potential reuse.

pub mod cache;
pub mod config;
pub mod deadline;
pub mod error;
pub mod graph;
pub mod jobs;
pub mod metrics;
pub mod model;
pub mod push;
pub mod recs;
pub mod server;
pub mod store;
pub mod taste;

// Re-export commonly used types for convenience
pub use config::AppConfig;
pub use error::{CoreError, CoreResult};
pub use recs::{RecommendationPipeline, RecommendationRequest};
pub use server::{make_app, run_server, ServerState};
pub use store::{MemoryStore, PgRecommendationStore, RecommendationStore};
