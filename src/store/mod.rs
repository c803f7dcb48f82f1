//! Track & interaction store gateway.
//!
//! The [`RecommendationStore`] trait is the only surface in the core that
//! issues storage queries. The Postgres implementation backs production;
//! the in-memory implementation backs tests and mirrors the same
//! semantics, including cosine candidate ordering and the transactional
//! profile-embedding recomputation.

mod memory_store;
mod pg_store;
mod trait_def;

pub use memory_store::MemoryStore;
pub use pg_store::PgRecommendationStore;
pub use trait_def::{RecommendationStore, StoreError};

use crate::model::EventKind;

/// Event weight used by the profile-embedding recomputation.
///
/// Kinds outside {LIKE, PLAY, SKIP} never qualify and weigh 0.
pub(crate) fn embedding_weight(kind: EventKind) -> f32 {
    match kind {
        EventKind::Like => 2.0,
        EventKind::Play => 1.0,
        EventKind::Skip => -0.5,
        _ => 0.0,
    }
}

/// Plain average of the per-row `weight * embedding` contributions.
///
/// Rows were already filtered to tracks with an embedding; an empty input
/// yields `None` (callers treat that as "keep the existing embedding").
pub(crate) fn weighted_mean_embedding(rows: &[(EventKind, Vec<f32>)]) -> Option<Vec<f32>> {
    if rows.is_empty() {
        return None;
    }
    let dim = rows[0].1.len();
    let mut sum = vec![0.0f32; dim];
    for (kind, embedding) in rows {
        let weight = embedding_weight(*kind);
        for (acc, component) in sum.iter_mut().zip(embedding.iter()) {
            *acc += weight * component;
        }
    }
    let n = rows.len() as f32;
    for component in sum.iter_mut() {
        *component /= n;
    }
    Some(sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_weights_match_event_kinds() {
        assert_eq!(embedding_weight(EventKind::Like), 2.0);
        assert_eq!(embedding_weight(EventKind::Play), 1.0);
        assert_eq!(embedding_weight(EventKind::Skip), -0.5);
        assert_eq!(embedding_weight(EventKind::Dislike), 0.0);
    }

    #[test]
    fn weighted_mean_averages_contributions() {
        let rows = vec![
            (EventKind::Like, vec![1.0, 0.0]),
            (EventKind::Skip, vec![0.0, 1.0]),
        ];
        // (2.0 * [1,0] + (-0.5) * [0,1]) / 2 = [1.0, -0.25]
        let mean = weighted_mean_embedding(&rows).unwrap();
        assert_eq!(mean, vec![1.0, -0.25]);
    }

    #[test]
    fn weighted_mean_of_nothing_is_none() {
        assert!(weighted_mean_embedding(&[]).is_none());
    }
}
