//! Interest graph engine.
//!
//! Turns a user's recent interactions into a compact bias document: top
//! and avoid sets over artists and genres, scored in [0, 1]. The document
//! feeds the avoid filter in the recommendation pipeline; callers treat a
//! missing or errored document as "no bias".

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::deadline::Deadline;
use crate::model::{EventKind, InteractionMetaRow, InterestGraphDoc};
use crate::store::{RecommendationStore, StoreError};

/// Days of history the graph looks back over.
const WINDOW_DAYS: u32 = 90;
/// Interactions considered per computation.
const FETCH_LIMIT: usize = 500;
/// Entries kept per map.
const MAP_LIMIT: usize = 20;
/// Document schema version.
const SCHEMA_VERSION: u32 = 1;

const EVENT_KINDS: [EventKind; 4] = [
    EventKind::Play,
    EventKind::Like,
    EventKind::Skip,
    EventKind::Dislike,
];

fn event_weight(kind: EventKind) -> f64 {
    match kind {
        EventKind::Like => 2.0,
        EventKind::Play => 1.0,
        EventKind::Skip => -1.0,
        EventKind::Dislike => -2.0,
        _ => 0.0,
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Sort by score descending (name ascending on ties), keep the strongest
/// `MAP_LIMIT`, divide by the maximum. A non-positive maximum zeroes every
/// emitted value.
fn top_normalized(sums: &HashMap<String, f64>) -> BTreeMap<String, f64> {
    let mut entries: Vec<(&String, &f64)> = sums.iter().collect();
    entries.sort_by(|a, b| {
        b.1.partial_cmp(a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    entries.truncate(MAP_LIMIT);

    let max = entries.first().map(|(_, score)| **score).unwrap_or(0.0);
    entries
        .into_iter()
        .map(|(name, score)| {
            let normalized = if max <= 0.0 { 0.0 } else { round4(score / max) };
            (name.clone(), normalized)
        })
        .collect()
}

/// The avoid side keeps only entries whose raw score went negative, flips
/// the sign, then runs the same truncate-and-normalize step.
fn avoid_normalized(sums: &HashMap<String, f64>) -> BTreeMap<String, f64> {
    let negatives: HashMap<String, f64> = sums
        .iter()
        .filter(|(_, score)| **score < 0.0)
        .map(|(name, score)| (name.clone(), -score))
        .collect();
    top_normalized(&negatives)
}

/// Pure computation over the joined interaction rows.
pub fn compute_document(rows: &[InteractionMetaRow]) -> Option<InterestGraphDoc> {
    if rows.is_empty() {
        return None;
    }

    let mut artist_sums: HashMap<String, f64> = HashMap::new();
    let mut genre_sums: HashMap<String, f64> = HashMap::new();
    for row in rows {
        let weight = event_weight(row.event_type);
        if !row.artist.is_empty() {
            *artist_sums.entry(row.artist.clone()).or_default() += weight;
        }
        if !row.genre.is_empty() {
            *genre_sums.entry(row.genre.clone()).or_default() += weight;
        }
    }

    Some(InterestGraphDoc {
        version: SCHEMA_VERSION,
        generated_by: "heuristic".into(),
        window_days: WINDOW_DAYS,
        top_artists: top_normalized(&artist_sums),
        top_genres: top_normalized(&genre_sums),
        avoid_artists: avoid_normalized(&artist_sums),
        avoid_genres: avoid_normalized(&genre_sums),
        updated_at: Utc::now(),
    })
}

/// Interest graph engine over the store gateway.
#[derive(Clone)]
pub struct InterestGraphEngine {
    store: Arc<dyn RecommendationStore>,
}

impl InterestGraphEngine {
    pub fn new(store: Arc<dyn RecommendationStore>) -> Self {
        Self { store }
    }

    /// Return the stored document unchanged when one exists, otherwise
    /// compute, persist, and return it. `None` means the user has no
    /// qualifying history.
    pub async fn get_or_compute(
        &self,
        deadline: Deadline,
        user_id: &str,
    ) -> Result<Option<InterestGraphDoc>, StoreError> {
        if let Some(doc) = self.store.get_interest_graph(deadline, user_id).await? {
            return Ok(Some(doc));
        }
        self.refresh(deadline, user_id).await
    }

    /// Always recompute; persist when the result is non-empty.
    pub async fn refresh(
        &self,
        deadline: Deadline,
        user_id: &str,
    ) -> Result<Option<InterestGraphDoc>, StoreError> {
        let rows = self
            .store
            .recent_interactions_with_track_meta(
                deadline,
                user_id,
                FETCH_LIMIT,
                WINDOW_DAYS,
                &EVENT_KINDS,
            )
            .await?;

        let Some(doc) = compute_document(&rows) else {
            debug!(user_id, "no interactions in window, skipping interest graph");
            return Ok(None);
        };

        self.store
            .upsert_interest_graph(deadline, user_id, &doc)
            .await?;
        Ok(Some(doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(kind: EventKind, artist: &str, genre: &str) -> InteractionMetaRow {
        InteractionMetaRow {
            event_type: kind,
            created_at: Utc::now(),
            artist: artist.into(),
            genre: genre.into(),
        }
    }

    #[test]
    fn no_rows_means_no_document() {
        assert!(compute_document(&[]).is_none());
    }

    #[test]
    fn top_maps_are_normalized_to_max_one() {
        let rows = vec![
            row(EventKind::Like, "Strong", "Pop"),
            row(EventKind::Like, "Strong", "Pop"),
            row(EventKind::Play, "Mild", "Rock"),
        ];
        let doc = compute_document(&rows).unwrap();
        // Strong: 4.0, Mild: 1.0 -> 1.0 and 0.25
        assert_eq!(doc.top_artists["Strong"], 1.0);
        assert_eq!(doc.top_artists["Mild"], 0.25);
        // Pop: 4.0, Rock: 1.0
        assert_eq!(doc.top_genres["Pop"], 1.0);
        assert_eq!(doc.top_genres["Rock"], 0.25);
    }

    #[test]
    fn normalization_law_holds_for_every_map() {
        let rows = vec![
            row(EventKind::Like, "A", "Pop"),
            row(EventKind::Play, "B", "Rock"),
            row(EventKind::Dislike, "C", "Metal"),
            row(EventKind::Skip, "D", "Jazz"),
            row(EventKind::Skip, "D", "Jazz"),
        ];
        let doc = compute_document(&rows).unwrap();
        for map in [
            &doc.top_artists,
            &doc.top_genres,
            &doc.avoid_artists,
            &doc.avoid_genres,
        ] {
            if map.is_empty() {
                continue;
            }
            let max = map.values().cloned().fold(f64::MIN, f64::max);
            assert!(max == 0.0 || max == 1.0, "max was {max}");
            assert!(map.values().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn avoid_maps_hold_only_negative_mass() {
        let rows = vec![
            row(EventKind::Like, "Loved", "Pop"),
            row(EventKind::Dislike, "Hated", "Metal"),
            row(EventKind::Skip, "Hated", "Metal"),
        ];
        let doc = compute_document(&rows).unwrap();
        assert!(!doc.avoid_artists.contains_key("Loved"));
        assert_eq!(doc.avoid_artists["Hated"], 1.0);
        assert_eq!(doc.avoid_genres["Metal"], 1.0);
        assert!(!doc.avoid_genres.contains_key("Pop"));
    }

    #[test]
    fn all_negative_input_emits_zeroed_top_map() {
        let rows = vec![
            row(EventKind::Dislike, "A", "Metal"),
            row(EventKind::Skip, "B", "Metal"),
        ];
        let doc = compute_document(&rows).unwrap();
        assert!(doc.top_artists.values().all(|v| *v == 0.0));
        assert!(doc.top_genres.values().all(|v| *v == 0.0));
    }

    #[test]
    fn maps_hold_at_most_twenty_entries() {
        let rows: Vec<InteractionMetaRow> = (0..30)
            .map(|i| row(EventKind::Play, &format!("Artist {i:02}"), "Pop"))
            .collect();
        let doc = compute_document(&rows).unwrap();
        assert_eq!(doc.top_artists.len(), 20);
    }

    #[test]
    fn missing_artist_or_genre_does_not_contribute() {
        let rows = vec![
            row(EventKind::Like, "", "Pop"),
            row(EventKind::Like, "Named", ""),
        ];
        let doc = compute_document(&rows).unwrap();
        assert_eq!(doc.top_artists.len(), 1);
        assert_eq!(doc.top_genres.len(), 1);
    }

    #[test]
    fn scores_round_to_four_decimals() {
        let mut rows = vec![row(EventKind::Like, "Max", "Pop")];
        rows.push(row(EventKind::Like, "Max", "Pop"));
        rows.push(row(EventKind::Like, "Max", "Pop"));
        rows.push(row(EventKind::Play, "Third", "Pop"));
        let doc = compute_document(&rows).unwrap();
        // 1.0 / 6.0 = 0.1666... -> 0.1667
        assert_eq!(doc.top_artists["Third"], 0.1667);
    }
}
