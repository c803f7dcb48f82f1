//! Context-aware reranking.
//!
//! Candidates are scored by summing per-feature bonuses conditioned on the
//! request context and stably sorted by score descending, so ties keep the
//! candidate-generation order. Tracks without audio features score 0, and
//! a feature missing from the bag contributes 0 for its term.

use crate::model::{Activity, AudioFeatures, ListeningContext, Mood, Track};

fn activity_bonus(features: &AudioFeatures, activity: Activity) -> f64 {
    match activity {
        Activity::Exercise => features.energy.map_or(0.0, |e| 10.0 * e),
        Activity::Relax => features.energy.map_or(0.0, |e| 8.0 * (1.0 - e)),
        Activity::Party => features.danceability.map_or(0.0, |d| 10.0 * d),
        Activity::Work => 0.0,
    }
}

fn mood_bonus(features: &AudioFeatures, mood: Mood) -> f64 {
    match mood {
        Mood::Calm => features.energy.map_or(0.0, |e| 10.0 * (1.0 - e)),
        Mood::Energetic => features.energy.map_or(0.0, |e| 10.0 * e),
        Mood::Happy => features.valence.map_or(0.0, |v| 10.0 * v),
        Mood::Sad => features.valence.map_or(0.0, |v| 10.0 * (1.0 - v)),
    }
}

/// Context score of one candidate.
pub fn context_score(track: &Track, context: &ListeningContext) -> f64 {
    let Some(features) = &track.audio_features else {
        return 0.0;
    };
    let mut score = 0.0;
    if let Some(activity) = context.activity {
        score += activity_bonus(features, activity);
    }
    if let Some(mood) = context.mood {
        score += mood_bonus(features, mood);
    }
    score
}

/// Stable sort by context score, descending.
pub fn rerank_by_context(tracks: &mut [Track], context: &ListeningContext) {
    let mut scored: Vec<(f64, Track)> = tracks
        .iter()
        .map(|t| (context_score(t, context), t.clone()))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    for (slot, (_, track)) in tracks.iter_mut().zip(scored) {
        *slot = track;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_features(id: &str, features: AudioFeatures) -> Track {
        Track {
            id: id.into(),
            title: id.into(),
            artist: "Artist".into(),
            genre: "Pop".into(),
            duration: 180,
            external_url: format!("https://tracks.example/{id}"),
            preview_url: None,
            audio_features: Some(features),
            embedding: None,
        }
    }

    fn with_energy(id: &str, energy: f64) -> Track {
        with_features(
            id,
            AudioFeatures {
                energy: Some(energy),
                ..Default::default()
            },
        )
    }

    #[test]
    fn exercise_prefers_high_energy() {
        // T1{0.9}, T2{0.2}, T3{0.5} under EXERCISE reranks to T1, T3, T2.
        let mut tracks = vec![
            with_energy("t1", 0.9),
            with_energy("t2", 0.2),
            with_energy("t3", 0.5),
        ];
        let ctx = ListeningContext {
            activity: Some(Activity::Exercise),
            ..Default::default()
        };
        rerank_by_context(&mut tracks, &ctx);
        let ids: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t1", "t3", "t2"]);
    }

    #[test]
    fn calm_mood_prefers_low_energy() {
        let mut tracks = vec![with_energy("loud", 0.9), with_energy("quiet", 0.1)];
        let ctx = ListeningContext {
            mood: Some(Mood::Calm),
            ..Default::default()
        };
        rerank_by_context(&mut tracks, &ctx);
        assert_eq!(tracks[0].id, "quiet");
    }

    #[test]
    fn mood_and_activity_bonuses_sum() {
        let track = with_features(
            "t",
            AudioFeatures {
                energy: Some(0.8),
                valence: Some(0.5),
                ..Default::default()
            },
        );
        let ctx = ListeningContext {
            mood: Some(Mood::Happy),
            activity: Some(Activity::Exercise),
            ..Default::default()
        };
        // 10 * 0.8 + 10 * 0.5
        assert!((context_score(&track, &ctx) - 13.0).abs() < 1e-9);
    }

    #[test]
    fn missing_feature_bag_scores_zero() {
        let mut track = with_energy("t", 0.9);
        track.audio_features = None;
        let ctx = ListeningContext {
            activity: Some(Activity::Exercise),
            ..Default::default()
        };
        assert_eq!(context_score(&track, &ctx), 0.0);
    }

    #[test]
    fn missing_relevant_field_contributes_zero_not_one() {
        // RELAX reads 8 * (1 - energy); an absent energy must not read as 0.
        let track = with_features(
            "t",
            AudioFeatures {
                valence: Some(0.3),
                ..Default::default()
            },
        );
        let ctx = ListeningContext {
            activity: Some(Activity::Relax),
            ..Default::default()
        };
        assert_eq!(context_score(&track, &ctx), 0.0);
    }

    #[test]
    fn ties_keep_candidate_order() {
        let mut tracks = vec![
            with_energy("first", 0.5),
            with_energy("second", 0.5),
            with_energy("third", 0.9),
        ];
        let ctx = ListeningContext {
            activity: Some(Activity::Exercise),
            ..Default::default()
        };
        rerank_by_context(&mut tracks, &ctx);
        let ids: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["third", "first", "second"]);
    }

    #[test]
    fn work_activity_adds_no_bonus() {
        let track = with_energy("t", 0.9);
        let ctx = ListeningContext {
            activity: Some(Activity::Work),
            ..Default::default()
        };
        assert_eq!(context_score(&track, &ctx), 0.0);
    }
}
