//! Catalog and interaction fixtures.

use std::time::Duration;

use encore_server::deadline::Deadline;
use encore_server::model::{
    AudioFeatures, EventKind, NewInteraction, Track, EMBEDDING_DIM,
};
use encore_server::store::{MemoryStore, RecommendationStore};

pub const USER_1: &str = "u1";
pub const USER_2: &str = "u2";
pub const USER_3: &str = "u3";

pub fn deadline() -> Deadline {
    Deadline::after(Duration::from_secs(5))
}

pub fn track(id: &str, artist: &str, genre: &str) -> Track {
    Track {
        id: id.into(),
        title: format!("Title {id}"),
        artist: artist.into(),
        genre: genre.into(),
        duration: 180,
        external_url: format!("https://tracks.example/{id}"),
        preview_url: None,
        audio_features: None,
        embedding: None,
    }
}

/// A track with an embedding on the unit circle at `angle` radians.
/// Cosine distance to angle 0 grows with the angle, which gives tests
/// full control over the candidate order.
pub fn embedded_track(id: &str, artist: &str, genre: &str, angle: f32, energy: f64) -> Track {
    let mut t = track(id, artist, genre);
    let mut embedding = vec![0.0f32; EMBEDDING_DIM];
    embedding[0] = angle.cos();
    embedding[1] = angle.sin();
    t.embedding = Some(embedding);
    t.audio_features = Some(AudioFeatures {
        energy: Some(energy),
        ..Default::default()
    });
    t
}

pub fn interaction(user: &str, track_id: &str, kind: EventKind) -> NewInteraction {
    NewInteraction {
        external_user_id: user.into(),
        track_id: track_id.into(),
        event_type: kind,
        event_value: None,
        context: None,
        client_ts: None,
    }
}

/// Seed play counts from a synthetic audience and rebuild the popularity
/// aggregate so the cold-start path sees them.
pub async fn seed_popularity(store: &MemoryStore, plays: &[(&str, usize)]) {
    for (track_id, count) in plays {
        for i in 0..*count {
            store
                .append_interaction(
                    deadline(),
                    interaction(&format!("audience-{i}"), track_id, EventKind::Play),
                )
                .await
                .expect("failed to seed play");
        }
    }
    store
        .refresh_popular_tracks(deadline())
        .await
        .expect("failed to refresh popularity");
}
