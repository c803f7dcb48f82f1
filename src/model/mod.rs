//! Domain types shared across the recommendation core.
//!
//! Wire names are camelCase to match the host platform's API conventions;
//! enum values travel as the SCREAMING_SNAKE identifiers the interaction
//! log stores.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dimensionality of track and profile embeddings.
pub const EMBEDDING_DIM: usize = 256;

/// Interaction event kinds, in the vocabulary of the interaction log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "PLAY")]
    Play,
    #[serde(rename = "SKIP")]
    Skip,
    #[serde(rename = "LIKE")]
    Like,
    #[serde(rename = "DISLIKE")]
    Dislike,
    #[serde(rename = "ADD_TO_PLAYLIST")]
    AddToPlaylist,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Play => "PLAY",
            EventKind::Skip => "SKIP",
            EventKind::Like => "LIKE",
            EventKind::Dislike => "DISLIKE",
            EventKind::AddToPlaylist => "ADD_TO_PLAYLIST",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLAY" => Ok(EventKind::Play),
            "SKIP" => Ok(EventKind::Skip),
            "LIKE" => Ok(EventKind::Like),
            "DISLIKE" => Ok(EventKind::Dislike),
            "ADD_TO_PLAYLIST" => Ok(EventKind::AddToPlaylist),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

macro_rules! context_enum {
    ($name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $wire)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)+
                    other => Err(format!(
                        concat!("unknown ", stringify!($name), ": {}"),
                        other
                    )),
                }
            }
        }
    };
}

context_enum!(Mood {
    Calm => "CALM",
    Happy => "HAPPY",
    Sad => "SAD",
    Energetic => "ENERGETIC",
});

context_enum!(Activity {
    Work => "WORK",
    Exercise => "EXERCISE",
    Relax => "RELAX",
    Party => "PARTY",
});

context_enum!(TimeBucket {
    Morning => "MORNING",
    Afternoon => "AFTERNOON",
    Evening => "EVENING",
    Night => "NIGHT",
});

/// The situational context attached to a recommendation request or an
/// interaction event. Unknown fields are dropped on deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListeningContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mood: Option<Mood>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activity: Option<Activity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_bucket: Option<TimeBucket>,
}

impl ListeningContext {
    pub fn is_empty(&self) -> bool {
        self.mood.is_none() && self.activity.is_none() && self.time_bucket.is_none()
    }

    /// Deterministic rendering with a fixed field order, used to build
    /// cache keys. An absent and an empty context render identically.
    pub fn fingerprint(ctx: Option<&ListeningContext>) -> String {
        match ctx {
            None => "none".to_string(),
            Some(c) if c.is_empty() => "none".to_string(),
            Some(c) => {
                let mut parts = Vec::with_capacity(3);
                if let Some(mood) = c.mood {
                    parts.push(format!("mood={}", mood.as_str()));
                }
                if let Some(activity) = c.activity {
                    parts.push(format!("activity={}", activity.as_str()));
                }
                if let Some(bucket) = c.time_bucket {
                    parts.push(format!("timeBucket={}", bucket.as_str()));
                }
                parts.join("|")
            }
        }
    }
}

/// Audio feature bag attached to tracks by the ingestion side.
///
/// All fields are optional; a missing field contributes 0 to any
/// context score that would read it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AudioFeatures {
    pub energy: Option<f64>,
    pub valence: Option<f64>,
    pub danceability: Option<f64>,
    pub tempo: Option<f64>,
    pub loudness: Option<f64>,
    pub speechiness: Option<f64>,
    pub acousticness: Option<f64>,
    pub instrumentalness: Option<f64>,
    pub liveness: Option<f64>,
    pub key: Option<i32>,
    pub mode: Option<i32>,
    pub time_signature: Option<i32>,
}

/// A catalog track. Immutable to the core; written by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub genre: String,
    /// Duration in seconds.
    pub duration: i32,
    pub external_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_features: Option<AudioFeatures>,
    /// 256-d taste embedding; never serialized onto the wire.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

/// Per-user profile keyed by the host platform's external user ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub external_user_id: String,
    pub preferred_genres: Vec<String>,
    pub disliked_genres: Vec<String>,
    pub last_active_at: DateTime<Utc>,
    /// 256-d profile embedding; derived, never serialized onto the wire.
    #[serde(skip)]
    pub profile_embedding: Option<Vec<f32>>,
}

/// A persisted interaction event. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interaction {
    pub id: i64,
    pub external_user_id: String,
    pub track_id: String,
    pub event_type: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ListeningContext>,
    /// Client-reported timestamp; carried through but never used for
    /// ordering or windows. The server clock is authoritative.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ts: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Fields of a new interaction, before the store assigns identity.
#[derive(Debug, Clone)]
pub struct NewInteraction {
    pub external_user_id: String,
    pub track_id: String,
    pub event_type: EventKind,
    pub event_value: Option<i64>,
    pub context: Option<ListeningContext>,
    pub client_ts: Option<i64>,
}

/// All-time interaction counts used for cold-start detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionStats {
    pub total: i64,
    pub like_count: i64,
    pub skip_count: i64,
    pub play_count: i64,
}

/// One row of the join used by the interest-graph engine.
#[derive(Debug, Clone)]
pub struct InteractionMetaRow {
    pub event_type: EventKind,
    pub created_at: DateTime<Utc>,
    pub artist: String,
    pub genre: String,
}

/// The compact per-user bias document derived from recent interactions.
///
/// Each map holds at most 20 entries with scores normalized so the
/// maximum is 1 (or all zero when the input had no positive mass).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestGraphDoc {
    /// Document schema version.
    pub version: u32,
    pub generated_by: String,
    pub window_days: u32,
    pub top_artists: BTreeMap<String, f64>,
    pub top_genres: BTreeMap<String, f64>,
    pub avoid_artists: BTreeMap<String, f64>,
    pub avoid_genres: BTreeMap<String, f64>,
    pub updated_at: DateTime<Utc>,
}

/// The ranked list returned by the pipeline and cached per (user, context).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    pub tracks: Vec<Track>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ListeningContext>,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_round_trips_through_wire_names() {
        for kind in [
            EventKind::Play,
            EventKind::Skip,
            EventKind::Like,
            EventKind::Dislike,
            EventKind::AddToPlaylist,
        ] {
            assert_eq!(kind.as_str().parse::<EventKind>().unwrap(), kind);
        }
        assert!("NOD".parse::<EventKind>().is_err());
    }

    #[test]
    fn missing_and_empty_context_share_a_fingerprint() {
        let empty = ListeningContext::default();
        assert_eq!(ListeningContext::fingerprint(None), "none");
        assert_eq!(ListeningContext::fingerprint(Some(&empty)), "none");
    }

    #[test]
    fn fingerprint_field_order_is_stable() {
        let ctx = ListeningContext {
            time_bucket: Some(TimeBucket::Night),
            mood: Some(Mood::Happy),
            activity: Some(Activity::Work),
        };
        assert_eq!(
            ListeningContext::fingerprint(Some(&ctx)),
            "mood=HAPPY|activity=WORK|timeBucket=NIGHT"
        );
    }

    #[test]
    fn partial_context_fingerprints_only_present_fields() {
        let ctx = ListeningContext {
            activity: Some(Activity::Exercise),
            ..Default::default()
        };
        assert_eq!(
            ListeningContext::fingerprint(Some(&ctx)),
            "activity=EXERCISE"
        );
    }

    #[test]
    fn context_deserialization_drops_unknown_fields() {
        let ctx: ListeningContext =
            serde_json::from_str(r#"{"mood":"CALM","weather":"RAIN"}"#).unwrap();
        assert_eq!(ctx.mood, Some(Mood::Calm));
        assert!(ctx.activity.is_none());
    }

    #[test]
    fn track_embedding_stays_off_the_wire() {
        let track = Track {
            id: "t1".into(),
            title: "Song".into(),
            artist: "Band".into(),
            genre: "Pop".into(),
            duration: 200,
            external_url: "https://example.com/t1".into(),
            preview_url: None,
            audio_features: None,
            embedding: Some(vec![0.5; EMBEDDING_DIM]),
        };
        let json = serde_json::to_string(&track).unwrap();
        assert!(!json.contains("embedding"));
    }
}
