//! Artist diversity enforcement.

use crate::model::Track;

/// Walk the ranked list appending each track unless it would extend a run
/// of `max_run` consecutive tracks by the same artist. Skipped tracks are
/// discarded, not reordered later.
pub fn enforce_artist_diversity(tracks: Vec<Track>, max_run: usize) -> Vec<Track> {
    if max_run == 0 {
        return Vec::new();
    }
    let mut kept: Vec<Track> = Vec::with_capacity(tracks.len());
    for track in tracks {
        let run = kept
            .iter()
            .rev()
            .take_while(|t| t.artist == track.artist)
            .count();
        if run < max_run {
            kept.push(track);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by(artist: &str, id: &str) -> Track {
        Track {
            id: id.into(),
            title: id.into(),
            artist: artist.into(),
            genre: "Pop".into(),
            duration: 180,
            external_url: format!("https://tracks.example/{id}"),
            preview_url: None,
            audio_features: None,
            embedding: None,
        }
    }

    fn ids(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn caps_runs_of_one_artist() {
        // A,A,A,A,B with a cap of 3 keeps A,A,A,B.
        let input = vec![
            by("A", "a1"),
            by("A", "a2"),
            by("A", "a3"),
            by("A", "a4"),
            by("B", "b1"),
        ];
        let kept = enforce_artist_diversity(input, 3);
        assert_eq!(ids(&kept), vec!["a1", "a2", "a3", "b1"]);
    }

    #[test]
    fn dropped_tracks_never_reappear() {
        let input = vec![
            by("A", "a1"),
            by("A", "a2"),
            by("A", "a3"),
            by("A", "a4"),
            by("B", "b1"),
            by("A", "a5"),
        ];
        let kept = enforce_artist_diversity(input, 3);
        // a4 is discarded even though the run is broken afterwards; a5 is
        // fine because b1 reset the run.
        assert_eq!(ids(&kept), vec!["a1", "a2", "a3", "b1", "a5"]);
    }

    #[test]
    fn no_four_in_a_row_in_any_output() {
        let input: Vec<Track> = (0..12)
            .map(|i| by(if i % 5 == 0 { "B" } else { "A" }, &format!("t{i}")))
            .collect();
        let kept = enforce_artist_diversity(input, 3);
        for window in kept.windows(4) {
            assert!(
                !window.iter().all(|t| t.artist == window[0].artist),
                "found a run of four"
            );
        }
    }

    #[test]
    fn alternating_artists_pass_untouched() {
        let input = vec![by("A", "a1"), by("B", "b1"), by("A", "a2"), by("B", "b2")];
        let kept = enforce_artist_diversity(input.clone(), 3);
        assert_eq!(ids(&kept), ids(&input));
    }
}
