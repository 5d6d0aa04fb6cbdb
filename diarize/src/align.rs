use serde::{Deserialize, Serialize};

use crate::diarize::{Turn, UNKNOWN_SPEAKER};

/// One transcript segment with timestamps; `speaker` is filled in by
/// [`align_with_turns`] with a diarization *label*, not a resolved name —
/// callers apply the label→name mapping themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default)]
    pub speaker: Option<String>,
}

/// Attaches a diarization label to each transcript segment by temporal
/// midpoint containment: the first turn whose `[start, end]` contains the
/// segment midpoint wins. Segments no turn covers get
/// [`UNKNOWN_SPEAKER`].
///
/// Turns are assumed non-overlapping; under overlap the first turn in
/// list order still wins.
///
/// Returns the number of segments that received a real label.
pub fn align_with_turns(segments: &mut [TranscriptSegment], turns: &[Turn]) -> usize {
    let mut labeled = 0usize;
    for segment in segments.iter_mut() {
        let midpoint = (segment.start + segment.end) / 2.0;
        let label = turns
            .iter()
            .find(|t| t.start <= midpoint && midpoint <= t.end)
            .map(|t| t.speaker.as_str());
        if label.is_some() {
            labeled += 1;
        }
        segment.speaker = Some(label.unwrap_or(UNKNOWN_SPEAKER).to_string());
    }
    tracing::debug!(
        segments = segments.len(),
        labeled,
        "aligned transcript segments with diarization turns"
    );
    labeled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            text: text.to_string(),
            speaker: None,
        }
    }

    #[test]
    fn midpoint_containment_assigns_labels() {
        let turns = vec![
            Turn::new(0.0, 5.0, "SPEAKER_00"),
            Turn::new(5.0, 10.0, "SPEAKER_01"),
        ];
        let mut segments = vec![
            segment(0.0, 4.0, "hello there"),
            segment(4.5, 6.5, "and welcome"),
            segment(8.0, 9.5, "to the show"),
        ];
        let labeled = align_with_turns(&mut segments, &turns);
        assert_eq!(labeled, 3);
        assert_eq!(segments[0].speaker.as_deref(), Some("SPEAKER_00"));
        // Midpoint 5.5 falls in the second turn.
        assert_eq!(segments[1].speaker.as_deref(), Some("SPEAKER_01"));
        assert_eq!(segments[2].speaker.as_deref(), Some("SPEAKER_01"));
    }

    #[test]
    fn uncovered_midpoint_is_unknown() {
        let turns = vec![Turn::new(0.0, 2.0, "SPEAKER_00")];
        let mut segments = vec![segment(5.0, 7.0, "dead air")];
        let labeled = align_with_turns(&mut segments, &turns);
        assert_eq!(labeled, 0);
        assert_eq!(segments[0].speaker.as_deref(), Some(UNKNOWN_SPEAKER));
    }

    #[test]
    fn boundary_midpoint_belongs_to_the_first_containing_turn() {
        // Contiguous turns share the boundary instant; first match wins.
        let turns = vec![
            Turn::new(0.0, 5.0, "SPEAKER_00"),
            Turn::new(5.0, 10.0, "SPEAKER_01"),
        ];
        let mut segments = vec![segment(4.0, 6.0, "boundary")];
        align_with_turns(&mut segments, &turns);
        assert_eq!(segments[0].speaker.as_deref(), Some("SPEAKER_00"));
    }

    #[test]
    fn overlapping_turns_first_match_wins() {
        let turns = vec![
            Turn::new(0.0, 10.0, "SPEAKER_00"),
            Turn::new(4.0, 6.0, "SPEAKER_01"),
        ];
        let mut segments = vec![segment(4.5, 5.5, "contested")];
        align_with_turns(&mut segments, &turns);
        assert_eq!(segments[0].speaker.as_deref(), Some("SPEAKER_00"));
    }
}
