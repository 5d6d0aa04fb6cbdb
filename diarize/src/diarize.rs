use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Label assigned to transcript segments no diarization turn covers.
pub const UNKNOWN_SPEAKER: &str = "UNKNOWN";

/// One diarization turn: a time range attributed to an anonymous speaker
/// label (e.g. `SPEAKER_00`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

impl Turn {
    pub fn new(start: f64, end: f64, speaker: &str) -> Self {
        Self {
            start,
            end,
            speaker: speaker.to_string(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Output of an external diarizer run over one recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diarization {
    pub speakers: Vec<String>,
    pub num_speakers: usize,
    pub segments: Vec<Turn>,
    pub total_segments: usize,
}

impl Diarization {
    /// Builds the summary fields from a raw turn list: sorted distinct
    /// labels and counts.
    pub fn from_turns(segments: Vec<Turn>) -> Self {
        let speakers: BTreeSet<String> =
            segments.iter().map(|t| t.speaker.clone()).collect();
        Self {
            num_speakers: speakers.len(),
            speakers: speakers.into_iter().collect(),
            total_segments: segments.len(),
            segments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_turns_derives_summary() {
        let d = Diarization::from_turns(vec![
            Turn::new(0.0, 5.0, "SPEAKER_01"),
            Turn::new(5.0, 9.0, "SPEAKER_00"),
            Turn::new(9.0, 12.0, "SPEAKER_01"),
        ]);
        assert_eq!(d.speakers, vec!["SPEAKER_00", "SPEAKER_01"]);
        assert_eq!(d.num_speakers, 2);
        assert_eq!(d.total_segments, 3);
    }

    #[test]
    fn diarization_json_shape() {
        let d = Diarization::from_turns(vec![Turn::new(0.0, 5.0, "SPEAKER_00")]);
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["num_speakers"], 1);
        assert_eq!(json["segments"][0]["speaker"], "SPEAKER_00");
        assert_eq!(json["segments"][0]["start"], 0.0);
    }
}
