use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use earshot_voiceid::{Library, mean_vector};

use crate::diarize::{Diarization, Turn, UNKNOWN_SPEAKER};
use crate::error::DiarizeError;
use crate::extractor::EmbeddingExtractor;
use crate::waveform::Waveform;

/// Longest turns sampled per diarization label.
pub const MAX_TURNS_PER_LABEL: usize = 5;

/// Turns shorter than this embed unreliably and are discarded.
pub const MIN_TURN_SECS: f64 = 1.0;

/// Resolution of one diarization label against the voice library.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelMatch {
    /// `None` when the best score stayed below the library threshold.
    pub name: Option<String>,
    pub confidence: f32,
}

/// Maps each diarization label to the best-matching known speaker.
///
/// Per label: take the label's [`MAX_TURNS_PER_LABEL`] longest turns,
/// discard slices under [`MIN_TURN_SECS`], extract one embedding per
/// surviving slice, average them, and identify against the library with
/// `episode_date` as the temporal anchor.
///
/// Labels with zero usable slices get no map entry — short or noisy turns
/// are common and must not abort the episode. A failed extraction skips
/// that slice only.
///
/// `progress` (when given) is invoked after each label with the percentage
/// of labels processed.
pub fn identify_speakers_in_diarization(
    library: &Library,
    extractor: &dyn EmbeddingExtractor,
    diarization: &Diarization,
    audio: &Waveform,
    episode_date: Option<NaiveDate>,
    mut progress: Option<&mut dyn FnMut(u8)>,
) -> Result<BTreeMap<String, LabelMatch>, DiarizeError> {
    let mut mapping = BTreeMap::new();
    if library.is_empty() {
        tracing::warn!("voice library is empty, skipping speaker identification");
        return Ok(mapping);
    }

    // Turns per label, in sorted label order for reproducible output.
    let mut by_label: BTreeMap<&str, Vec<&Turn>> = BTreeMap::new();
    for turn in &diarization.segments {
        if turn.speaker == UNKNOWN_SPEAKER {
            continue;
        }
        by_label.entry(&turn.speaker).or_default().push(turn);
    }

    let total = by_label.len();
    for (idx, (label, mut turns)) in by_label.into_iter().enumerate() {
        turns.sort_by(|a, b| {
            b.duration()
                .partial_cmp(&a.duration())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut embeddings = Vec::new();
        let mut skipped_short = 0usize;
        let mut failed = 0usize;
        for turn in turns.into_iter().take(MAX_TURNS_PER_LABEL) {
            let slice = audio.slice(turn.start, turn.end);
            if slice.duration_secs() < MIN_TURN_SECS {
                skipped_short += 1;
                continue;
            }
            match extractor.extract(&slice) {
                Ok(embedding) => embeddings.push(embedding),
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        label,
                        start = turn.start,
                        end = turn.end,
                        error = %e,
                        "embedding extraction failed for sub-segment"
                    );
                }
            }
        }

        match mean_vector(&embeddings) {
            Some(embedding) => {
                let result = library.identify(&embedding, episode_date);
                tracing::info!(
                    label,
                    speaker = result.name().unwrap_or("unknown"),
                    confidence = result.score(),
                    "identified diarization label"
                );
                mapping.insert(
                    label.to_string(),
                    LabelMatch {
                        name: result.name().map(str::to_string),
                        confidence: result.score(),
                    },
                );
            }
            None => {
                tracing::debug!(
                    label,
                    skipped_short,
                    failed,
                    "no usable sub-segments for label"
                );
            }
        }

        if let Some(cb) = progress.as_deref_mut() {
            cb((((idx + 1) * 100) / total) as u8);
        }
    }
    Ok(mapping)
}

/// Side-by-side confidences from two backend configurations over the same
/// diarized episode. Diagnostic only.
#[derive(Debug, Clone, Serialize)]
pub struct LabelComparison {
    pub a: Option<LabelMatch>,
    pub b: Option<LabelMatch>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareReport {
    pub backend_a: String,
    pub backend_b: String,
    pub labels: BTreeMap<String, LabelComparison>,
}

/// Runs identification once per `(library, extractor)` pair and reports
/// both confidences per label.
pub fn compare_backends(
    library_a: &Library,
    extractor_a: &dyn EmbeddingExtractor,
    library_b: &Library,
    extractor_b: &dyn EmbeddingExtractor,
    diarization: &Diarization,
    audio: &Waveform,
    episode_date: Option<NaiveDate>,
) -> Result<CompareReport, DiarizeError> {
    let a = identify_speakers_in_diarization(
        library_a,
        extractor_a,
        diarization,
        audio,
        episode_date,
        None,
    )?;
    let b = identify_speakers_in_diarization(
        library_b,
        extractor_b,
        diarization,
        audio,
        episode_date,
        None,
    )?;

    let mut labels = BTreeMap::new();
    for label in a.keys().chain(b.keys()) {
        labels.entry(label.clone()).or_insert_with(|| LabelComparison {
            a: a.get(label).cloned(),
            b: b.get(label).cloned(),
        });
    }
    Ok(CompareReport {
        backend_a: library_a.backend().to_string(),
        backend_b: library_b.backend().to_string(),
        labels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use earshot_voicedb::{EmbeddingModelSpec, SampleType, SqliteStore};
    use earshot_voiceid::EnrollRequest;

    /// Derives the embedding from the mean amplitude of the slice, so a
    /// test waveform encodes speaker identity in its sample values.
    struct AmplitudeExtractor {
        model: EmbeddingModelSpec,
        calls: Mutex<Vec<usize>>,
    }

    impl AmplitudeExtractor {
        fn new(backend: &str) -> Self {
            Self {
                model: EmbeddingModelSpec::new(backend, "test/embedding", 2, "1"),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl EmbeddingExtractor for AmplitudeExtractor {
        fn model(&self) -> &EmbeddingModelSpec {
            &self.model
        }

        fn extract(&self, audio: &Waveform) -> Result<Vec<f32>, DiarizeError> {
            if audio.is_empty() {
                return Err(DiarizeError::Extraction("empty audio".to_string()));
            }
            self.calls.lock().unwrap().push(audio.len());
            let mean = audio.samples().iter().sum::<f32>() / audio.len() as f32;
            Ok(vec![mean, 1.0 - mean])
        }
    }

    /// Always fails: exercises the skip-on-extraction-failure path.
    struct FailingExtractor {
        model: EmbeddingModelSpec,
    }

    impl EmbeddingExtractor for FailingExtractor {
        fn model(&self) -> &EmbeddingModelSpec {
            &self.model
        }

        fn extract(&self, _audio: &Waveform) -> Result<Vec<f32>, DiarizeError> {
            Err(DiarizeError::Extraction("model exploded".to_string()))
        }
    }

    fn library_with(speakers: &[(&str, Vec<f32>)]) -> Library {
        let store = SqliteStore::open_in_memory().unwrap();
        let lib = Library::open(
            Box::new(store),
            EmbeddingModelSpec::new("pyannote", "test/embedding", 2, "1"),
            SampleType::Speaker,
        )
        .unwrap();
        for (i, (name, v)) in speakers.iter().enumerate() {
            lib.enroll(EnrollRequest {
                episode_id: Some(1),
                segment_idx: Some(i as i64),
                ..EnrollRequest::new(name, v.clone())
            })
            .unwrap();
        }
        lib
    }

    /// 20 s waveform: SPEAKER_00 amplitude 0.9 in [0, 10), SPEAKER_01
    /// amplitude 0.1 in [10, 20).
    fn two_speaker_audio() -> Waveform {
        let rate = 16000usize;
        let mut samples = vec![0.9f32; rate * 10];
        samples.extend(vec![0.1f32; rate * 10]);
        Waveform::new(samples, rate as u32)
    }

    fn two_speaker_diarization() -> Diarization {
        Diarization::from_turns(vec![
            Turn::new(0.0, 6.0, "SPEAKER_00"),
            Turn::new(6.0, 10.0, "SPEAKER_00"),
            Turn::new(10.0, 17.0, "SPEAKER_01"),
            Turn::new(17.0, 20.0, "SPEAKER_01"),
        ])
    }

    #[test]
    fn maps_labels_to_enrolled_speakers() {
        let lib = library_with(&[
            ("Matt Donnelly", vec![0.9, 0.1]),
            ("Paul Mattingly", vec![0.1, 0.9]),
        ]);
        let extractor = AmplitudeExtractor::new("pyannote");

        let mapping = identify_speakers_in_diarization(
            &lib,
            &extractor,
            &two_speaker_diarization(),
            &two_speaker_audio(),
            None,
            None,
        )
        .unwrap();

        assert_eq!(mapping.len(), 2);
        assert_eq!(
            mapping["SPEAKER_00"].name.as_deref(),
            Some("Matt Donnelly")
        );
        assert_eq!(
            mapping["SPEAKER_01"].name.as_deref(),
            Some("Paul Mattingly")
        );
        assert!(mapping["SPEAKER_00"].confidence > 0.9);
    }

    #[test]
    fn short_turns_do_not_contribute() {
        let lib = library_with(&[("Matt Donnelly", vec![0.9, 0.1])]);
        let extractor = AmplitudeExtractor::new("pyannote");

        // One 0.8 s turn (discarded) and one 6 s turn (kept).
        let diarization = Diarization::from_turns(vec![
            Turn::new(0.0, 0.8, "SPEAKER_00"),
            Turn::new(1.0, 7.0, "SPEAKER_00"),
        ]);
        let mapping = identify_speakers_in_diarization(
            &lib,
            &extractor,
            &diarization,
            &two_speaker_audio(),
            None,
            None,
        )
        .unwrap();

        assert_eq!(extractor.call_count(), 1);
        assert_eq!(
            mapping["SPEAKER_00"].name.as_deref(),
            Some("Matt Donnelly")
        );
    }

    #[test]
    fn label_with_only_short_turns_gets_no_entry() {
        let lib = library_with(&[("Matt Donnelly", vec![0.9, 0.1])]);
        let extractor = AmplitudeExtractor::new("pyannote");

        let diarization = Diarization::from_turns(vec![
            Turn::new(0.0, 0.5, "SPEAKER_00"),
            Turn::new(1.0, 1.9, "SPEAKER_00"),
            Turn::new(10.0, 16.0, "SPEAKER_01"),
        ]);
        let mapping = identify_speakers_in_diarization(
            &lib,
            &extractor,
            &diarization,
            &two_speaker_audio(),
            None,
            None,
        )
        .unwrap();

        assert!(!mapping.contains_key("SPEAKER_00"));
        assert!(mapping.contains_key("SPEAKER_01"));
    }

    #[test]
    fn extraction_failures_skip_the_label_silently() {
        let lib = library_with(&[("Matt Donnelly", vec![0.9, 0.1])]);
        let extractor = FailingExtractor {
            model: EmbeddingModelSpec::new("pyannote", "test/embedding", 2, "1"),
        };
        let mapping = identify_speakers_in_diarization(
            &lib,
            &extractor,
            &two_speaker_diarization(),
            &two_speaker_audio(),
            None,
            None,
        )
        .unwrap();
        assert!(mapping.is_empty());
    }

    #[test]
    fn only_top_five_longest_turns_are_sampled() {
        let lib = library_with(&[("Matt Donnelly", vec![0.9, 0.1])]);
        let extractor = AmplitudeExtractor::new("pyannote");

        // Seven eligible turns; only the 5 longest may be embedded.
        let turns: Vec<Turn> = (0..7)
            .map(|i| Turn::new(i as f64, i as f64 + 1.1 + 0.1 * i as f64, "SPEAKER_00"))
            .collect();
        identify_speakers_in_diarization(
            &lib,
            &extractor,
            &Diarization::from_turns(turns),
            &two_speaker_audio(),
            None,
            None,
        )
        .unwrap();
        assert_eq!(extractor.call_count(), MAX_TURNS_PER_LABEL);
    }

    #[test]
    fn progress_reports_per_label_percentages() {
        let lib = library_with(&[("Matt Donnelly", vec![0.9, 0.1])]);
        let extractor = AmplitudeExtractor::new("pyannote");

        let mut seen: Vec<u8> = Vec::new();
        let mut cb = |pct: u8| seen.push(pct);
        identify_speakers_in_diarization(
            &lib,
            &extractor,
            &two_speaker_diarization(),
            &two_speaker_audio(),
            None,
            Some(&mut cb),
        )
        .unwrap();
        assert_eq!(seen, vec![50, 100]);
    }

    #[test]
    fn empty_library_short_circuits() {
        let lib = library_with(&[]);
        let extractor = AmplitudeExtractor::new("pyannote");
        let mapping = identify_speakers_in_diarization(
            &lib,
            &extractor,
            &two_speaker_diarization(),
            &two_speaker_audio(),
            None,
            None,
        )
        .unwrap();
        assert!(mapping.is_empty());
        assert_eq!(extractor.call_count(), 0);
    }

    #[test]
    fn compare_reports_both_backends_side_by_side() {
        let lib_a = library_with(&[("Matt Donnelly", vec![0.9, 0.1])]);
        let ext_a = AmplitudeExtractor::new("pyannote");

        let store_b = SqliteStore::open_in_memory().unwrap();
        let lib_b = Library::open(
            Box::new(store_b),
            EmbeddingModelSpec::new("ecapa-tdnn", "test/embedding", 2, "1"),
            SampleType::Speaker,
        )
        .unwrap();
        lib_b
            .enroll(EnrollRequest {
                episode_id: Some(1),
                segment_idx: Some(0),
                ..EnrollRequest::new("Matt Donnelly", vec![0.9, 0.1])
            })
            .unwrap();
        let ext_b = AmplitudeExtractor::new("ecapa-tdnn");

        let report = compare_backends(
            &lib_a,
            &ext_a,
            &lib_b,
            &ext_b,
            &two_speaker_diarization(),
            &two_speaker_audio(),
            None,
        )
        .unwrap();

        assert_eq!(report.backend_a, "pyannote");
        assert_eq!(report.backend_b, "ecapa-tdnn");
        let cmp = &report.labels["SPEAKER_00"];
        assert!(cmp.a.is_some());
        assert!(cmp.b.is_some());
    }
}
