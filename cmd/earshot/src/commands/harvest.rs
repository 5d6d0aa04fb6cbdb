//! Harvest enrollment clips from a reviewed, diarized episode.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use serde::Serialize;

use earshot_diarize::{EmbeddingExtractor, Turn, UNKNOWN_SPEAKER};
use earshot_voicedb::{SampleSource, SampleType};
use earshot_voiceid::EnrollRequest;

use super::{load_diarization, load_waveform, open_extractor, open_library, parse_date, print_json};
use crate::Cli;

/// Harvest the longest confirmed segments per speaker from one episode
/// into the voice library.
#[derive(Args)]
pub struct HarvestCommand {
    /// Path to the episode audio (WAV)
    #[arg(long)]
    audio: PathBuf,

    /// Path to the diarization JSON
    #[arg(long)]
    diarization: PathBuf,

    /// JSON file mapping diarization labels to confirmed speaker names,
    /// e.g. {"SPEAKER_00": "Matt Donnelly"}
    #[arg(long)]
    speakers: PathBuf,

    /// Episode date (YYYY-MM-DD), recorded on each harvested sample
    #[arg(long)]
    date: Option<String>,

    /// Episode id, recorded on each harvested sample
    #[arg(long)]
    episode_id: Option<i64>,

    /// Minimum segment length in seconds
    #[arg(long, default_value_t = 4.0)]
    min_secs: f64,

    /// Maximum segments harvested per speaker
    #[arg(long, default_value_t = 5)]
    max_per_speaker: usize,

    /// Report what would be harvested without extracting
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Serialize)]
struct HarvestReport {
    status: &'static str,
    samples_added: usize,
    skipped: usize,
    errors: usize,
}

/// Unreviewed diarization labels masquerading as names
/// (`SPEAKER_00`, `speaker 3`, ...) must never pollute the library.
fn is_placeholder_speaker_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    if name.starts_with("SPEAKER_") {
        return true;
    }
    let compact: String = name
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .collect();
    match compact.strip_prefix("speaker") {
        Some(rest) => !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

impl HarvestCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let library = open_library(cli, SampleType::Speaker)?;
        let audio = load_waveform(&self.audio)?;
        let diarization = load_diarization(&self.diarization)?;
        let date = self.date.as_deref().map(parse_date).transpose()?;

        let raw = std::fs::read_to_string(&self.speakers)
            .with_context(|| format!("reading {}", self.speakers.display()))?;
        let label_map: BTreeMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing speaker map {}", self.speakers.display()))?;

        // Dry runs never need the external extractor.
        let extractor = if self.dry_run {
            None
        } else {
            Some(open_extractor(cli)?)
        };

        let mut samples_added = 0usize;
        let mut skipped = 0usize;
        let mut errors = 0usize;

        for (label, speaker_name) in &label_map {
            if is_placeholder_speaker_name(speaker_name) {
                tracing::warn!(label, speaker_name, "skipping placeholder speaker name");
                skipped += 1;
                continue;
            }

            // The label's longest eligible turns, with their original
            // segment indices for provenance.
            let mut turns: Vec<(usize, &Turn)> = diarization
                .segments
                .iter()
                .enumerate()
                .filter(|(_, t)| {
                    t.speaker == *label
                        && t.speaker != UNKNOWN_SPEAKER
                        && t.duration() >= self.min_secs
                })
                .collect();
            turns.sort_by(|a, b| {
                b.1.duration()
                    .partial_cmp(&a.1.duration())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            for (segment_idx, turn) in turns.into_iter().take(self.max_per_speaker) {
                if self.dry_run {
                    println!(
                        "  [dry-run] would harvest {speaker_name} seg{segment_idx} \
                         {:.1}-{:.1}s",
                        turn.start, turn.end
                    );
                    samples_added += 1;
                    continue;
                }

                let clip = audio.slice(turn.start, turn.end);
                let embedding = match extractor.as_ref().map(|ex| ex.extract(&clip)) {
                    Some(Ok(e)) => e,
                    Some(Err(e)) => {
                        tracing::warn!(
                            label,
                            segment_idx,
                            error = %e,
                            "extraction failed for harvested segment"
                        );
                        errors += 1;
                        continue;
                    }
                    // Dry runs never reach this point.
                    None => continue,
                };

                library.enroll(EnrollRequest {
                    speaker_name: speaker_name.clone(),
                    short_name: None,
                    embedding,
                    sample_date: date,
                    episode_id: self.episode_id,
                    segment_idx: Some(segment_idx as i64),
                    file_path: Some(self.audio.display().to_string()),
                    transcript_text: None,
                    start_time: Some(turn.start),
                    end_time: Some(turn.end),
                    external_id: None,
                    source: SampleSource::Harvest,
                    overwrite: false,
                })?;
                samples_added += 1;
            }
        }

        let report = HarvestReport {
            status: "success",
            samples_added,
            skipped,
            errors,
        };
        if cli.json {
            print_json(&report)?;
        } else {
            println!(
                "Harvested {samples_added} samples ({skipped} skipped, {errors} errors)"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_names_are_detected() {
        assert!(is_placeholder_speaker_name("SPEAKER_00"));
        assert!(is_placeholder_speaker_name("Speaker 3"));
        assert!(is_placeholder_speaker_name("speaker_12"));
        assert!(is_placeholder_speaker_name("speaker-7"));
        assert!(!is_placeholder_speaker_name("Matt Donnelly"));
        assert!(!is_placeholder_speaker_name("Speakerphone Steve"));
        assert!(!is_placeholder_speaker_name(""));
    }
}
