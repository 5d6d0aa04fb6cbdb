//! Full episode pass: diarize, identify, align, write the enhanced
//! transcript.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use serde::{Deserialize, Serialize};

use earshot_diarize::{
    Diarization, Diarizer, LabelMatch, TranscriptSegment, align_with_turns,
    identify_speakers_in_diarization,
};
use earshot_voicedb::SampleType;

use super::{load_waveform, open_extractor, open_library, parse_date, print_json};
use crate::extern_model::CommandDiarizer;
use crate::Cli;

/// Diarize an episode, identify the speakers, and align the transcript.
#[derive(Args)]
pub struct ProcessCommand {
    /// Path to the episode audio (WAV)
    #[arg(long)]
    audio: PathBuf,

    /// Path to the transcript JSON ({"segments": [{start, end, text}]})
    #[arg(long)]
    transcript: PathBuf,

    /// Output path (default: <transcript>_with_speakers.json)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Episode date (YYYY-MM-DD), anchors era-aware matching
    #[arg(long)]
    date: Option<String>,

    /// Expected number of speakers (default: auto-detect)
    #[arg(long)]
    speakers: Option<usize>,
}

#[derive(Deserialize)]
struct TranscriptDocument {
    segments: Vec<TranscriptSegment>,
}

/// The enhanced transcript written for downstream annotation.
#[derive(Serialize)]
struct EnhancedTranscript {
    segments: Vec<TranscriptSegment>,
    diarization: Diarization,
    /// Confidently identified labels only.
    speaker_names: BTreeMap<String, String>,
    speaker_confidence: BTreeMap<String, f32>,
}

impl ProcessCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let library = open_library(cli, SampleType::Speaker)?;
        let extractor = open_extractor(cli)?;
        let diarizer = CommandDiarizer::from_env(cli.diarizer_cmd.as_deref())?;

        let audio = load_waveform(&self.audio)?;
        let date = self.date.as_deref().map(parse_date).transpose()?;

        let raw = std::fs::read_to_string(&self.transcript)
            .with_context(|| format!("reading {}", self.transcript.display()))?;
        let transcript: TranscriptDocument = serde_json::from_str(&raw)
            .with_context(|| format!("parsing transcript {}", self.transcript.display()))?;

        tracing::info!(audio = %self.audio.display(), "running diarization");
        let diarization = diarizer.diarize(&audio, self.speakers)?;
        tracing::info!(
            speakers = diarization.num_speakers,
            turns = diarization.total_segments,
            "diarization complete"
        );

        let mapping = identify_speakers_in_diarization(
            &library,
            &extractor,
            &diarization,
            &audio,
            date,
            None,
        )?;

        let mut segments = transcript.segments;
        let labeled = align_with_turns(&mut segments, &diarization.segments);
        tracing::info!(segments = segments.len(), labeled, "transcript aligned");

        let enhanced = EnhancedTranscript {
            segments,
            speaker_names: mapping
                .iter()
                .filter_map(|(label, m)| {
                    m.name.as_ref().map(|n| (label.clone(), n.clone()))
                })
                .collect(),
            speaker_confidence: mapping
                .iter()
                .map(|(label, m)| (label.clone(), m.confidence))
                .collect(),
            diarization,
        };

        let output = self.output.clone().unwrap_or_else(|| {
            let stem = self
                .transcript
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("transcript");
            self.transcript
                .with_file_name(format!("{stem}_with_speakers.json"))
        });
        std::fs::write(&output, serde_json::to_string_pretty(&enhanced)?)
            .with_context(|| format!("writing {}", output.display()))?;

        if cli.json {
            print_json(&serde_json::json!({
                "status": "success",
                "num_speakers": enhanced.diarization.num_speakers,
                "identified": enhanced.speaker_names.len(),
                "output": output,
            }))?;
        } else {
            println!("Speakers found: {}", enhanced.diarization.num_speakers);
            for (label, m) in &mapping {
                print_label(label, m);
            }
            println!("Output: {}", output.display());
        }
        Ok(())
    }
}

fn print_label(label: &str, m: &LabelMatch) {
    match &m.name {
        Some(name) => println!("  {label} -> {name} (confidence: {:.2})", m.confidence),
        None => println!("  {label} -> unknown (best score: {:.2})", m.confidence),
    }
}
