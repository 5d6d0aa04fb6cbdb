//! Speaker enrollment and listing.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use earshot_diarize::EmbeddingExtractor;
use earshot_voicedb::{SampleSource, SampleType};
use earshot_voiceid::EnrollRequest;

use super::{load_waveform, open_extractor, open_library, parse_date, print_json};
use crate::Cli;

/// Manage enrolled speakers.
#[derive(Args)]
pub struct SpeakerCommand {
    #[command(subcommand)]
    command: SpeakerSubcommand,
}

#[derive(Subcommand)]
enum SpeakerSubcommand {
    /// Enroll a voice sample for a speaker
    Add {
        /// Speaker's full name
        name: String,
        /// Path to a WAV audio sample
        #[arg(long)]
        audio: PathBuf,
        /// Clip start within the audio, in seconds
        #[arg(long)]
        start: Option<f64>,
        /// Clip end within the audio, in seconds
        #[arg(long)]
        end: Option<f64>,
        /// Short name (default: first name)
        #[arg(long)]
        short: Option<String>,
        /// Sample date (YYYY-MM-DD), feeds era-aware matching
        #[arg(long)]
        date: Option<String>,
        /// Episode the clip came from
        #[arg(long)]
        episode_id: Option<i64>,
        /// Transcript segment index the clip came from
        #[arg(long)]
        segment_idx: Option<i64>,
        /// Enroll as a sound bite instead of a speaker voice
        #[arg(long)]
        sound_bite: bool,
        /// Discard the existing centroid instead of averaging into it
        #[arg(long)]
        overwrite: bool,
    },
    /// Remove a speaker and all their samples
    Remove {
        name: String,
        #[arg(long)]
        sound_bite: bool,
    },
    /// List enrolled speakers
    List {
        #[arg(long)]
        sound_bite: bool,
    },
}

fn sample_type(sound_bite: bool) -> SampleType {
    if sound_bite {
        SampleType::SoundBite
    } else {
        SampleType::Speaker
    }
}

impl SpeakerCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        match &self.command {
            SpeakerSubcommand::Add {
                name,
                audio,
                start,
                end,
                short,
                date,
                episode_id,
                segment_idx,
                sound_bite,
                overwrite,
            } => {
                let library = open_library(cli, sample_type(*sound_bite))?;
                let extractor = open_extractor(cli)?;

                let waveform = load_waveform(audio)?;
                let clip = match (start, end) {
                    (Some(s), Some(e)) => waveform.slice(*s, *e),
                    _ => waveform,
                };
                let embedding = extractor.extract(&clip)?;

                let outcome = library.enroll(EnrollRequest {
                    speaker_name: name.clone(),
                    short_name: short.clone(),
                    embedding,
                    sample_date: date.as_deref().map(parse_date).transpose()?,
                    episode_id: *episode_id,
                    segment_idx: *segment_idx,
                    file_path: Some(audio.display().to_string()),
                    transcript_text: None,
                    start_time: *start,
                    end_time: *end,
                    external_id: None,
                    source: SampleSource::Manual,
                    overwrite: *overwrite,
                })?;

                if cli.json {
                    print_json(&serde_json::json!({
                        "status": "success",
                        "speaker": name,
                        "sample_count": outcome.sample_count,
                        "reset": outcome.reset,
                    }))?;
                } else if outcome.sample_count > 1 {
                    println!(
                        "Updated {name}'s fingerprint (now {} samples)",
                        outcome.sample_count
                    );
                } else {
                    println!("Added {name} to the voice library");
                }
                Ok(())
            }
            SpeakerSubcommand::Remove { name, sound_bite } => {
                let library = open_library(cli, sample_type(*sound_bite))?;
                let removed = library.remove_speaker(name)?;
                if cli.json {
                    print_json(&removed)?;
                } else if removed.centroids_deleted > 0 || removed.samples_deleted > 0 {
                    println!(
                        "Removed {name} ({} samples, {} centroids)",
                        removed.samples_deleted, removed.centroids_deleted
                    );
                } else {
                    println!("Speaker not found: {name}");
                }
                Ok(())
            }
            SpeakerSubcommand::List { sound_bite } => {
                let library = open_library(cli, sample_type(*sound_bite))?;
                let speakers = library.list_speakers()?;
                if cli.json {
                    print_json(&speakers)?;
                } else if speakers.is_empty() {
                    println!("Voice library is empty. Add speakers with:");
                    println!("  earshot speaker add \"Matt Donnelly\" --audio sample.wav");
                } else {
                    println!("Voice library ({} speakers):", speakers.len());
                    for s in speakers {
                        println!(
                            "  - {} ({}) - {} sample(s)",
                            s.name, s.short_name, s.sample_count
                        );
                    }
                }
                Ok(())
            }
        }
    }
}
