//! Episode identification and backend comparison.

use std::path::PathBuf;

use clap::Args;

use earshot_diarize::{compare_backends, identify_speakers_in_diarization};
use earshot_voicedb::{SampleType, SqliteStore};
use earshot_voiceid::{DEFAULT_THRESHOLD, Library};

use crate::extern_model::{CommandExtractor, model_spec_for};
use crate::{Cli, StoreMode};

use super::{load_diarization, load_waveform, open_extractor, open_library, parse_date, print_json};

/// Identify speakers in a diarized episode.
#[derive(Args)]
pub struct IdentifyCommand {
    /// Path to the episode audio (WAV)
    #[arg(long)]
    audio: PathBuf,

    /// Path to the diarization JSON (bare document or a transcript
    /// carrying a `diarization` key)
    #[arg(long)]
    diarization: PathBuf,

    /// Episode date (YYYY-MM-DD), anchors era-aware matching
    #[arg(long)]
    date: Option<String>,
}

impl IdentifyCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let library = open_library(cli, SampleType::Speaker)?;
        let extractor = open_extractor(cli)?;
        let audio = load_waveform(&self.audio)?;
        let diarization = load_diarization(&self.diarization)?;
        let date = self.date.as_deref().map(parse_date).transpose()?;

        let mut progress = |pct: u8| {
            println!("IDENTIFY_PROGRESS: {pct}");
        };
        let mapping = identify_speakers_in_diarization(
            &library,
            &extractor,
            &diarization,
            &audio,
            date,
            if cli.json { None } else { Some(&mut progress) },
        )?;

        if cli.json {
            print_json(&mapping)?;
        } else if mapping.is_empty() {
            println!("No labels could be identified");
        } else {
            println!("Speaker mapping:");
            for (label, m) in &mapping {
                match &m.name {
                    Some(name) => {
                        println!("  {label} -> {name} (confidence: {:.2})", m.confidence)
                    }
                    None => println!("  {label} -> unknown (best score: {:.2})", m.confidence),
                }
            }
        }
        Ok(())
    }
}

/// Compare two embedding backends' scoring on the same diarized episode.
#[derive(Args)]
pub struct CompareCommand {
    /// Path to the episode audio (WAV)
    #[arg(long)]
    audio: PathBuf,

    /// Path to the diarization JSON
    #[arg(long)]
    diarization: PathBuf,

    /// First backend
    #[arg(long, default_value = "pyannote")]
    backend_a: String,

    /// Second backend
    #[arg(long, default_value = "ecapa-tdnn")]
    backend_b: String,

    /// Episode date (YYYY-MM-DD)
    #[arg(long)]
    date: Option<String>,
}

impl CompareCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        if cli.store != StoreMode::Sqlite {
            anyhow::bail!("compare requires --store sqlite (one snapshot file holds one backend)");
        }

        let open_side = |backend: &str| -> anyhow::Result<(Library, CommandExtractor)> {
            let model = model_spec_for(backend)?;
            let store = SqliteStore::open(&cli.db)?;
            let library = Library::with_threshold(
                Box::new(store),
                model,
                SampleType::Speaker,
                cli.threshold.unwrap_or(DEFAULT_THRESHOLD),
            )?;
            let extractor = CommandExtractor::from_env(backend, cli.extractor_cmd.as_deref())?;
            Ok((library, extractor))
        };

        let (lib_a, ext_a) = open_side(&self.backend_a)?;
        let (lib_b, ext_b) = open_side(&self.backend_b)?;
        let audio = load_waveform(&self.audio)?;
        let diarization = load_diarization(&self.diarization)?;
        let date = self.date.as_deref().map(parse_date).transpose()?;

        let report = compare_backends(
            &lib_a, &ext_a, &lib_b, &ext_b, &diarization, &audio, date,
        )?;

        if cli.json {
            print_json(&report)?;
        } else {
            println!("{:12} {:>24} {:>24}", "label", report.backend_a, report.backend_b);
            for (label, cmp) in &report.labels {
                let side = |m: &Option<earshot_diarize::LabelMatch>| match m {
                    Some(m) => format!(
                        "{} ({:.2})",
                        m.name.as_deref().unwrap_or("unknown"),
                        m.confidence
                    ),
                    None => "-".to_string(),
                };
                println!("{label:12} {:>24} {:>24}", side(&cmp.a), side(&cmp.b));
            }
        }
        Ok(())
    }
}
