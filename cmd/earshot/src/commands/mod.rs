//! CLI subcommands and shared helpers.

mod harvest;
mod identify;
mod library;
mod process;
mod sample;
mod speaker;

pub use harvest::HarvestCommand;
pub use identify::{CompareCommand, IdentifyCommand};
pub use library::LibraryCommand;
pub use process::ProcessCommand;
pub use sample::SampleCommand;
pub use speaker::SpeakerCommand;

use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;

use earshot_diarize::{Diarization, Waveform};
use earshot_voicedb::{EmbeddingModelSpec, SampleType, SnapshotStore, SqliteStore, VoiceStore};
use earshot_voiceid::{DEFAULT_THRESHOLD, Library};

use crate::extern_model::{CommandExtractor, model_spec_for};
use crate::{Cli, StoreMode};

pub(crate) fn backend_model(cli: &Cli) -> anyhow::Result<EmbeddingModelSpec> {
    Ok(model_spec_for(&cli.backend)?)
}

pub(crate) fn open_store(
    cli: &Cli,
    model: &EmbeddingModelSpec,
) -> anyhow::Result<Box<dyn VoiceStore>> {
    match cli.store {
        StoreMode::Sqlite => {
            if let Some(parent) = cli.db.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
            }
            Ok(Box::new(SqliteStore::open(&cli.db)?))
        }
        StoreMode::Snapshot => {
            if let Some(parent) = cli.snapshot.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("creating {}", parent.display()))?;
                }
            }
            Ok(Box::new(SnapshotStore::open(&cli.snapshot, model.clone())?))
        }
    }
}

pub(crate) fn open_library(cli: &Cli, sample_type: SampleType) -> anyhow::Result<Library> {
    let model = backend_model(cli)?;
    let store = open_store(cli, &model)?;
    Ok(Library::with_threshold(
        store,
        model,
        sample_type,
        cli.threshold.unwrap_or(DEFAULT_THRESHOLD),
    )?)
}

pub(crate) fn open_extractor(cli: &Cli) -> anyhow::Result<CommandExtractor> {
    Ok(CommandExtractor::from_env(
        &cli.backend,
        cli.extractor_cmd.as_deref(),
    )?)
}

pub(crate) fn load_waveform(path: &Path) -> anyhow::Result<Waveform> {
    Waveform::from_wav_file(path).with_context(|| format!("loading audio {}", path.display()))
}

/// Reads a diarization document: either the bare diarization JSON or a
/// transcript file carrying it under a `diarization` key.
pub(crate) fn load_diarization(path: &Path) -> anyhow::Result<Diarization> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", path.display()))?;
    let doc = value.get("diarization").cloned().unwrap_or(value);
    serde_json::from_value(doc).with_context(|| format!("no diarization in {}", path.display()))
}

pub(crate) fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    raw.parse::<NaiveDate>()
        .with_context(|| format!("invalid date {raw:?}, expected YYYY-MM-DD"))
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
