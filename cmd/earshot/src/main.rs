//! earshot - voice library and speaker identification CLI.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;
mod extern_model;

use commands::{
    CompareCommand, HarvestCommand, IdentifyCommand, LibraryCommand, ProcessCommand, SampleCommand,
    SpeakerCommand,
};

/// Which storage backs the voice library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreMode {
    /// Relational SQLite database (authoritative).
    Sqlite,
    /// Flat versioned JSON snapshot file (portable, centroids only).
    Snapshot,
}

/// earshot - maintain a library of per-speaker voice fingerprints and
/// identify who is speaking in diarized recordings.
///
/// Operations:
///   - enroll, list, and remove speaker voice samples
///   - identify diarization labels in an episode against the library
///   - harvest enrollment clips from a reviewed, diarized episode
///   - rebuild centroids, verify store integrity
///   - export/import portable snapshots, compare two backends
///
/// Embedding extraction is delegated to an external tool configured via
/// --extractor-cmd or the EARSHOT_EXTRACTOR environment variable.
#[derive(Parser)]
#[command(name = "earshot")]
#[command(about = "Voice library and speaker identification")]
#[command(version)]
pub struct Cli {
    /// SQLite database path (sqlite store mode)
    #[arg(long, global = true, default_value = "data/earshot.db")]
    pub db: PathBuf,

    /// Storage implementation
    #[arg(long, global = true, value_enum, default_value_t = StoreMode::Sqlite)]
    pub store: StoreMode,

    /// Snapshot file path (snapshot store mode)
    #[arg(long, global = true, default_value = "voice_library/embeddings.json")]
    pub snapshot: PathBuf,

    /// Embedding backend (pyannote, ecapa-tdnn)
    #[arg(short = 'b', long, global = true, default_value = "pyannote")]
    pub backend: String,

    /// Minimum weighted similarity for a confident match
    #[arg(long, global = true)]
    pub threshold: Option<f32>,

    /// External embedding extractor command (default: EARSHOT_EXTRACTOR)
    #[arg(long, global = true)]
    pub extractor_cmd: Option<String>,

    /// External diarizer command (default: EARSHOT_DIARIZER)
    #[arg(long, global = true)]
    pub diarizer_cmd: Option<String>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage enrolled speakers
    Speaker(SpeakerCommand),
    /// Manage stored voice samples
    Sample(SampleCommand),
    /// Library maintenance: rebuild, verify, export, import
    Library(LibraryCommand),
    /// Identify speakers in a diarized episode
    Identify(IdentifyCommand),
    /// Diarize, identify, and align a whole episode
    Process(ProcessCommand),
    /// Compare two embedding backends on the same episode
    Compare(CompareCommand),
    /// Harvest enrollment clips from a reviewed episode
    Harvest(HarvestCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so --json output stays parseable.
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Speaker(cmd) => cmd.run(&cli),
        Commands::Sample(cmd) => cmd.run(&cli),
        Commands::Library(cmd) => cmd.run(&cli),
        Commands::Identify(cmd) => cmd.run(&cli),
        Commands::Process(cmd) => cmd.run(&cli),
        Commands::Compare(cmd) => cmd.run(&cli),
        Commands::Harvest(cmd) => cmd.run(&cli),
    }
}
