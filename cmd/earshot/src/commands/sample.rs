//! Stored sample maintenance.

use clap::{Args, Subcommand};

use earshot_voicedb::{SampleSource, SampleType};

use super::{open_library, print_json};
use crate::Cli;

/// Manage stored voice samples.
#[derive(Args)]
pub struct SampleCommand {
    #[command(subcommand)]
    command: SampleSubcommand,
}

#[derive(Subcommand)]
enum SampleSubcommand {
    /// List a speaker's stored samples
    List { speaker: String },
    /// Set the quality rating of a sample
    Rate { id: i64, rating: i32 },
    /// Delete one sample and rebuild the speaker's centroid
    Delete { id: i64 },
    /// Delete all samples from a source (manual, harvest, auto) and
    /// rebuild the library
    Purge { source: String },
}

impl SampleCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let library = open_library(cli, SampleType::Speaker)?;
        match &self.command {
            SampleSubcommand::List { speaker } => {
                let samples = library.store().samples_for_speaker(library.backend(), speaker)?;
                if cli.json {
                    print_json(&samples)?;
                } else if samples.is_empty() {
                    println!("No stored samples for {speaker}");
                } else {
                    for s in samples {
                        let span = match (s.start_time, s.end_time) {
                            (Some(a), Some(b)) => format!(" {a:.1}-{b:.1}s"),
                            _ => String::new(),
                        };
                        println!(
                            "  #{} ep{}{span} [{}] rating {}",
                            s.id,
                            s.episode_id.map(|e| e.to_string()).unwrap_or_else(|| "?".into()),
                            s.source,
                            s.rating
                        );
                    }
                }
                Ok(())
            }
            SampleSubcommand::Rate { id, rating } => {
                library.store().set_sample_rating(*id, *rating)?;
                if cli.json {
                    print_json(&serde_json::json!({"status": "success", "id": id, "rating": rating}))?;
                } else {
                    println!("Rated sample #{id} as {rating}");
                }
                Ok(())
            }
            SampleSubcommand::Delete { id } => {
                // The running mean cannot subtract a sample; rebuild the
                // affected speaker in the same command.
                match library.store().delete_sample(*id)? {
                    Some(speaker) => {
                        let report = library.rebuild_speaker(&speaker)?;
                        if cli.json {
                            print_json(&serde_json::json!({
                                "status": "success",
                                "speaker": speaker,
                                "rebuild": report,
                            }))?;
                        } else {
                            println!(
                                "Deleted sample #{id}; rebuilt {speaker} from {} remaining samples",
                                report.sample_rows
                            );
                        }
                    }
                    None => println!("Sample not found: #{id}"),
                }
                Ok(())
            }
            SampleSubcommand::Purge { source } => {
                let source: SampleSource = source.parse()?;
                let deleted = library
                    .store()
                    .delete_samples_by_source(library.backend(), source)?;
                let report = library.rebuild()?;
                if cli.json {
                    print_json(&serde_json::json!({
                        "status": "success",
                        "deleted": deleted,
                        "rebuild": report,
                    }))?;
                } else {
                    println!(
                        "Purged {deleted} {source} samples; rebuilt {} centroids",
                        report.centroids_written
                    );
                }
                Ok(())
            }
        }
    }
}
