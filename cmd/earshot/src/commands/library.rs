//! Library maintenance: rebuild, verify, export, import.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use earshot_voicedb::{SampleType, Snapshot, SqliteStore};

use super::{open_library, print_json};
use crate::{Cli, StoreMode};

/// Library maintenance operations.
#[derive(Args)]
pub struct LibraryCommand {
    #[command(subcommand)]
    command: LibrarySubcommand,
}

#[derive(Subcommand)]
enum LibrarySubcommand {
    /// Recompute centroids from stored samples (whole library or one
    /// speaker)
    Rebuild {
        #[arg(long)]
        speaker: Option<String>,
    },
    /// Check store integrity; reports findings, repairs nothing
    Verify,
    /// Export centroids to a portable snapshot file
    Export { output: PathBuf },
    /// Import snapshot speakers that are not already present
    Import { snapshot: PathBuf },
    /// List embedding-model rows
    Models,
    /// Deactivate a superseded model row; its centroids stop matching but
    /// its samples stay interpretable
    Deactivate { model_id: i64 },
}

impl LibraryCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let library = open_library(cli, SampleType::Speaker)?;
        match &self.command {
            LibrarySubcommand::Rebuild { speaker } => {
                let report = match speaker {
                    Some(name) => library.rebuild_speaker(name)?,
                    None => library.rebuild()?,
                };
                if cli.json {
                    print_json(&report)?;
                } else {
                    println!(
                        "Rebuilt {} centroids from {} samples ({} groups)",
                        report.centroids_written, report.sample_rows, report.group_count
                    );
                }
                Ok(())
            }
            LibrarySubcommand::Verify => {
                let report = library.verify()?;
                if cli.json {
                    print_json(&report)?;
                } else {
                    println!(
                        "Checked {} samples, {} centroids",
                        report.samples_checked, report.centroids_checked
                    );
                    for issue in &report.issues {
                        println!("  {issue:?}");
                    }
                }
                if !report.passed() {
                    anyhow::bail!("integrity check failed: {} issue(s)", report.issues.len());
                }
                if !cli.json {
                    println!("Integrity check passed");
                }
                Ok(())
            }
            LibrarySubcommand::Export { output } => {
                let snapshot = library.export_snapshot()?;
                snapshot.save(output)?;
                if cli.json {
                    print_json(&serde_json::json!({
                        "status": "success",
                        "speakers": snapshot.speakers.len(),
                        "path": output,
                    }))?;
                } else {
                    println!(
                        "Exported {} speakers to {}",
                        snapshot.speakers.len(),
                        output.display()
                    );
                }
                Ok(())
            }
            LibrarySubcommand::Import { snapshot } => {
                let document = Snapshot::load(snapshot)?;
                let added = library.import_missing(&document)?;
                if cli.json {
                    print_json(&serde_json::json!({"status": "success", "added": added}))?;
                } else {
                    println!(
                        "Imported {added} new speakers ({} in snapshot)",
                        document.speakers.len()
                    );
                }
                Ok(())
            }
            LibrarySubcommand::Models => {
                let store = relational_store(cli)?;
                let models = store.models()?;
                if cli.json {
                    print_json(&models)?;
                } else if models.is_empty() {
                    println!("No embedding models recorded yet");
                } else {
                    for m in models {
                        println!(
                            "  #{} {} {} dim={} {} [{}]",
                            m.id,
                            m.spec.backend,
                            m.spec.model_id,
                            m.spec.embedding_dim,
                            m.spec.version_tag,
                            if m.active { "active" } else { "inactive" }
                        );
                    }
                }
                Ok(())
            }
            LibrarySubcommand::Deactivate { model_id } => {
                let store = relational_store(cli)?;
                store.set_model_active(*model_id, false)?;
                println!("Deactivated model #{model_id}");
                Ok(())
            }
        }
    }
}

fn relational_store(cli: &Cli) -> anyhow::Result<SqliteStore> {
    if cli.store != StoreMode::Sqlite {
        anyhow::bail!("model rows live in the relational store (--store sqlite)");
    }
    Ok(SqliteStore::open(&cli.db)?)
}
