//! Vaultkeep CLI
//!
//! Inspect and operate on the local store without the UI: read or replace
//! collections, run a hard save, seal a snapshot, list the vault and the
//! hard-save history, manage the seal image.

use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use vaultkeep::{observability, CollectionKey, EngineConfig, SyncEngine};

#[derive(Parser)]
#[command(name = "vaultkeep-cli")]
#[command(about = "Vaultkeep Command Line Interface")]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, env = "VAULTKEEP_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory, overrides the config file
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show engine status
    Status,

    /// Print one collection
    Get {
        /// Collection key, e.g. memories
        collection: String,
    },

    /// Replace one collection with a JSON value
    Set {
        collection: String,

        /// JSON document
        value: String,
    },

    /// Write every collection now and record the outcome
    HardSave,

    /// Take a manual snapshot
    Seal,

    /// List vault items, newest first
    Vault {
        /// Maximum number of items to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Show hard-save history
    Metrics,

    /// Read or replace the seal image
    SealImage {
        /// Store this file as the new seal image
        #[arg(long, conflicts_with = "export")]
        import: Option<PathBuf>,

        /// Write the current seal image to this file
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    observability::init_tracing();
    let cli = Cli::parse();

    match run_command(cli).await {
        Ok(()) => process::exit(0),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let _ = dotenvy::dotenv();
            EngineConfig::load_from(path)?.with_overrides(|name| std::env::var(name).ok())
        }
        None => EngineConfig::load()?,
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = Some(dir.clone());
    }
    Ok(config)
}

async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let engine = SyncEngine::open(config);
    engine.start().await;

    let result = dispatch(&engine, cli.command, cli.format).await;
    engine.shutdown().await;
    result
}

async fn dispatch(engine: &SyncEngine, command: Commands, format: OutputFormat) -> anyhow::Result<()> {
    match command {
        Commands::Status => {
            let status = engine.status();
            match format {
                OutputFormat::Json => print_json(&status)?,
                OutputFormat::Text => {
                    println!("Vaultkeep Status");
                    println!("================");
                    println!("Backend: {}", status.backend);
                    if status.degraded {
                        println!("Degraded: running in memory only");
                    }
                    println!("Revision: {}", status.revision);
                    println!("Guest mode: {}", status.guest_mode);
                    println!("Vault items: {}", status.vault_items);
                    match &status.last_hard_save {
                        Some(m) => println!(
                            "Last hard save: {} ({}, {}ms)",
                            m.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            if m.success { "ok" } else { "failed" },
                            m.duration_ms
                        ),
                        None => println!("Last hard save: never"),
                    }
                }
            }
        }

        Commands::Get { collection } => {
            let key: CollectionKey = collection.parse()?;
            let value = engine.collection(key);
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string(&value)?),
                OutputFormat::Text => println!("{}", serde_json::to_string_pretty(&value)?),
            }
        }

        Commands::Set { collection, value } => {
            let key: CollectionKey = collection.parse()?;
            let value: serde_json::Value =
                serde_json::from_str(&value).context("Value is not valid JSON")?;
            let revision = engine.on_mutate(key, move |current| *current = value);
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "collection": key,
                    "revision": revision,
                }))?,
                OutputFormat::Text => println!("Updated {} (revision {})", key, revision),
            }
        }

        Commands::HardSave => {
            let outcome = engine.hard_save().await;
            match format {
                OutputFormat::Json => print_json(&outcome)?,
                OutputFormat::Text => {
                    if outcome.success {
                        println!("Hard save completed in {}ms", outcome.duration_ms);
                    } else {
                        println!("Hard save failed after {}ms", outcome.duration_ms);
                        for key in &outcome.failed_collections {
                            println!("  - {}", key);
                        }
                    }
                }
            }
            if !outcome.success {
                bail!(outcome
                    .error_message
                    .unwrap_or_else(|| "hard save failed".to_string()));
            }
        }

        Commands::Seal => {
            let item = engine.seal().await;
            match format {
                OutputFormat::Json => print_json(&item)?,
                OutputFormat::Text => println!("Sealed {} ({})", item.id, item.label),
            }
        }

        Commands::Vault { limit } => {
            let items: Vec<_> = engine.vault_items().into_iter().take(limit).collect();
            match format {
                OutputFormat::Json => print_json(&items)?,
                OutputFormat::Text => {
                    if items.is_empty() {
                        println!("Vault is empty");
                    }
                    for item in &items {
                        println!(
                            "{}  {}  {}  rev {}",
                            item.created_at.format("%Y-%m-%d %H:%M"),
                            if item.is_automatic { "auto  " } else { "manual" },
                            item.id,
                            item.revision
                        );
                    }
                }
            }
        }

        Commands::Metrics => {
            let metrics = engine.build_metrics();
            match format {
                OutputFormat::Json => print_json(&metrics)?,
                OutputFormat::Text => {
                    if metrics.is_empty() {
                        println!("No hard saves recorded");
                    }
                    for m in metrics.iter().rev() {
                        println!(
                            "{}  {:<6}  {:>6}ms  {}",
                            m.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            if m.success { "ok" } else { "failed" },
                            m.duration_ms,
                            m.error_message.as_deref().unwrap_or("")
                        );
                    }
                }
            }
        }

        Commands::SealImage { import, export } => {
            let report = if let Some(path) = import {
                let image = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let bytes = image.len();
                if !engine.set_seal_image(Bytes::from(image)).await {
                    bail!("Seal image could not be stored");
                }
                SealImageReport {
                    present: true,
                    bytes,
                    source: Some(path),
                    written_to: None,
                }
            } else {
                match (export, engine.seal_image().await) {
                    (Some(path), Some(image)) => {
                        tokio::fs::write(&path, &image)
                            .await
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                        SealImageReport {
                            present: true,
                            bytes: image.len(),
                            source: None,
                            written_to: Some(path),
                        }
                    }
                    (_, image) => SealImageReport {
                        present: image.is_some(),
                        bytes: image.map_or(0, |i| i.len()),
                        source: None,
                        written_to: None,
                    },
                }
            };

            match format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Text => println!("{}", report.text()),
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Result of the seal-image subcommand
#[derive(Debug, Serialize)]
struct SealImageReport {
    present: bool,
    bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    written_to: Option<PathBuf>,
}

impl SealImageReport {
    fn text(&self) -> String {
        match (&self.source, &self.written_to) {
            (Some(source), _) => format!("Seal image updated from {}", source.display()),
            (None, Some(dest)) => format!("Wrote {} bytes to {}", self.bytes, dest.display()),
            (None, None) if self.present => format!("Seal image: {} bytes", self.bytes),
            (None, None) => "No seal image stored".to_string(),
        }
    }
}
