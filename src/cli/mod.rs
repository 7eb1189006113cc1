//! Command-line interface for visionary.
//!
//! Provides commands for running the brief-to-video pipeline, managing
//! the stored API key, and inspecting the resolved configuration.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use crate::adapters::GeminiClient;
use crate::config::{self, ResolvedConfig};
use crate::core::{Orchestrator, RejectReason, Stages, SubmitOutcome};
use crate::credentials::{CredentialProvider, CredentialStore, API_KEY_ENV_VARS};
use crate::domain::{LogEntry, RunSnapshot, RunState, Severity};

/// visionary - Brief-to-video creative pipeline
#[derive(Parser, Debug)]
#[command(name = "visionary")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Turn a brief into a plan, an image and a video
    Run {
        /// Creative brief (read from --input or stdin if omitted)
        brief: Option<String>,

        /// Read the brief from a file
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Also write the generated image to this path
        #[arg(long)]
        save_image: Option<PathBuf>,
    },

    /// Manage the stored API key
    Key {
        #[command(subcommand)]
        command: KeyCommands,
    },

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Subcommand, Debug)]
pub enum KeyCommands {
    /// Store an API key
    Set {
        /// The key to store
        key: String,
    },

    /// Remove the stored key
    Clear,

    /// Report whether a key is available
    Status,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Run {
                brief,
                input,
                save_image,
            } => run_brief(brief, input, save_image).await,
            Commands::Key { command } => execute_key(command),
            Commands::Config => show_config(),
        }
    }
}

fn credential_store(cfg: &ResolvedConfig) -> CredentialStore {
    CredentialStore::new(cfg.credential_path())
}

/// Run the pipeline for one brief
async fn run_brief(
    brief: Option<String>,
    input_file: Option<PathBuf>,
    save_image: Option<PathBuf>,
) -> Result<()> {
    let brief = read_brief(brief, input_file)?;

    let cfg = config::config()?;
    let credentials = Arc::new(credential_store(cfg));
    let client = GeminiClient::new(cfg, credentials.clone());
    let orchestrator = Orchestrator::new(Stages::gemini(client, cfg.video.poll_policy()));

    let printer = tokio::spawn(stream_log(orchestrator.subscribe()));
    let outcome = orchestrator.submit(&brief).await;

    // closing the channel ends the printer once it has drained
    drop(orchestrator);
    printer.await.context("Log printer stopped unexpectedly")?;

    let snapshot = match outcome {
        SubmitOutcome::Finished(snapshot) => snapshot,
        SubmitOutcome::Rejected(RejectReason::EmptyBrief) => anyhow::bail!("Brief is empty"),
        SubmitOutcome::Rejected(RejectReason::RunInFlight(state)) => {
            anyhow::bail!("A run is already in progress ({})", state)
        }
    };

    print_summary(&snapshot);

    if let (Some(path), Some(image)) = (save_image, snapshot.artifacts.image()) {
        std::fs::write(&path, &image.bytes)
            .with_context(|| format!("Failed to write image: {}", path.display()))?;
        eprintln!("   Image saved: {}", path.display());
    }

    if snapshot.state == RunState::Failed {
        eprintln!(
            "\n[Run failed: {}]",
            snapshot.failure.as_deref().unwrap_or("unknown error")
        );
        if credentials.api_key().is_none() {
            eprintln!("   No API key found. Use 'visionary key set <KEY>' or set GEMINI_API_KEY.");
        }
        std::process::exit(1);
    }

    Ok(())
}

/// Brief from the argument, a file, or piped stdin
fn read_brief(brief: Option<String>, input_file: Option<PathBuf>) -> Result<String> {
    let brief = if let Some(brief) = brief {
        brief
    } else if let Some(path) = input_file {
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    } else {
        anyhow::bail!("No brief provided. Pass it as an argument, use --input <file> or pipe to stdin");
    };

    if brief.trim().is_empty() {
        anyhow::bail!("Brief is empty");
    }
    Ok(brief)
}

/// Print run-log entries as they are appended
async fn stream_log(mut rx: watch::Receiver<RunSnapshot>) {
    let mut printed = 0;
    loop {
        let fresh: Vec<LogEntry> = rx.borrow_and_update().log.since(printed).to_vec();
        printed += fresh.len();
        for entry in &fresh {
            print_entry(entry);
        }

        if rx.changed().await.is_err() {
            break;
        }
    }

    // final value may have landed together with the close
    for entry in rx.borrow().log.since(printed) {
        print_entry(entry);
    }
}

fn print_entry(entry: &LogEntry) {
    let marker = match entry.severity {
        Severity::Info => " ",
        Severity::Warning => "!",
        Severity::Error => "x",
    };
    println!(
        "{} {} {:<10} {}",
        entry.timestamp.format("%H:%M:%S"),
        marker,
        entry.source.to_string(),
        entry.message
    );
    if let Some(details) = &entry.details {
        println!("{:>22}{}", "", details);
    }
}

fn print_summary(snapshot: &RunSnapshot) {
    let Some(plan) = &snapshot.plan else {
        return;
    };

    println!();
    println!("Production plan:");
    println!("  Strategy: {}", plan.reasoning);
    println!("  Visual:   {}", plan.visual_prompt);
    println!("  Motion:   {}", plan.motion_prompt);

    if let Some(image) = snapshot.artifacts.image() {
        println!("  Image:    {} bytes ({})", image.len(), image.mime_type);
    }
    if let Some(locator) = snapshot.artifacts.video_reference() {
        println!("  Video:    {}", locator);
    }
    if let Some(video) = snapshot.artifacts.playable_video() {
        println!(
            "  Playback: {} ({} bytes)",
            video.path.display(),
            video.size_bytes
        );
    }
}

/// Execute key subcommands
fn execute_key(command: KeyCommands) -> Result<()> {
    let cfg = config::config()?;
    let store = credential_store(cfg);

    match command {
        KeyCommands::Set { key } => {
            store.save(&key)?;
            eprintln!("API key saved to {}", store.path().display());
        }
        KeyCommands::Clear => {
            store.clear()?;
            eprintln!("Stored API key removed");
        }
        KeyCommands::Status => {
            if store.is_stored() {
                println!("API key: stored ({})", store.path().display());
            } else if store.is_configured() {
                println!("API key: from environment");
            } else {
                println!("API key: not configured");
                println!(
                    "  Use 'visionary key set <KEY>' or set one of: {}",
                    API_KEY_ENV_VARS.join(", ")
                );
            }
        }
    }
    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;
    let store = credential_store(cfg);

    println!("Visionary Configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:       {}", cfg.home.display());
    println!("  Videos:     {}", cfg.videos_dir().display());
    println!("  Credential: {}", store.path().display());
    println!();
    println!("API base: {}", cfg.api_base_url);
    println!(
        "API key:  {}",
        if store.is_configured() { "configured" } else { "missing" }
    );
    println!();
    println!("Models:");
    println!("  Planner: {}", cfg.models.planner);
    println!("  Image:   {}", cfg.models.image);
    println!("  Video:   {}", cfg.models.video);
    println!();
    println!("Image: {} ({})", cfg.image.aspect_ratio, cfg.image.mime_type);
    println!("Video: {}", cfg.video.aspect_ratio);
    println!("  Poll interval: {}s", cfg.video.poll_interval_seconds);
    println!(
        "  Max polls:     {}",
        cfg.video
            .max_poll_attempts
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
    );
    println!(
        "  Timeout:       {}",
        cfg.video
            .timeout_seconds
            .map_or_else(|| "none".to_string(), |s| format!("{}s", s))
    );
    Ok(())
}
