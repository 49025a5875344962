use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cry_monitor::channel::StateChannel;
use cry_monitor::collaborators::{
    JsonArtifactStore, JsonlScoreSource, LogNotifier, ReplayScoreSource, WindowSource,
};
use cry_monitor::config::MonitorConfig;
use cry_monitor::service::MonitorService;

#[derive(Parser, Debug)]
#[command(
    name = "cry-monitor",
    about = "Audio-process loop: gates scored windows into cry events"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the window loop over a JSONL score replay file
    Start {
        /// File with one score set per line
        #[arg(long)]
        scores: PathBuf,
        /// Stop after this many windows
        #[arg(long)]
        max_windows: Option<u64>,
        /// Score a single window and print the outcome
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Print readiness and the effective configuration
    Status,
}

fn main() -> ExitCode {
    cry_monitor::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = MonitorConfig::from_env().context("loading configuration")?;

    match cli.command {
        Commands::Start {
            scores,
            max_windows,
            dry_run,
        } => run_loop(config, scores, max_windows, dry_run),
        Commands::Status => {
            println!("monitor_ready");
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::from(0))
        }
    }
}

fn run_loop(
    config: MonitorConfig,
    scores: PathBuf,
    max_windows: Option<u64>,
    dry_run: bool,
) -> Result<ExitCode> {
    let channel = StateChannel::new(&config.artifact_dir);
    let artifacts = JsonArtifactStore::new(&config.artifact_dir);
    let mut windows = JsonlScoreSource::open(&scores)?;
    let scorer = ReplayScoreSource::open(&scores)?;

    let limit = if dry_run { Some(1) } else { max_windows };
    let mut service = MonitorService::new(config, channel, scorer, LogNotifier, artifacts)?;

    let mut processed: u64 = 0;
    while let Some(window) = windows.next_window()? {
        let report = service.process_window(&window)?;
        if dry_run {
            println!("{}", serde_json::to_string_pretty(&report.outcome)?);
        }
        processed += 1;
        if let Some(limit) = limit {
            if processed >= limit {
                break;
            }
        }
    }

    log::info!("processed {} window(s)", processed);
    Ok(ExitCode::from(0))
}
