use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use cry_monitor::calibration::CalibrationManager;
use cry_monitor::channel::StateChannel;
use cry_monitor::config::MonitorConfig;
use cry_monitor::http::{run_http_server, ApiState};
use cry_monitor::watch::WatchRegistry;

#[derive(Parser, Debug)]
#[command(
    name = "cry-monitor-api",
    about = "Command process: calibration API over the shared state channel"
)]
struct Cli {
    /// Listen address, overrides API_ADDR
    #[arg(long)]
    addr: Option<String>,
}

fn main() -> ExitCode {
    cry_monitor::init_logging();
    match run() {
        Ok(()) => ExitCode::from(0),
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = MonitorConfig::from_env().context("loading configuration")?;
    let addr: SocketAddr = cli
        .addr
        .unwrap_or_else(|| config.api_addr.clone())
        .parse()
        .context("parsing listen address")?;

    let channel = Arc::new(StateChannel::new(&config.artifact_dir));

    // A restart resumes any active session left behind in the control file.
    let manager = match channel.read_control() {
        Ok(Some(control)) => CalibrationManager::restore(config.params.clone(), &control)?,
        Ok(None) => CalibrationManager::new(config.params.clone())?,
        Err(err) => {
            log::warn!("control snapshot unreadable at startup: {}", err);
            CalibrationManager::new(config.params.clone())?
        }
    };

    let watches = Arc::new(WatchRegistry::new());
    let state = ApiState::new(Arc::new(Mutex::new(manager)), channel, Arc::clone(&watches));

    log::info!("calibration API listening on {}", addr);
    tokio::select! {
        result = run_http_server(state, addr) => result?,
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutdown requested");
            watches.stop_all().await;
        }
    }
    Ok(())
}
