//! Cry monitor decision core.
//!
//! Classifies short audio windows into baby-cry events: score fusion,
//! N-of-M persistence, cat-dominance suppression, cooldown, and a live
//! calibration layer shared between the audio-processing loop and the
//! command/API process through a file-based state channel.

pub mod calibration;
pub mod channel;
pub mod collaborators;
pub mod commands;
pub mod config;
pub mod error;
pub mod gating;
pub mod http;
pub mod params;
pub mod service;
pub mod watch;

use tracing_subscriber::EnvFilter;

/// Install the tracing subscriber for a binary
///
/// Filter comes from `RUST_LOG`, defaulting to `info`. Safe to call once per
/// process; a second call is ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
