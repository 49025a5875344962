//! Monitor configuration.
//!
//! Defaults live in code; every knob can be overridden through an
//! environment variable of the same name. A variable that fails to parse is
//! logged and the default kept, so one bad value never takes the monitor
//! down. The exception is an inconsistent persistence pair
//! (`CONFIRM_N > CONFIRM_M`), which is a hard configuration error at load.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GatingError;
use crate::params::EffectiveParams;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Base gating parameters; live calibration layers overrides on top
    pub params: EffectiveParams,
    pub sample_rate: u32,
    pub window_seconds: f64,
    /// Length of the rolling buffer behind trigger clips
    pub event_clip_seconds: u64,
    /// Trailing margin windows required for the sustained-dominance override
    pub margin_sustain_windows: usize,
    pub artifact_dir: PathBuf,
    pub api_addr: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            params: EffectiveParams::default(),
            sample_rate: 16_000,
            window_seconds: 0.96,
            event_clip_seconds: 8,
            margin_sustain_windows: 3,
            artifact_dir: PathBuf::from("artifacts"),
            api_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

impl MonitorConfig {
    /// Defaults overridden by environment, then validated
    pub fn from_env() -> Result<Self, GatingError> {
        let mut config = Self::default();

        let p = &mut config.params;
        p.primary_cry_threshold = parse_env("PRIMARY_CRY_THRESHOLD", p.primary_cry_threshold);
        p.cry_threshold = parse_env("CRY_THRESHOLD", p.cry_threshold);
        p.cat_threshold = parse_env("CAT_THRESHOLD", p.cat_threshold);
        p.cat_weight = parse_env("CAT_WEIGHT", p.cat_weight);
        p.non_cry_weight = parse_env("NON_CRY_WEIGHT", p.non_cry_weight);
        p.margin_threshold = parse_env("MARGIN_THRESHOLD", p.margin_threshold);
        p.confirm_n = parse_env("CONFIRM_N", p.confirm_n);
        p.confirm_m = parse_env("CONFIRM_M", p.confirm_m);
        p.alert_cooldown_seconds = parse_env("ALERT_COOLDOWN_SECONDS", p.alert_cooldown_seconds);

        config.sample_rate = parse_env("SAMPLE_RATE", config.sample_rate);
        config.window_seconds = parse_env("WINDOW_SECONDS", config.window_seconds);
        config.event_clip_seconds = parse_env("EVENT_CLIP_SECONDS", config.event_clip_seconds);
        config.margin_sustain_windows =
            parse_env("MARGIN_SUSTAIN_WINDOWS", config.margin_sustain_windows);
        if let Ok(dir) = env::var("ARTIFACT_DIR") {
            let dir = dir.trim();
            if !dir.is_empty() {
                config.artifact_dir = PathBuf::from(dir);
            }
        }
        if let Ok(addr) = env::var("API_ADDR") {
            let addr = addr.trim();
            if !addr.is_empty() {
                config.api_addr = addr.to_string();
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), GatingError> {
        self.params.validate()?;
        if self.sample_rate == 0 {
            return Err(GatingError::Configuration {
                reason: "SAMPLE_RATE must be positive".to_string(),
            });
        }
        if !self.window_seconds.is_finite() || self.window_seconds <= 0.0 {
            return Err(GatingError::Configuration {
                reason: format!("WINDOW_SECONDS must be positive, got {}", self.window_seconds),
            });
        }
        if self.margin_sustain_windows == 0 {
            return Err(GatingError::Configuration {
                reason: "MARGIN_SUSTAIN_WINDOWS must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Read an environment override, keeping the default on absence or parse
/// failure (with a warning, so a typo is visible in the logs).
fn parse_env<T: FromStr + Copy + std::fmt::Display>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                log::warn!(
                    "[Config] Failed to parse {}={:?}. Using default {}.",
                    name,
                    raw,
                    default
                );
                default
            }
        },
        Err(_) => default,
    }
}
