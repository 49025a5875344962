//! Calibration session metadata.
//!
//! A session scopes which parameters may be live-tuned: phase1 covers the
//! primary-stage and persistence knobs, phase2 covers the verifier and
//! suppression knobs. At most one session exists per deployment; starting a
//! new one replaces the old.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;
use crate::params::ParamKey;

/// Default snapshot streaming interval while calibrating
pub const DEFAULT_CALIBRATION_INTERVAL_SECONDS: u64 = 15;

/// Bounds for the streaming interval
const MIN_INTERVAL_SECONDS: u64 = 2;
const MAX_INTERVAL_SECONDS: u64 = 600;

/// Clamp a requested interval into the supported range, defaulting when absent
pub fn clamp_interval(requested: Option<u64>) -> u64 {
    requested
        .unwrap_or(DEFAULT_CALIBRATION_INTERVAL_SECONDS)
        .clamp(MIN_INTERVAL_SECONDS, MAX_INTERVAL_SECONDS)
}

/// Calibration phase: a scoped subset of tunable parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Phase1,
    Phase2,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Phase1 => "phase1",
            Phase::Phase2 => "phase2",
        }
    }

    /// The parameters this phase is allowed to override
    pub fn allowed_keys(&self) -> &'static [ParamKey] {
        match self {
            Phase::Phase1 => &[
                ParamKey::PrimaryCryThreshold,
                ParamKey::ConfirmN,
                ParamKey::ConfirmM,
                ParamKey::AlertCooldownSeconds,
            ],
            Phase::Phase2 => &[
                ParamKey::CryThreshold,
                ParamKey::CatThreshold,
                ParamKey::CatWeight,
                ParamKey::MarginThreshold,
            ],
        }
    }

    pub fn owns(&self, key: ParamKey) -> bool {
        self.allowed_keys().contains(&key)
    }

    /// Sorted canonical names, for error messages and help text
    pub fn allowed_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> =
            self.allowed_keys().iter().map(|key| key.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl FromStr for Phase {
    type Err = CalibrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "phase1" => Ok(Phase::Phase1),
            "phase2" => Ok(Phase::Phase2),
            other => Err(CalibrationError::UnknownPhase {
                given: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One live calibration session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSession {
    pub phase: Phase,
    pub started_at_ms: u64,
    pub interval_sec: u64,
    pub watch_active: bool,
}

impl CalibrationSession {
    pub fn new(phase: Phase, interval: Option<u64>, now_ms: u64) -> Self {
        Self {
            phase,
            started_at_ms: now_ms,
            interval_sec: clamp_interval(interval),
            watch_active: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_interval_bounds() {
        assert_eq!(clamp_interval(None), DEFAULT_CALIBRATION_INTERVAL_SECONDS);
        assert_eq!(clamp_interval(Some(1)), 2);
        assert_eq!(clamp_interval(Some(30)), 30);
        assert_eq!(clamp_interval(Some(10_000)), 600);
    }

    #[test]
    fn test_phase_parsing() {
        assert_eq!("phase1".parse::<Phase>().unwrap(), Phase::Phase1);
        assert_eq!(" PHASE2 ".parse::<Phase>().unwrap(), Phase::Phase2);
        assert!(matches!(
            "phase3".parse::<Phase>(),
            Err(CalibrationError::UnknownPhase { .. })
        ));
    }

    #[test]
    fn test_phase_ownership_is_disjoint() {
        for key in Phase::Phase1.allowed_keys() {
            assert!(!Phase::Phase2.owns(*key), "{} owned by both phases", key);
        }
        assert!(Phase::Phase1.owns(ParamKey::ConfirmN));
        assert!(Phase::Phase2.owns(ParamKey::MarginThreshold));
        assert!(!Phase::Phase1.owns(ParamKey::CryThreshold));
        // NON_CRY_WEIGHT is deliberately not tunable from either phase.
        assert!(!Phase::Phase1.owns(ParamKey::NonCryWeight));
        assert!(!Phase::Phase2.owns(ParamKey::NonCryWeight));
    }

    #[test]
    fn test_session_serde_round_trip() {
        let session = CalibrationSession::new(Phase::Phase2, Some(20), 1_000);
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"phase2\""));
        let back: CalibrationSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back, session);
    }
}
