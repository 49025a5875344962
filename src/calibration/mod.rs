//! Live calibration: session metadata and the manager state machine.

pub mod manager;
pub mod session;

pub use manager::{CalibrationManager, CalibrationSnapshot};
pub use session::{
    clamp_interval, CalibrationSession, Phase, DEFAULT_CALIBRATION_INTERVAL_SECONDS,
};
