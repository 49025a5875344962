// Calibration error types and constants

use std::fmt;

use log::error;

use crate::error::ErrorCode;

/// Calibration error code constants
///
/// These constants provide a single source of truth for the codes surfaced
/// in command replies, so operators can script against them.
///
/// Error code range: 2001-2005
pub struct CalibrationErrorCodes {}

impl CalibrationErrorCodes {
    /// Calibration session is not active
    pub const NOT_ACTIVE: i32 = 2001;

    /// Unknown calibration phase name
    pub const UNKNOWN_PHASE: i32 = 2002;

    /// Parameter is not owned by the active phase
    pub const OUT_OF_SCOPE_PARAMETER: i32 = 2003;

    /// Parameter value failed to parse or is out of range
    pub const INVALID_VALUE: i32 = 2004;

    /// Override would produce an inconsistent configuration
    pub const CONFIGURATION: i32 = 2005;
}

/// Log a calibration error with structured context
///
/// Calibration errors are operator mistakes, not faults: they are logged and
/// echoed back in the command reply with no state change.
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=CalibrationManager, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Calibration-related errors
///
/// These cover the calibration session state machine: start/stop lifecycle,
/// phase-scoped parameter overrides, and value parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Operation requires an active session
    NotActive,

    /// Phase name is not phase1 or phase2
    UnknownPhase { given: String },

    /// Parameter is legal, but not in the active phase's allowed set
    OutOfScopeParameter {
        param: String,
        phase: String,
        allowed: String,
    },

    /// Parameter name unknown or value malformed/out of range
    InvalidValue { param: String, reason: String },

    /// Applying the override would make the effective configuration invalid
    Configuration { reason: String },
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::NotActive => CalibrationErrorCodes::NOT_ACTIVE,
            CalibrationError::UnknownPhase { .. } => CalibrationErrorCodes::UNKNOWN_PHASE,
            CalibrationError::OutOfScopeParameter { .. } => {
                CalibrationErrorCodes::OUT_OF_SCOPE_PARAMETER
            }
            CalibrationError::InvalidValue { .. } => CalibrationErrorCodes::INVALID_VALUE,
            CalibrationError::Configuration { .. } => CalibrationErrorCodes::CONFIGURATION,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::NotActive => {
                "calibration is not active. Use /cal_start phase1|phase2 [interval_sec]".to_string()
            }
            CalibrationError::UnknownPhase { given } => {
                format!("phase must be phase1 or phase2, got '{}'", given)
            }
            CalibrationError::OutOfScopeParameter {
                param,
                phase,
                allowed,
            } => {
                format!(
                    "parameter {} not allowed for {}. allowed: {}",
                    param, phase, allowed
                )
            }
            CalibrationError::InvalidValue { param, reason } => {
                format!("invalid value for {}: {}", param, reason)
            }
            CalibrationError::Configuration { reason } => {
                format!("override rejected: {}", reason)
            }
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for CalibrationError {}
