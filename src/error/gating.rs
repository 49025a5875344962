// Gating error types and constants

use std::fmt;

use log::error;

use crate::error::ErrorCode;

/// Gating error code constants
///
/// Error code range: 1101-1102
pub struct GatingErrorCodes {}

impl GatingErrorCodes {
    /// Malformed or out-of-range score set
    pub const VALIDATION: i32 = 1101;

    /// Inconsistent gating configuration (e.g. CONFIRM_N > CONFIRM_M)
    pub const CONFIGURATION: i32 = 1102;
}

/// Log a gating error with structured context
///
/// Logging is non-blocking and never panics. The window loop treats every
/// gating error as "no event", so an error here is diagnostic only.
pub fn log_gating_error(err: &GatingError, context: &str) {
    error!(
        "Gating error in {}: code={}, component=GatingEngine, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Gating-related errors
///
/// These cover per-window score validation and threshold configuration.
/// Neither variant is fatal to the window loop: validation failures degrade
/// to a `None` outcome and configuration failures keep the prior valid
/// parameter set.
#[derive(Debug, Clone, PartialEq)]
pub enum GatingError {
    /// Malformed score set (non-finite value or class score outside [0,1])
    Validation { reason: String },

    /// Inconsistent threshold configuration
    Configuration { reason: String },
}

impl ErrorCode for GatingError {
    fn code(&self) -> i32 {
        match self {
            GatingError::Validation { .. } => GatingErrorCodes::VALIDATION,
            GatingError::Configuration { .. } => GatingErrorCodes::CONFIGURATION,
        }
    }

    fn message(&self) -> String {
        match self {
            GatingError::Validation { reason } => format!("Invalid score set: {}", reason),
            GatingError::Configuration { reason } => {
                format!("Invalid gating configuration: {}", reason)
            }
        }
    }
}

impl fmt::Display for GatingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for GatingError {}
