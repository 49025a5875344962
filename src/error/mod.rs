// Error types for the cry monitor
//
// This module defines custom error types for gating, calibration, and state
// channel operations, providing structured error handling with numeric codes
// suitable for operator-facing command replies.

mod calibration;
mod channel;
mod gating;

pub use calibration::{log_calibration_error, CalibrationError, CalibrationErrorCodes};
pub use channel::{log_channel_error, ChannelError, ChannelErrorCodes};
pub use gating::{log_gating_error, GatingError, GatingErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling in command
/// replies and logs.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
