// State channel error types and constants

use std::fmt;

use log::warn;

use crate::error::ErrorCode;

/// State channel error code constants
///
/// Error code range: 3001
pub struct ChannelErrorCodes {}

impl ChannelErrorCodes {
    /// Snapshot read or write failed
    pub const UNAVAILABLE: i32 = 3001;
}

/// Log a channel error with structured context
///
/// Channel failures are expected under the eventual-consistency contract
/// (torn reads, transient filesystem errors), so they log at warn level.
/// Callers keep their last known state and retry on the next window.
pub fn log_channel_error(err: &ChannelError, context: &str) {
    warn!(
        "State channel error in {}: code={}, component=StateChannel, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// State channel errors
///
/// Every failure mode (missing directory, torn snapshot, serialization
/// fault) degrades to the same caller behavior of "unknown, retry", so one
/// variant covers them all.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelError {
    /// Snapshot read/write failed; state is unknown until the next attempt
    Unavailable { reason: String },
}

impl ErrorCode for ChannelError {
    fn code(&self) -> i32 {
        match self {
            ChannelError::Unavailable { .. } => ChannelErrorCodes::UNAVAILABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            ChannelError::Unavailable { reason } => {
                format!("state channel unavailable: {}", reason)
            }
        }
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for ChannelError {}
