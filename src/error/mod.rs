// Error types for the range trainer core
//
// This module defines custom error types for target calibration, group
// metrics and the audio shot detector, with stable numeric error codes so
// the surrounding application can branch on them without string matching.

mod analysis;
mod audio;
mod calibration;

pub use analysis::{log_metrics_error, MetricsError, MetricsErrorCodes};
pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use calibration::{log_calibration_error, CalibrationError, CalibrationErrorCodes};

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the collaborator boundary.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}
