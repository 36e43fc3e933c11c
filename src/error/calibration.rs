// Calibration error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Calibration error code constants
///
/// Error code range: 2001-2004
pub struct CalibrationErrorCodes {}

impl CalibrationErrorCodes {
    /// Reference geometry is degenerate or the physical length is not positive
    pub const INVALID_CALIBRATION: i32 = 2001;

    /// Shots were marked before a scale was established
    pub const NOT_CALIBRATED: i32 = 2002;

    /// Shots were marked before the point of aim was placed
    pub const POINT_OF_AIM_MISSING: i32 = 2003;

    /// Capture session was already finished
    pub const CAPTURE_FINISHED: i32 = 2004;
}

/// Log a calibration error with structured context
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=CalibrationTransform, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Calibration and capture-workflow errors
///
/// Error code ranges: 2001-2004
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Degenerate reference points or non-positive physical length
    InvalidCalibration { reason: String },

    /// No scale factor established yet
    NotCalibrated,

    /// No point of aim placed yet
    PointOfAimMissing,

    /// Capture session no longer accepts edits
    CaptureFinished,
}

impl CalibrationError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        CalibrationError::InvalidCalibration {
            reason: reason.into(),
        }
    }
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::InvalidCalibration { .. } => {
                CalibrationErrorCodes::INVALID_CALIBRATION
            }
            CalibrationError::NotCalibrated => CalibrationErrorCodes::NOT_CALIBRATED,
            CalibrationError::PointOfAimMissing => CalibrationErrorCodes::POINT_OF_AIM_MISSING,
            CalibrationError::CaptureFinished => CalibrationErrorCodes::CAPTURE_FINISHED,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::InvalidCalibration { reason } => {
                format!("Invalid calibration: {}", reason)
            }
            CalibrationError::NotCalibrated => {
                "Target not calibrated. Place the reference markers first.".to_string()
            }
            CalibrationError::PointOfAimMissing => {
                "Point of aim not set. Mark the aim point before marking shots.".to_string()
            }
            CalibrationError::CaptureFinished => "Capture already finished".to_string(),
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_error_codes() {
        assert_eq!(CalibrationError::invalid("x").code(), 2001);
        assert_eq!(CalibrationError::NotCalibrated.code(), 2002);
        assert_eq!(CalibrationError::PointOfAimMissing.code(), 2003);
        assert_eq!(CalibrationError::CaptureFinished.code(), 2004);
    }

    #[test]
    fn test_calibration_error_display() {
        let err = CalibrationError::invalid("reference points coincide");
        let display = format!("{}", err);
        assert!(display.contains("CalibrationError"));
        assert!(display.contains("2001"));
        assert!(display.contains("reference points coincide"));
    }
}
