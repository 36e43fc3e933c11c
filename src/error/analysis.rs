// Group metrics error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Metrics error code constants
///
/// Error code range: 3001-3002
pub struct MetricsErrorCodes {}

impl MetricsErrorCodes {
    /// Metrics requested for an empty shot set
    pub const INSUFFICIENT_SHOTS: i32 = 3001;

    /// Target distance missing, non-finite or not positive
    pub const INVALID_DISTANCE: i32 = 3002;
}

/// Log a metrics error with structured context
pub fn log_metrics_error(err: &MetricsError, context: &str) {
    error!(
        "Metrics error in {}: code={}, component=GroupMetricsCalculator, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Group metrics errors
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsError {
    /// No shots to measure
    InsufficientShots,

    /// Distance must be a finite value greater than zero
    InvalidDistance { distance_yards: f64 },
}

impl ErrorCode for MetricsError {
    fn code(&self) -> i32 {
        match self {
            MetricsError::InsufficientShots => MetricsErrorCodes::INSUFFICIENT_SHOTS,
            MetricsError::InvalidDistance { .. } => MetricsErrorCodes::INVALID_DISTANCE,
        }
    }

    fn message(&self) -> String {
        match self {
            MetricsError::InsufficientShots => {
                "At least one shot is required to compute group metrics".to_string()
            }
            MetricsError::InvalidDistance { distance_yards } => {
                format!(
                    "Target distance must be greater than 0 yards (got {})",
                    distance_yards
                )
            }
        }
    }
}

impl fmt::Display for MetricsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MetricsError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for MetricsError {}
