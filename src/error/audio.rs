// Audio error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Audio error code constants
///
/// Single source of truth for the numeric codes reported by the shot
/// detector to its collaborators.
///
/// Error code range: 1001-1004
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    /// Microphone could not be acquired or was lost while listening
    pub const MICROPHONE_UNAVAILABLE: i32 = 1001;

    /// Detector is already listening
    pub const ALREADY_LISTENING: i32 = 1002;

    /// Mutex/RwLock was poisoned
    pub const LOCK_POISONED: i32 = 1003;

    /// Detector or sampling configuration is out of range
    pub const INVALID_CONFIG: i32 = 1004;
}

/// Log an audio error with structured context
///
/// This function logs audio errors with structured fields including:
/// - error_code: Numeric error code for programmatic handling
/// - component: The component where the error occurred
/// - message: Human-readable error message
/// - context: Additional contextual information
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=ShotDetector, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio-related errors
///
/// Permission denial, a missing input device, an unsupported sample format
/// and a stream that dies while listening all surface as
/// `MicrophoneUnavailable`; `reason` keeps the platform detail for logs.
///
/// Error code ranges: 1001-1004
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Audio input could not be acquired or maintained
    MicrophoneUnavailable { reason: String },

    /// Detector is already listening
    AlreadyListening,

    /// Mutex/RwLock was poisoned
    LockPoisoned { component: String },

    /// Configuration value out of range
    InvalidConfig { reason: String },
}

impl AudioError {
    pub fn microphone_unavailable(reason: impl Into<String>) -> Self {
        AudioError::MicrophoneUnavailable {
            reason: reason.into(),
        }
    }
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::MicrophoneUnavailable { .. } => AudioErrorCodes::MICROPHONE_UNAVAILABLE,
            AudioError::AlreadyListening => AudioErrorCodes::ALREADY_LISTENING,
            AudioError::LockPoisoned { .. } => AudioErrorCodes::LOCK_POISONED,
            AudioError::InvalidConfig { .. } => AudioErrorCodes::INVALID_CONFIG,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::MicrophoneUnavailable { reason } => {
                format!("Microphone unavailable: {}", reason)
            }
            AudioError::AlreadyListening => {
                "Shot detector already listening. Call stop() first.".to_string()
            }
            AudioError::LockPoisoned { component } => {
                format!("Lock poisoned on {}", component)
            }
            AudioError::InvalidConfig { reason } => {
                format!("Invalid detector configuration: {}", reason)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::MicrophoneUnavailable {
            reason: err.to_string(),
        }
    }
}
