//! Configuration management for the range trainer core
//!
//! This module provides runtime configuration loading from JSON files so
//! detector sensitivity, debounce and sampling cadence can be tuned without
//! recompilation. Missing or malformed files fall back to defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::AudioError;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub detection: AudioDetectionConfig,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

/// Shot detector settings supplied by the settings collaborator
///
/// Mutable at any time; a running detector picks up changes on its next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDetectionConfig {
    /// Whether audio shot detection is enabled at all
    pub enabled: bool,
    /// 0 (needs 10x baseline) to 100 (needs 1.5x baseline)
    pub sensitivity: u32,
    /// Minimum time between two accepted detections
    pub min_delay_ms: u64,
}

impl Default for AudioDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sensitivity: 50,
            min_delay_ms: 250,
        }
    }
}

impl AudioDetectionConfig {
    pub fn validate(&self) -> Result<(), AudioError> {
        if self.sensitivity > 100 {
            return Err(AudioError::InvalidConfig {
                reason: format!("sensitivity must be in 0..=100 (got {})", self.sensitivity),
            });
        }
        Ok(())
    }
}

/// Sampling cadence of the detector loop and the UI volume poller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Interval between detector ticks (~60 Hz display cadence)
    pub tick_interval_ms: u64,
    /// Number of most recent samples analysed per tick
    pub frame_size: usize,
    /// Interval between live level-meter updates
    pub volume_poll_interval_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 16,
            frame_size: 2048,
            volume_poll_interval_ms: 100,
        }
    }
}

impl SamplingConfig {
    pub fn validate(&self) -> Result<(), AudioError> {
        if self.tick_interval_ms == 0 {
            return Err(AudioError::InvalidConfig {
                reason: "tick_interval_ms must be greater than 0".to_string(),
            });
        }
        if self.frame_size == 0 {
            return Err(AudioError::InvalidConfig {
                reason: "frame_size must be greater than 0".to_string(),
            });
        }
        if self.volume_poll_interval_ms == 0 {
            return Err(AudioError::InvalidConfig {
                reason: "volume_poll_interval_ms must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Audio input transfer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Size of buffer pool between the input callback and the detector loop
    pub buffer_pool_size: usize,
    /// Size of each pooled buffer in samples
    pub buffer_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            buffer_pool_size: 32,
            buffer_size: 1024,
        }
    }
}

/// Target capture defaults
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Marker size in screen pixels at zoom 1.0
    pub marker_base_size_px: f64,
    /// Physical length of the default reference marker
    pub reference_length_inches: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            marker_base_size_px: 24.0,
            reference_length_inches: 1.0,
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file is missing, the
    /// JSON is invalid, or a value is out of range.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<AppConfig>(&contents) {
                Ok(config) => match config.validate() {
                    Ok(()) => {
                        log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                        config
                    }
                    Err(err) => {
                        log::warn!(
                            "[Config] Rejected configuration from {:?}: {}. Using defaults.",
                            path.as_ref(),
                            err
                        );
                        Self::default()
                    }
                },
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Load configuration from the default asset location
    pub fn load() -> Self {
        Self::load_from_file("assets/range_config.json")
    }

    pub fn validate(&self) -> Result<(), AudioError> {
        self.detection.validate()?;
        self.sampling.validate()
    }
}
