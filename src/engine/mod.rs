//! Engine module housing the live shot detector.
//!
//! This module exposes trait-based microphone backends (`backend`), the
//! `ShotDetectorHandle` orchestration layer (`core`) and the coarse live
//! level meter (`level_meter`).

pub mod backend;
pub mod core;
pub mod level_meter;

#[cfg(not(target_os = "android"))]
pub use backend::CpalBackend;
pub use backend::{
    MicrophoneBackend, MicrophoneStream, ScriptedBackend, StreamRequest, StubTimeSource,
    SystemTimeSource, TimeSource,
};
pub use core::{DetectorEvent, DetectorStatus, ShotDetectorHandle, VolumeProbe};
pub use level_meter::{VolumeLevel, VolumePoller};
