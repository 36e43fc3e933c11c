//! Backend abstractions for the shot detector core.
//!
//! The detector consumes a microphone through [`MicrophoneBackend`]: it opens
//! a stream when listening starts and reads one frame per tick. Dropping the
//! stream releases the device.

use std::time::Instant;

use crate::error::AudioError;

/// Parameters handed to a backend when the detector starts listening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    /// Number of most recent samples returned per frame
    pub frame_size: usize,
    /// Pool size between the input callback and the detector loop
    pub buffer_pool_size: usize,
    /// Capacity of each pooled buffer in samples
    pub buffer_size: usize,
}

/// An open microphone stream owned by the detector loop.
///
/// Not required to be `Send`: the stream is opened, read and dropped on the
/// detector's worker thread. Dropping it releases the input device.
pub trait MicrophoneStream {
    /// Replace `frame` with the most recent frame of normalized mono samples.
    ///
    /// # Errors
    /// `MicrophoneUnavailable` once the underlying device failed or vanished.
    fn read_frame(&mut self, frame: &mut Vec<f32>) -> Result<(), AudioError>;
}

/// Trait implemented by microphone providers.
pub trait MicrophoneBackend: Send + Sync {
    /// Acquire the input device and start capturing.
    ///
    /// Permission denial, a missing device and platform failures all return
    /// `MicrophoneUnavailable`. Anything acquired before the failure is
    /// released before returning.
    fn open(&self, request: &StreamRequest) -> Result<Box<dyn MicrophoneStream>, AudioError>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &'static str;
}

/// Trait representing a monotonic time source used for tick timestamps.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// Default time source backed by `Instant::now`.
#[derive(Default)]
pub struct SystemTimeSource {
    _unit: (),
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(not(target_os = "android"))]
mod cpal;
#[cfg(not(target_os = "android"))]
pub use cpal::CpalBackend;

mod scripted;
pub use scripted::{ScriptedBackend, StubTimeSource};
