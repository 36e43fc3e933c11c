use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::AudioError;

use super::{MicrophoneBackend, MicrophoneStream, StreamRequest, TimeSource};

/// Deterministic microphone used by tests and CLI tooling.
///
/// Every read produces one frame whose RMS equals the scripted level: a
/// square wave at `ambient_level`, replaced by `amplitude` on the reads listed
/// with [`ScriptedBackend::with_spike`]. Optional seeded noise makes the
/// ambient floor uneven while staying reproducible. Open failures and
/// mid-stream failures can be injected, and the backend counts opened and
/// live streams so tests can assert the device was released.
#[derive(Clone)]
pub struct ScriptedBackend {
    ambient_level: f32,
    spikes: HashMap<u64, f32>,
    noise: Option<(u64, f32)>,
    open_failure: Option<String>,
    fail_after_reads: Option<(u64, String)>,
    opened: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new(ambient_level: f32) -> Self {
        Self {
            ambient_level: ambient_level.clamp(0.0, 1.0),
            spikes: HashMap::new(),
            noise: None,
            open_failure: None,
            fail_after_reads: None,
            opened: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the frame of read `read_index` (0-based) a spike of `amplitude`
    pub fn with_spike(mut self, read_index: u64, amplitude: f32) -> Self {
        self.spikes.insert(read_index, amplitude.clamp(0.0, 1.0));
        self
    }

    /// Add uniform noise of up to `level` around every ambient sample
    pub fn with_noise(mut self, seed: u64, level: f32) -> Self {
        self.noise = Some((seed, level.abs()));
        self
    }

    /// Make every `open` fail as if the device were missing
    pub fn failing_open(mut self, reason: impl Into<String>) -> Self {
        self.open_failure = Some(reason.into());
        self
    }

    /// Fail with `MicrophoneUnavailable` on read `reads` and every read after
    pub fn failing_after(mut self, reads: u64, reason: impl Into<String>) -> Self {
        self.fail_after_reads = Some((reads, reason.into()));
        self
    }

    /// Number of successful `open` calls so far
    pub fn opened_streams(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of streams currently held open
    pub fn active_streams(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new(0.01)
    }
}

impl MicrophoneBackend for ScriptedBackend {
    fn open(&self, request: &StreamRequest) -> Result<Box<dyn MicrophoneStream>, AudioError> {
        if let Some(reason) = &self.open_failure {
            return Err(AudioError::microphone_unavailable(reason.clone()));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(ScriptedStream {
            frame_size: request.frame_size.max(2),
            ambient_level: self.ambient_level,
            spikes: self.spikes.clone(),
            noise: self
                .noise
                .map(|(seed, level)| (StdRng::seed_from_u64(seed), level)),
            fail_after_reads: self.fail_after_reads.clone(),
            reads: 0,
            active: Arc::clone(&self.active),
        }))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

struct ScriptedStream {
    frame_size: usize,
    ambient_level: f32,
    spikes: HashMap<u64, f32>,
    noise: Option<(StdRng, f32)>,
    fail_after_reads: Option<(u64, String)>,
    reads: u64,
    active: Arc<AtomicUsize>,
}

impl MicrophoneStream for ScriptedStream {
    fn read_frame(&mut self, frame: &mut Vec<f32>) -> Result<(), AudioError> {
        if let Some((limit, reason)) = &self.fail_after_reads {
            if self.reads >= *limit {
                return Err(AudioError::microphone_unavailable(reason.clone()));
            }
        }

        let read_index = self.reads;
        self.reads += 1;

        frame.clear();
        match self.spikes.get(&read_index) {
            Some(&amplitude) => {
                frame.extend((0..self.frame_size).map(|i| square(i, amplitude)));
            }
            None => {
                let level = self.ambient_level;
                match self.noise.as_mut() {
                    Some((rng, noise_level)) => {
                        let noise_level = *noise_level;
                        frame.extend((0..self.frame_size).map(|i| {
                            let jitter: f32 = rng.gen_range(-noise_level..=noise_level);
                            (square(i, level) + jitter).clamp(-1.0, 1.0)
                        }));
                    }
                    None => frame.extend((0..self.frame_size).map(|i| square(i, level))),
                }
            }
        }
        Ok(())
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

fn square(index: usize, amplitude: f32) -> f32 {
    if index % 2 == 0 {
        amplitude
    } else {
        -amplitude
    }
}

/// Deterministic time source for scripted runs.
///
/// Each call to `now()` advances by a fixed step so tick timestamps do not
/// depend on scheduler jitter.
pub struct StubTimeSource {
    start: Instant,
    step_ms: u64,
    offset_ms: AtomicU64,
}

impl StubTimeSource {
    pub fn new(step_ms: u64) -> Self {
        Self {
            start: Instant::now(),
            step_ms,
            offset_ms: AtomicU64::new(0),
        }
    }
}

impl Default for StubTimeSource {
    fn default() -> Self {
        Self::new(16)
    }
}

impl TimeSource for StubTimeSource {
    fn now(&self) -> Instant {
        let ms = self.offset_ms.fetch_add(self.step_ms, Ordering::SeqCst);
        self.start + Duration::from_millis(ms)
    }
}
