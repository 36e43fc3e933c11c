//! ShotDetectorHandle: resource-owning acoustic shot detector.
//!
//! The handle is `Idle` until [`ShotDetectorHandle::start`] acquires the
//! microphone, then `Listening` until [`ShotDetectorHandle::stop`] or a
//! stream failure. While listening a dedicated worker thread runs one tick at
//! a time: read the latest frame, compute its RMS volume, publish it for
//! level meters, and feed it to the adaptive-baseline [`DetectorState`].
//!
//! The microphone stream is opened, read and dropped on the worker thread,
//! so every exit path (failed open, stream error, stop) releases it there.
//! `stop()` signals the worker and joins it before returning; no tick can run
//! after `stop()` returns.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use futures::Stream;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::analysis::volume::rms;
use crate::analysis::{DetectorState, ShotEvent, TickOutcome};
use crate::config::{AppConfig, AudioConfig, AudioDetectionConfig, SamplingConfig};
#[cfg(not(target_os = "android"))]
use crate::engine::backend::CpalBackend;
use crate::engine::backend::{
    MicrophoneBackend, MicrophoneStream, StreamRequest, SystemTimeSource, TimeSource,
};
use crate::engine::level_meter::{VolumeLevel, VolumePoller};
use crate::error::{log_audio_error, AudioError};
use crate::managers::BroadcastChannelManager;
use crate::telemetry::{self, LifecyclePhase};

/// Event published by a listening detector, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorEvent {
    /// A confirmed shot
    ShotDetected(ShotEvent),
    /// Unrecoverable stream failure; the detector is already idle and the
    /// microphone released when this is observed
    Error(AudioError),
}

/// Externally visible detector state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorStatus {
    Idle,
    Listening,
}

/// Detector settings readable by the worker on every tick.
struct LiveSettings {
    enabled: AtomicBool,
    sensitivity: AtomicU32,
    min_delay_ms: AtomicU64,
}

impl LiveSettings {
    fn new(config: AudioDetectionConfig) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            sensitivity: AtomicU32::new(config.sensitivity.min(100)),
            min_delay_ms: AtomicU64::new(config.min_delay_ms),
        }
    }

    fn snapshot(&self) -> AudioDetectionConfig {
        AudioDetectionConfig {
            enabled: self.enabled.load(Ordering::Relaxed),
            sensitivity: self.sensitivity.load(Ordering::Relaxed),
            min_delay_ms: self.min_delay_ms.load(Ordering::Relaxed),
        }
    }
}

/// Listening flag and last computed volume, shared with the worker and pollers.
#[derive(Default)]
struct SharedLevel {
    listening: AtomicBool,
    volume_bits: AtomicU64,
}

impl SharedLevel {
    fn store_volume(&self, volume: f64) {
        self.volume_bits.store(volume.to_bits(), Ordering::Relaxed);
    }

    fn mark_idle(&self) {
        self.listening.store(false, Ordering::SeqCst);
        self.store_volume(0.0);
    }

    fn current_volume(&self) -> f64 {
        if self.listening.load(Ordering::SeqCst) {
            f64::from_bits(self.volume_bits.load(Ordering::Relaxed))
        } else {
            0.0
        }
    }
}

/// Cheap read-only view of the detector's live level for UI meters.
#[derive(Clone)]
pub struct VolumeProbe {
    shared: Arc<SharedLevel>,
}

impl VolumeProbe {
    /// Latest volume, `0.0` when not listening
    pub fn current_volume(&self) -> f64 {
        self.shared.current_volume()
    }

    pub fn is_listening(&self) -> bool {
        self.shared.listening.load(Ordering::SeqCst)
    }
}

struct DetectorWorker {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

/// Resource-owning acoustic shot detector.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use range_trainer::config::AppConfig;
/// use range_trainer::engine::{DetectorEvent, ScriptedBackend, ShotDetectorHandle};
///
/// let backend = ScriptedBackend::new(0.01).with_spike(40, 0.5);
/// let detector = ShotDetectorHandle::new(Arc::new(backend), &AppConfig::default());
/// let mut events = detector.subscribe();
///
/// detector.start().unwrap();
/// // ... consume events ...
/// detector.stop().unwrap();
/// assert_eq!(detector.current_volume(), 0.0);
/// # let _ = events.try_recv();
/// ```
pub struct ShotDetectorHandle {
    backend: Arc<dyn MicrophoneBackend>,
    time_source: Arc<dyn TimeSource>,
    sampling: SamplingConfig,
    audio: AudioConfig,
    settings: Arc<LiveSettings>,
    shared: Arc<SharedLevel>,
    broadcasts: BroadcastChannelManager,
    events_tx: broadcast::Sender<DetectorEvent>,
    worker: Mutex<Option<DetectorWorker>>,
}

impl ShotDetectorHandle {
    /// Create an idle detector over the given microphone backend.
    pub fn new(backend: Arc<dyn MicrophoneBackend>, config: &AppConfig) -> Self {
        Self::with_time_source(backend, Arc::new(SystemTimeSource::default()), config)
    }

    /// Create an idle detector with an explicit tick clock.
    pub fn with_time_source(
        backend: Arc<dyn MicrophoneBackend>,
        time_source: Arc<dyn TimeSource>,
        config: &AppConfig,
    ) -> Self {
        let broadcasts = BroadcastChannelManager::new();
        let events_tx = broadcasts.init_detector_events();

        Self {
            backend,
            time_source,
            sampling: config.sampling,
            audio: config.audio,
            settings: Arc::new(LiveSettings::new(config.detection)),
            shared: Arc::new(SharedLevel::default()),
            broadcasts,
            events_tx,
            worker: Mutex::new(None),
        }
    }

    /// Create an idle detector on the default desktop microphone.
    #[cfg(not(target_os = "android"))]
    pub fn with_default_microphone(config: &AppConfig) -> Self {
        Self::new(Arc::new(CpalBackend::new()), config)
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Acquire the microphone and begin listening.
    ///
    /// Warm-up and debounce state start fresh on every start.
    ///
    /// # Errors
    /// - `AlreadyListening` if a listening session is active
    /// - `InvalidConfig` if detection is disabled or the sampling config is invalid
    /// - `MicrophoneUnavailable` if the input could not be acquired; nothing
    ///   stays held and no event is published
    pub fn start(&self) -> Result<(), AudioError> {
        let mut worker_guard = self.lock_worker()?;

        if let Some(worker) = worker_guard.take() {
            if self.shared.listening.load(Ordering::SeqCst) {
                *worker_guard = Some(worker);
                return Err(AudioError::AlreadyListening);
            }
            // Previous session ended on a stream error; reap its thread.
            join_worker(worker);
        }

        self.sampling.validate()?;
        let detection = self.settings.snapshot();
        detection.validate()?;
        if !detection.enabled {
            return Err(AudioError::InvalidConfig {
                reason: "audio shot detection is disabled".to_string(),
            });
        }

        let request = StreamRequest {
            frame_size: self.sampling.frame_size,
            buffer_pool_size: self.audio.buffer_pool_size,
            buffer_size: self.audio.buffer_size,
        };
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<(), AudioError>>(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let context = WorkerContext {
            backend: Arc::clone(&self.backend),
            time_source: Arc::clone(&self.time_source),
            settings: Arc::clone(&self.settings),
            shared: Arc::clone(&self.shared),
            events_tx: self.events_tx.clone(),
            tick_interval: Duration::from_millis(self.sampling.tick_interval_ms),
            request,
        };

        let join = thread::Builder::new()
            .name("shot-detector".to_string())
            .spawn(move || context.run(ready_tx, shutdown_rx))
            .map_err(AudioError::from)?;

        let opened = ready_rx.recv().unwrap_or_else(|_| {
            Err(AudioError::microphone_unavailable(
                "detector worker exited during startup",
            ))
        });

        match opened {
            Ok(()) => {
                *worker_guard = Some(DetectorWorker { shutdown_tx, join });
                telemetry::hub().record_lifecycle(LifecyclePhase::Started);
                tracing::info!(
                    backend = self.backend.name(),
                    sensitivity = detection.sensitivity,
                    min_delay_ms = detection.min_delay_ms,
                    tick_interval_ms = self.sampling.tick_interval_ms,
                    "shot detector listening"
                );
                Ok(())
            }
            Err(err) => {
                join_worker(DetectorWorker { shutdown_tx, join });
                self.shared.mark_idle();
                log_audio_error(&err, "start");
                telemetry::hub().record_lifecycle(LifecyclePhase::Failed);
                telemetry::hub().record_error(&err, "start");
                Err(err)
            }
        }
    }

    /// Stop listening and release the microphone.
    ///
    /// Idempotent: stopping an idle detector (including right after a failed
    /// `start`) is a no-op. Returns only after the worker has exited.
    pub fn stop(&self) -> Result<(), AudioError> {
        let worker = self.lock_worker()?.take();
        let Some(worker) = worker else {
            self.shared.mark_idle();
            return Ok(());
        };

        let was_listening = self.shared.listening.load(Ordering::SeqCst);
        join_worker(worker);
        self.shared.mark_idle();

        if was_listening {
            telemetry::hub().record_lifecycle(LifecyclePhase::Stopped);
            tracing::info!("shot detector stopped");
        }
        Ok(())
    }

    pub fn status(&self) -> DetectorStatus {
        if self.is_listening() {
            DetectorStatus::Listening
        } else {
            DetectorStatus::Idle
        }
    }

    pub fn is_listening(&self) -> bool {
        self.shared.listening.load(Ordering::SeqCst)
    }

    /// Latest RMS volume, `0.0` when not listening.
    pub fn current_volume(&self) -> f64 {
        self.shared.current_volume()
    }

    /// Read-only level view that can outlive borrows of the handle.
    pub fn volume_probe(&self) -> VolumeProbe {
        VolumeProbe {
            shared: Arc::clone(&self.shared),
        }
    }

    // ========================================================================
    // LIVE SETTINGS
    // ========================================================================

    /// Update sensitivity (clamped to 0..=100); applies from the next tick.
    pub fn set_sensitivity(&self, sensitivity: u32) {
        let clamped = sensitivity.min(100);
        self.settings.sensitivity.store(clamped, Ordering::Relaxed);
        log::debug!("[ShotDetector] Sensitivity set to {}", clamped);
    }

    /// Update the debounce window; applies to the next debounce check.
    pub fn set_min_delay_ms(&self, min_delay_ms: u64) {
        self.settings
            .min_delay_ms
            .store(min_delay_ms, Ordering::Relaxed);
        log::debug!("[ShotDetector] Min delay set to {} ms", min_delay_ms);
    }

    /// Enable or disable detection; only consulted by `start`.
    pub fn set_enabled(&self, enabled: bool) {
        self.settings.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Apply a full settings update from the settings collaborator.
    pub fn apply_config(&self, config: AudioDetectionConfig) {
        self.set_enabled(config.enabled);
        self.set_sensitivity(config.sensitivity);
        self.set_min_delay_ms(config.min_delay_ms);
    }

    pub fn detection_config(&self) -> AudioDetectionConfig {
        self.settings.snapshot()
    }

    pub fn sampling_config(&self) -> SamplingConfig {
        self.sampling
    }

    // ========================================================================
    // EVENT SUBSCRIPTIONS
    // ========================================================================

    /// Receive detector events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DetectorEvent> {
        self.events_tx.subscribe()
    }

    /// Detector events as an async stream; lagged gaps are skipped.
    pub fn event_stream(&self) -> impl Stream<Item = DetectorEvent> + Send + 'static {
        BroadcastStream::new(self.events_tx.subscribe()).filter_map(|event| event.ok())
    }

    /// Receive level-meter readings; readings flow once a poller is spawned.
    pub fn subscribe_volume_levels(&self) -> broadcast::Receiver<VolumeLevel> {
        self.broadcasts.init_volume_levels().subscribe()
    }

    /// Spawn the coarse level-meter poller on the current tokio runtime.
    pub fn spawn_volume_poller(&self) -> VolumePoller {
        VolumePoller::spawn(
            self.volume_probe(),
            Duration::from_millis(self.sampling.volume_poll_interval_ms),
            self.broadcasts.init_volume_levels(),
        )
    }

    fn lock_worker(&self) -> Result<MutexGuard<'_, Option<DetectorWorker>>, AudioError> {
        self.worker.lock().map_err(|_| AudioError::LockPoisoned {
            component: "detector_worker".to_string(),
        })
    }
}

impl Drop for ShotDetectorHandle {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log_audio_error(&err, "drop");
        }
    }
}

fn join_worker(worker: DetectorWorker) {
    let _ = worker.shutdown_tx.send(());
    if worker.join.join().is_err() {
        log::warn!("[ShotDetector] Detector worker panicked");
    }
}

/// Everything the worker thread owns for one listening session.
struct WorkerContext {
    backend: Arc<dyn MicrophoneBackend>,
    time_source: Arc<dyn TimeSource>,
    settings: Arc<LiveSettings>,
    shared: Arc<SharedLevel>,
    events_tx: broadcast::Sender<DetectorEvent>,
    tick_interval: Duration,
    request: StreamRequest,
}

impl WorkerContext {
    fn run(
        self,
        ready_tx: mpsc::SyncSender<Result<(), AudioError>>,
        shutdown_rx: mpsc::Receiver<()>,
    ) {
        let stream = match self.backend.open(&self.request) {
            Ok(stream) => stream,
            Err(err) => {
                let _ = ready_tx.send(Err(err));
                return;
            }
        };

        self.shared.store_volume(0.0);
        self.shared.listening.store(true, Ordering::SeqCst);
        if ready_tx.send(Ok(())).is_err() {
            self.shared.mark_idle();
            return;
        }

        let failure = self.tick_loop(stream, &shutdown_rx);
        self.shared.mark_idle();

        if let Some(err) = failure {
            log_audio_error(&err, "tick");
            telemetry::hub().record_lifecycle(LifecyclePhase::Failed);
            telemetry::hub().record_error(&err, "tick");
            let _ = self.events_tx.send(DetectorEvent::Error(err));
        }
    }

    /// Runs until shutdown or a stream failure; the stream is dropped on return.
    fn tick_loop(
        &self,
        mut stream: Box<dyn MicrophoneStream>,
        shutdown_rx: &mpsc::Receiver<()>,
    ) -> Option<AudioError> {
        let started = self.time_source.now();
        let mut state = DetectorState::new();
        let mut frame = Vec::with_capacity(self.request.frame_size);

        loop {
            if let Err(err) = stream.read_frame(&mut frame) {
                return Some(err);
            }

            let volume = rms(&frame);
            self.shared.store_volume(volume);

            let now_ms = self
                .time_source
                .now()
                .saturating_duration_since(started)
                .as_millis() as u64;
            let config = self.settings.snapshot();

            match state.tick(volume, now_ms, &config) {
                TickOutcome::WarmingUp { collected } => {
                    tracing::trace!(collected, volume, "warming up");
                }
                TickOutcome::BaselineEstablished { baseline_volume } => {
                    telemetry::hub().record_lifecycle(LifecyclePhase::WarmupComplete);
                    tracing::info!(baseline_volume, "baseline established");
                }
                TickOutcome::Quiet => {
                    tracing::trace!(volume, baseline = state.baseline_volume(), "tick");
                }
                TickOutcome::Debounced => {
                    tracing::debug!(volume, now_ms, "spike inside debounce window");
                }
                TickOutcome::ShotDetected(shot) => {
                    tracing::info!(
                        shot_number = shot.shot_number,
                        timestamp_ms = shot.timestamp_ms,
                        volume = shot.volume,
                        baseline = shot.baseline_volume,
                        threshold = shot.threshold,
                        "shot detected"
                    );
                    telemetry::hub().record_shot(&shot);
                    let _ = self.events_tx.send(DetectorEvent::ShotDetected(shot));
                }
            }

            match shutdown_rx.recv_timeout(self.tick_interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

// ========================================================================
// TEST HELPERS
// ========================================================================

#[cfg(test)]
mod tests;
