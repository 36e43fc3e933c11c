// ShotDetectorState - adaptive-baseline gunshot detection
//
// Pure state machine driven by one (volume, timestamp) tick at a time; the
// sampling loop around it lives in `engine::core`.
//
// Algorithm:
// 1. Warm-up: the first 30 volumes are collected and averaged into the
//    baseline. Nothing can fire before the baseline exists.
// 2. Threshold: multiplier = 10 - (sensitivity / 100) * 8.5, so sensitivity 0
//    needs 10x the baseline and sensitivity 100 needs 1.5x.
// 3. Detection: volume > baseline * multiplier and at least `min_delay_ms`
//    since the previous detection.
// 4. Adaptation: after every post-warm-up tick,
//    baseline = baseline * 0.99 + volume * 0.01.

use serde::{Deserialize, Serialize};

use crate::config::AudioDetectionConfig;

/// Number of volume samples averaged into the initial baseline
pub const WARMUP_SAMPLES: usize = 30;

/// Weight kept by the previous baseline on every adaptation step
pub const BASELINE_RETENTION: f64 = 0.99;

/// Threshold multiplier at sensitivity 0
pub const MAX_THRESHOLD_MULTIPLIER: f64 = 10.0;

/// Multiplier reduction between sensitivity 0 and 100
pub const THRESHOLD_MULTIPLIER_SPAN: f64 = 8.5;

/// Baseline multiplier a spike must exceed at the given sensitivity
///
/// Sensitivities above 100 are treated as 100.
pub fn threshold_multiplier(sensitivity: u32) -> f64 {
    let sensitivity = sensitivity.min(100) as f64;
    MAX_THRESHOLD_MULTIPLIER - (sensitivity / 100.0) * THRESHOLD_MULTIPLIER_SPAN
}

/// A confirmed shot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotEvent {
    /// 1-based count of shots detected since the detector started
    pub shot_number: u32,
    /// Milliseconds since the detector started listening
    pub timestamp_ms: u64,
    /// Volume of the tick that fired
    pub volume: f64,
    /// Baseline in effect when the tick fired
    pub baseline_volume: f64,
    /// Threshold the volume exceeded
    pub threshold: f64,
}

/// Result of feeding one tick to the detector
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Still collecting baseline samples
    WarmingUp { collected: usize },
    /// This tick completed warm-up
    BaselineEstablished { baseline_volume: f64 },
    /// Below threshold
    Quiet,
    /// Above threshold but inside the debounce window
    Debounced,
    /// Shot confirmed
    ShotDetected(ShotEvent),
}

/// Baseline and debounce state owned by a single detector
#[derive(Debug, Clone, Default)]
pub struct DetectorState {
    baseline_volume: f64,
    baseline_samples: Vec<f64>,
    last_detection_ms: Option<u64>,
    shots_detected: u32,
}

impl DetectorState {
    pub fn new() -> Self {
        Self {
            baseline_volume: 0.0,
            baseline_samples: Vec::with_capacity(WARMUP_SAMPLES),
            last_detection_ms: None,
            shots_detected: 0,
        }
    }

    /// Reset internal state (e.g. when the detector restarts)
    pub fn reset(&mut self) {
        self.baseline_volume = 0.0;
        self.baseline_samples.clear();
        self.last_detection_ms = None;
        self.shots_detected = 0;
    }

    pub fn is_warmed_up(&self) -> bool {
        self.baseline_samples.len() >= WARMUP_SAMPLES
    }

    pub fn baseline_volume(&self) -> f64 {
        self.baseline_volume
    }

    pub fn baseline_samples(&self) -> &[f64] {
        &self.baseline_samples
    }

    pub fn last_detection_ms(&self) -> Option<u64> {
        self.last_detection_ms
    }

    pub fn shots_detected(&self) -> u32 {
        self.shots_detected
    }

    /// Advance the detector by one sampling tick
    ///
    /// # Arguments
    /// * `volume` - RMS volume of the current frame
    /// * `now_ms` - Monotonic timestamp of the tick in milliseconds
    /// * `config` - Current sensitivity and debounce window, read fresh each tick
    pub fn tick(
        &mut self,
        volume: f64,
        now_ms: u64,
        config: &AudioDetectionConfig,
    ) -> TickOutcome {
        let volume = if volume.is_finite() {
            volume.max(0.0)
        } else {
            0.0
        };

        if !self.is_warmed_up() {
            self.baseline_samples.push(volume);
            if !self.is_warmed_up() {
                return TickOutcome::WarmingUp {
                    collected: self.baseline_samples.len(),
                };
            }

            self.baseline_volume =
                self.baseline_samples.iter().sum::<f64>() / self.baseline_samples.len() as f64;
            return TickOutcome::BaselineEstablished {
                baseline_volume: self.baseline_volume,
            };
        }

        let threshold = self.baseline_volume * threshold_multiplier(config.sensitivity);
        let outcome = if volume > threshold {
            let debounced = self
                .last_detection_ms
                .map(|last| now_ms.saturating_sub(last) < config.min_delay_ms)
                .unwrap_or(false);

            if debounced {
                TickOutcome::Debounced
            } else {
                self.last_detection_ms = Some(now_ms);
                self.shots_detected += 1;
                TickOutcome::ShotDetected(ShotEvent {
                    shot_number: self.shots_detected,
                    timestamp_ms: now_ms,
                    volume,
                    baseline_volume: self.baseline_volume,
                    threshold,
                })
            }
        } else {
            TickOutcome::Quiet
        };

        self.baseline_volume =
            self.baseline_volume * BASELINE_RETENTION + volume * (1.0 - BASELINE_RETENTION);

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AMBIENT: f64 = 0.01;

    fn config(sensitivity: u32, min_delay_ms: u64) -> AudioDetectionConfig {
        AudioDetectionConfig {
            enabled: true,
            sensitivity,
            min_delay_ms,
        }
    }

    fn warmed_up(cfg: &AudioDetectionConfig) -> DetectorState {
        let mut state = DetectorState::new();
        for i in 0..WARMUP_SAMPLES as u64 {
            state.tick(AMBIENT, i * 16, cfg);
        }
        state
    }

    #[test]
    fn test_threshold_multiplier_range() {
        assert_eq!(threshold_multiplier(0), 10.0);
        assert_eq!(threshold_multiplier(100), 1.5);
        assert_eq!(threshold_multiplier(250), 1.5);
        assert!((threshold_multiplier(50) - 5.75).abs() < 1e-12);
        for s in 0..100 {
            assert!(threshold_multiplier(s) > threshold_multiplier(s + 1));
        }
    }

    #[test]
    fn test_warmup_sets_baseline_to_mean() {
        let cfg = config(0, 0);
        let mut state = DetectorState::new();

        for i in 0..(WARMUP_SAMPLES - 1) {
            let outcome = state.tick(AMBIENT, i as u64, &cfg);
            assert_eq!(outcome, TickOutcome::WarmingUp { collected: i + 1 });
        }
        assert!(!state.is_warmed_up());

        let outcome = state.tick(AMBIENT, 100, &cfg);
        assert!(matches!(outcome, TickOutcome::BaselineEstablished { .. }));
        assert!(state.is_warmed_up());
        assert!((state.baseline_volume() - AMBIENT).abs() < 1e-12);
    }

    #[test]
    fn test_no_detection_during_warmup() {
        let cfg = config(100, 0);
        let mut state = DetectorState::new();
        for i in 0..WARMUP_SAMPLES {
            let volume = if i % 2 == 0 { AMBIENT } else { 1.0 };
            let outcome = state.tick(volume, i as u64 * 16, &cfg);
            assert!(!matches!(outcome, TickOutcome::ShotDetected(_)));
        }
        assert_eq!(state.shots_detected(), 0);
    }

    #[test]
    fn test_spike_fires_at_lowest_sensitivity() {
        let cfg = config(0, 0);
        let mut state = warmed_up(&cfg);
        let outcome = state.tick(AMBIENT * 10.1, 1_000, &cfg);
        match outcome {
            TickOutcome::ShotDetected(event) => {
                assert_eq!(event.shot_number, 1);
                assert_eq!(event.timestamp_ms, 1_000);
                assert!((event.threshold - AMBIENT * 10.0).abs() < 1e-12);
            }
            other => panic!("Expected ShotDetected, got {:?}", other),
        }
    }

    #[test]
    fn test_spike_fires_at_highest_sensitivity() {
        let cfg = config(100, 0);
        let mut state = warmed_up(&cfg);
        assert!(matches!(
            state.tick(AMBIENT * 10.1, 1_000, &cfg),
            TickOutcome::ShotDetected(_)
        ));
    }

    #[test]
    fn test_small_spike_ignored_at_lowest_sensitivity() {
        let cfg = config(0, 0);
        let mut state = warmed_up(&cfg);
        assert_eq!(state.tick(AMBIENT * 2.0, 1_000, &cfg), TickOutcome::Quiet);
        assert_eq!(state.shots_detected(), 0);
    }

    #[test]
    fn test_debounce_within_min_delay() {
        let cfg = config(50, 300);
        let mut state = warmed_up(&cfg);

        assert!(matches!(
            state.tick(0.5, 1_000, &cfg),
            TickOutcome::ShotDetected(_)
        ));
        assert_eq!(state.tick(0.5, 1_200, &cfg), TickOutcome::Debounced);
        assert_eq!(state.shots_detected(), 1);
        assert_eq!(state.last_detection_ms(), Some(1_000));
    }

    #[test]
    fn test_two_shots_outside_min_delay() {
        let cfg = config(50, 300);
        let mut state = warmed_up(&cfg);

        assert!(matches!(
            state.tick(0.5, 1_000, &cfg),
            TickOutcome::ShotDetected(_)
        ));
        match state.tick(0.5, 1_301, &cfg) {
            TickOutcome::ShotDetected(event) => assert_eq!(event.shot_number, 2),
            other => panic!("Expected second shot, got {:?}", other),
        }
    }

    #[test]
    fn test_first_shot_not_debounced_near_start() {
        let cfg = config(50, 10_000);
        let mut state = warmed_up(&cfg);
        assert!(matches!(
            state.tick(0.5, 500, &cfg),
            TickOutcome::ShotDetected(_)
        ));
    }

    #[test]
    fn test_baseline_adapts_after_every_tick() {
        let cfg = config(0, 0);
        let mut state = warmed_up(&cfg);

        state.tick(0.02, 1_000, &cfg);
        let expected = AMBIENT * 0.99 + 0.02 * 0.01;
        assert!((state.baseline_volume() - expected).abs() < 1e-12);

        // A detected spike still moves the baseline by its 1% share
        let before = state.baseline_volume();
        state.tick(1.0, 2_000, &cfg);
        let expected = before * 0.99 + 1.0 * 0.01;
        assert!((state.baseline_volume() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_sensitivity_change_applies_without_reset() {
        let strict = config(0, 0);
        let loose = config(100, 0);
        let mut state = warmed_up(&strict);

        assert_eq!(state.tick(AMBIENT * 2.0, 1_000, &strict), TickOutcome::Quiet);
        assert!(state.is_warmed_up());
        assert!(matches!(
            state.tick(AMBIENT * 2.0, 1_016, &loose),
            TickOutcome::ShotDetected(_)
        ));
    }

    #[test]
    fn test_reset_restarts_warmup() {
        let cfg = config(50, 0);
        let mut state = warmed_up(&cfg);
        state.tick(0.5, 1_000, &cfg);
        state.reset();
        assert!(!state.is_warmed_up());
        assert_eq!(state.shots_detected(), 0);
        assert_eq!(state.last_detection_ms(), None);
        assert_eq!(
            state.tick(AMBIENT, 0, &cfg),
            TickOutcome::WarmingUp { collected: 1 }
        );
    }

    #[test]
    fn test_non_finite_volume_treated_as_silence() {
        let cfg = config(100, 0);
        let mut state = warmed_up(&cfg);
        assert_eq!(state.tick(f64::NAN, 1_000, &cfg), TickOutcome::Quiet);
        assert!(state.baseline_volume().is_finite());
    }
}
