// Analysis module - shot group statistics and acoustic shot detection
//
// - group: GroupMetricsCalculator over shots in inches relative to the POA
// - volume: RMS level of a normalized audio frame
// - shot_detector: adaptive-baseline detector driven one tick at a time
//
// Everything here is pure and free of I/O; the sampling loop that feeds
// the detector from a microphone lives in `engine::core`.

pub mod group;
pub mod shot_detector;
pub mod volume;

pub use group::{
    compute_dispersion, compute_metrics, inches_to_moa, moa_to_inches, GroupDispersion,
    GroupMetrics, INCHES_PER_MOA_AT_100_YARDS,
};
pub use shot_detector::{threshold_multiplier, DetectorState, ShotEvent, TickOutcome, WARMUP_SAMPLES};
pub use volume::{normalize_i16, rms};
