//! Telemetry event types describing detector activity exposed to the CLI and
//! any embedding application.

use serde::{Deserialize, Serialize};

/// Lifecycle stages of the shot detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Started,
    WarmupComplete,
    Stopped,
    Failed,
}

/// Metric events covering lifecycle, shots, split times and errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    Lifecycle {
        phase: LifecyclePhase,
        timestamp_ms: u64,
    },
    Shot {
        shot_number: u32,
        timestamp_ms: u64,
        volume: f64,
        baseline_volume: f64,
        threshold: f64,
    },
    /// Time between consecutive shots of one listening session
    Split {
        last_ms: u64,
        avg_ms: f64,
        sample_count: usize,
    },
    Error {
        code: i32,
        context: String,
    },
}
