//! Detector telemetry collector and helpers.
//!
//! The collector multiplexes lifecycle, shot, split and error events into a
//! bounded history plus async broadcast stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use tokio::sync::broadcast;

use crate::analysis::ShotEvent;
use crate::error::ErrorCode;

pub mod events;

pub use events::{LifecyclePhase, MetricEvent};

/// Global telemetry hub shared across the crate.
static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

/// Broadcast-based collector retaining a bounded history of metrics.
pub struct TelemetryCollector {
    tx: broadcast::Sender<MetricEvent>,
    history: Mutex<VecDeque<MetricEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        let history_capacity = history_capacity.max(1);
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        {
            let mut history = lock(&self.history);
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = lock(&self.history);
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

/// Split tracker keeps a rolling window of intervals between shots.
struct SplitTracker {
    last_shot_ms: Option<u64>,
    samples: VecDeque<u64>,
    max_samples: usize,
}

impl SplitTracker {
    fn new(max_samples: usize) -> Self {
        Self {
            last_shot_ms: None,
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    fn reset(&mut self) {
        self.last_shot_ms = None;
        self.samples.clear();
    }

    /// Returns `(last, avg, count)` once at least two shots were observed
    fn observe(&mut self, timestamp_ms: u64) -> Option<(u64, f64, usize)> {
        let previous = self.last_shot_ms.replace(timestamp_ms)?;
        let split = timestamp_ms.saturating_sub(previous);

        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(split);

        let count = self.samples.len();
        let avg = self.samples.iter().sum::<u64>() as f64 / count as f64;
        Some((split, avg, count))
    }
}

/// Top-level hub wrapping the collector plus derived split times.
pub struct TelemetryHub {
    collector: TelemetryCollector,
    splits: Mutex<SplitTracker>,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize, split_window: usize) -> Self {
        Self {
            collector: TelemetryCollector::new(channel_capacity, history_capacity),
            splits: Mutex::new(SplitTracker::new(split_window)),
        }
    }

    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.collector.snapshot()
    }

    /// Record a lifecycle transition; `Started` also resets split tracking.
    pub fn record_lifecycle(&self, phase: LifecyclePhase) {
        if phase == LifecyclePhase::Started {
            lock(&self.splits).reset();
        }
        self.collector.publish(MetricEvent::Lifecycle {
            phase,
            timestamp_ms: now_timestamp_ms(),
        });
    }

    pub fn record_shot(&self, shot: &ShotEvent) {
        self.collector.publish(MetricEvent::Shot {
            shot_number: shot.shot_number,
            timestamp_ms: shot.timestamp_ms,
            volume: shot.volume,
            baseline_volume: shot.baseline_volume,
            threshold: shot.threshold,
        });

        let split = lock(&self.splits).observe(shot.timestamp_ms);
        if let Some((last_ms, avg_ms, sample_count)) = split {
            self.collector.publish(MetricEvent::Split {
                last_ms,
                avg_ms,
                sample_count,
            });
        }
    }

    pub fn record_error<E: ErrorCode>(&self, err: &E, context: impl Into<String>) {
        self.collector.publish(MetricEvent::Error {
            code: err.code(),
            context: context.into(),
        });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64, 16)
    }
}

// Telemetry must keep flowing even if a publisher panicked mid-update.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
