//! Live level meter: republishes the detector's current volume on a coarse
//! interval for UI display. It only reads already-computed state and never
//! drives detection.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::core::VolumeProbe;

/// One level-meter reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeLevel {
    /// Latest RMS volume, `0.0` when idle
    pub volume: f64,
    pub listening: bool,
    /// Milliseconds since the poller started
    pub timestamp_ms: u64,
}

/// Background task polling a [`VolumeProbe`] at a fixed interval.
///
/// Must be spawned from within a tokio runtime. The task ends when the
/// poller is dropped or [`VolumePoller::shutdown`] is called.
pub struct VolumePoller {
    task: JoinHandle<()>,
}

impl VolumePoller {
    pub fn spawn(
        probe: VolumeProbe,
        interval: Duration,
        tx: broadcast::Sender<VolumeLevel>,
    ) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let level = VolumeLevel {
                    volume: probe.current_volume(),
                    listening: probe.is_listening(),
                    timestamp_ms: started.elapsed().as_millis() as u64,
                };
                // No subscribers is fine; a meter may attach later.
                let _ = tx.send(level);
            }
        });

        Self { task }
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

impl Drop for VolumePoller {
    fn drop(&mut self) {
        self.task.abort();
    }
}
