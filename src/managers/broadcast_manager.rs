// BroadcastChannelManager: Centralized tokio broadcast channel management
// Single Responsibility: Broadcast channel lifecycle and subscription

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::engine::core::DetectorEvent;
use crate::engine::level_meter::VolumeLevel;

/// Manages the detector's tokio broadcast channels
///
/// # Channel Types
/// - Detector events: confirmed shots and unrecoverable stream failures
/// - Volume levels: coarse live level-meter updates from the volume poller
pub struct BroadcastChannelManager {
    detector_events: Arc<Mutex<Option<broadcast::Sender<DetectorEvent>>>>,
    volume_levels: Arc<Mutex<Option<broadcast::Sender<VolumeLevel>>>>,
}

impl BroadcastChannelManager {
    /// Create a new BroadcastChannelManager with all channels uninitialized
    ///
    /// Channels must be explicitly initialized via init_* methods before use.
    pub fn new() -> Self {
        Self {
            detector_events: Arc::new(Mutex::new(None)),
            volume_levels: Arc::new(Mutex::new(None)),
        }
    }

    // ========================================================================
    // DETECTOR EVENT CHANNEL
    // ========================================================================

    /// Initialize the detector event channel, reusing an existing one
    ///
    /// # Notes
    /// - Buffer size: 64 messages (a magazine dump at speed with margin)
    /// - Subscribers that fall further behind observe `Lagged`
    pub fn init_detector_events(&self) -> broadcast::Sender<DetectorEvent> {
        let mut slot = lock_slot(&self.detector_events);
        slot.get_or_insert_with(|| broadcast::channel(64).0).clone()
    }

    /// Subscribe to detector events, or None if not initialized
    pub fn subscribe_detector_events(&self) -> Option<broadcast::Receiver<DetectorEvent>> {
        lock_slot(&self.detector_events)
            .as_ref()
            .map(|tx| tx.subscribe())
    }

    // ========================================================================
    // VOLUME LEVEL CHANNEL
    // ========================================================================

    /// Initialize the volume level channel, reusing an existing one
    ///
    /// # Notes
    /// - Buffer size: 16 messages; a meter only cares about the latest level
    pub fn init_volume_levels(&self) -> broadcast::Sender<VolumeLevel> {
        let mut slot = lock_slot(&self.volume_levels);
        slot.get_or_insert_with(|| broadcast::channel(16).0).clone()
    }

    /// Subscribe to volume levels, or None if not initialized
    pub fn subscribe_volume_levels(&self) -> Option<broadcast::Receiver<VolumeLevel>> {
        lock_slot(&self.volume_levels)
            .as_ref()
            .map(|tx| tx.subscribe())
    }
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

// A poisoned slot still holds a valid sender.
fn lock_slot<T>(slot: &Mutex<Option<T>>) -> MutexGuard<'_, Option<T>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
