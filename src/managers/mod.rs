// Managers Module
//
// - BroadcastChannelManager: Tokio broadcast channel management for detector
//   events and live volume levels

pub mod broadcast_manager;

pub use broadcast_manager::BroadcastChannelManager;
