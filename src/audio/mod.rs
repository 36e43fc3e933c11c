// Audio module - lock-free transfer of microphone samples to the detector loop

pub mod buffer_pool;
pub mod frame_window;

pub use buffer_pool::{
    AudioBuffer, BufferPool, BufferPoolChannels, DetectorChannels, InputCallbackChannels,
};
pub use frame_window::FrameWindow;
