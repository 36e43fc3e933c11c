//! CPAL-based microphone backend for desktop platforms (Linux, macOS, Windows)
//!
//! Opens the default input device, averages each input frame to mono into the
//! lock-free buffer pool from the real-time callback, and assembles the most
//! recent frame on the detector thread.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};

use crate::audio::{BufferPool, DetectorChannels, FrameWindow, InputCallbackChannels};
use crate::error::AudioError;

use super::{MicrophoneBackend, MicrophoneStream, StreamRequest};

/// Desktop microphone via the default CPAL host.
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

struct CpalStream {
    // Field order matters: the stream stops capturing before the queues drop.
    stream: cpal::Stream,
    channels: DetectorChannels,
    window: FrameWindow,
    stream_error: Arc<Mutex<Option<String>>>,
}

impl MicrophoneBackend for CpalBackend {
    fn open(&self, request: &StreamRequest) -> Result<Box<dyn MicrophoneStream>, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AudioError::microphone_unavailable("No default input device found"))?;

        let config = device.default_input_config().map_err(|e| {
            AudioError::microphone_unavailable(format!(
                "Failed to get default input config: {}",
                e
            ))
        })?;

        let stream_config: cpal::StreamConfig = config.clone().into();
        let channels_count = stream_config.channels as usize;

        let (callback_channels, detector_channels) =
            BufferPool::new(request.buffer_pool_size, request.buffer_size)?.split();
        let stream_error = Arc::new(Mutex::new(None));

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => build_input_stream::<f32>(
                &device,
                &stream_config,
                channels_count,
                callback_channels,
                Arc::clone(&stream_error),
            ),
            cpal::SampleFormat::I16 => build_input_stream::<i16>(
                &device,
                &stream_config,
                channels_count,
                callback_channels,
                Arc::clone(&stream_error),
            ),
            cpal::SampleFormat::U16 => build_input_stream::<u16>(
                &device,
                &stream_config,
                channels_count,
                callback_channels,
                Arc::clone(&stream_error),
            ),
            other => {
                return Err(AudioError::microphone_unavailable(format!(
                    "Unsupported input sample format: {:?}",
                    other
                )))
            }
        }?;

        stream.play().map_err(|e| {
            AudioError::microphone_unavailable(format!("Failed to start input stream: {}", e))
        })?;

        log::info!(
            "[CpalBackend] Input stream started: {} Hz, {} channel(s), {:?}",
            stream_config.sample_rate.0,
            channels_count,
            config.sample_format()
        );

        Ok(Box::new(CpalStream {
            stream,
            channels: detector_channels,
            window: FrameWindow::new(request.frame_size),
            stream_error,
        }))
    }

    fn name(&self) -> &'static str {
        "cpal"
    }
}

fn build_input_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels_count: usize,
    mut channels: InputCallbackChannels,
    stream_error: Arc<Mutex<Option<String>>>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Real-time callback: no allocation, no locks.
                channels.push_downmixed_with(data, channels_count, |sample| {
                    f32::from_sample(sample)
                });
            },
            move |err| {
                log::error!("[CpalBackend] Input stream error: {}", err);
                if let Ok(mut slot) = stream_error.lock() {
                    slot.get_or_insert_with(|| err.to_string());
                }
            },
            None,
        )
        .map_err(|e| {
            AudioError::microphone_unavailable(format!("Failed to build input stream: {}", e))
        })
}

impl MicrophoneStream for CpalStream {
    fn read_frame(&mut self, frame: &mut Vec<f32>) -> Result<(), AudioError> {
        let failure = self
            .stream_error
            .lock()
            .map_err(|_| AudioError::LockPoisoned {
                component: "cpal_stream_error".to_string(),
            })?
            .clone();
        if let Some(reason) = failure {
            return Err(AudioError::microphone_unavailable(reason));
        }

        let window = &mut self.window;
        self.channels.drain(|samples| window.extend(samples));
        window.copy_into(frame);
        Ok(())
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        if let Err(err) = self.stream.pause() {
            log::warn!("[CpalBackend] Failed to pause input stream on release: {}", err);
        }
        log::debug!("[CpalBackend] Input stream released");
    }
}
