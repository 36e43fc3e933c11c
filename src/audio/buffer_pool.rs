// BufferPool - lock-free buffer pool with dual SPSC queues
//
// Moves captured microphone samples from the real-time input callback to
// the detector loop without allocating or locking in the callback.
//
// Architecture:
// - DATA_QUEUE: input callback pushes filled buffers, detector loop consumes
// - POOL_QUEUE: detector loop returns drained buffers, input callback recycles
//
// Buffer flow:
// 1. Input callback pops an empty buffer from POOL_QUEUE
// 2. Input callback averages each interleaved frame to mono into it
// 3. Input callback pushes the filled buffer to DATA_QUEUE, taking further
//    buffers while the block is longer than one buffer
// 4. Detector loop pops filled buffers from DATA_QUEUE into its frame window
// 5. Detector loop pushes the drained buffer back to POOL_QUEUE
//
// When the pool is exhausted the callback drops the rest of the incoming
// block; the detector only ever looks at the most recent frame.

use rtrb::{Consumer, Producer};

use crate::error::AudioError;

/// Audio buffer type - pre-allocated vector of f32 samples
pub type AudioBuffer = Vec<f32>;

/// Ends of the queues owned by the real-time input callback
pub struct InputCallbackChannels {
    /// Producer for sending filled buffers to the detector loop
    pub data_producer: Producer<AudioBuffer>,
    /// Consumer for retrieving empty buffers
    pub pool_consumer: Consumer<AudioBuffer>,
}

/// Ends of the queues owned by the detector loop
pub struct DetectorChannels {
    /// Consumer for receiving filled buffers from the input callback
    pub data_consumer: Consumer<AudioBuffer>,
    /// Producer for returning drained buffers
    pub pool_producer: Producer<AudioBuffer>,
}

/// Split buffer pool channels for producer/consumer separation
pub struct BufferPoolChannels {
    pub data_producer: Producer<AudioBuffer>,
    pub data_consumer: Consumer<AudioBuffer>,
    pub pool_producer: Producer<AudioBuffer>,
    pub pool_consumer: Consumer<AudioBuffer>,
}

impl BufferPoolChannels {
    /// Split into the callback half and the detector half
    pub fn split(self) -> (InputCallbackChannels, DetectorChannels) {
        (
            InputCallbackChannels {
                data_producer: self.data_producer,
                pool_consumer: self.pool_consumer,
            },
            DetectorChannels {
                data_consumer: self.data_consumer,
                pool_producer: self.pool_producer,
            },
        )
    }
}

/// Lock-free buffer pool using dual SPSC ring buffers
///
/// # Example
/// ```
/// use range_trainer::audio::BufferPool;
///
/// let (mut callback, mut detector) = BufferPool::new(4, 256).unwrap().split();
///
/// // In the input callback:
/// callback.push_downmixed(&[0.5, 0.25, -0.5, -0.25], 2);
///
/// // In the detector loop:
/// let mut received = Vec::new();
/// detector.drain(|samples| received.extend_from_slice(samples));
/// assert_eq!(received, vec![0.375, -0.375]);
/// ```
pub struct BufferPool;

impl BufferPool {
    /// Create a new pool with every buffer pre-allocated in POOL_QUEUE
    ///
    /// # Errors
    /// `InvalidConfig` if `buffer_count` or `buffer_size` is 0
    #[allow(clippy::new_ret_no_self)]
    pub fn new(buffer_count: usize, buffer_size: usize) -> Result<BufferPoolChannels, AudioError> {
        if buffer_count == 0 {
            return Err(AudioError::InvalidConfig {
                reason: "buffer_count must be greater than 0".to_string(),
            });
        }
        if buffer_size == 0 {
            return Err(AudioError::InvalidConfig {
                reason: "buffer_size must be greater than 0".to_string(),
            });
        }

        let (mut pool_producer, pool_consumer) = rtrb::RingBuffer::new(buffer_count);
        let (data_producer, data_consumer) = rtrb::RingBuffer::new(buffer_count);

        // The only place where buffers are allocated
        for _ in 0..buffer_count {
            if pool_producer
                .push(Vec::with_capacity(buffer_size))
                .is_err()
            {
                break;
            }
        }

        Ok(BufferPoolChannels {
            data_producer,
            data_consumer,
            pool_producer,
            pool_consumer,
        })
    }
}

impl InputCallbackChannels {
    /// Average each interleaved frame to mono and queue it in pooled buffers
    ///
    /// Blocks longer than one buffer spill into as many buffers as needed.
    /// Returns `false` when the pool ran dry and the rest of the block was
    /// dropped. Never allocates.
    pub fn push_downmixed(&mut self, data: &[f32], channels: usize) -> bool {
        self.push_downmixed_with(data, channels, |sample| sample)
    }

    /// Same as `push_downmixed` for integer formats, converting each sample
    pub fn push_downmixed_with<T, F>(&mut self, data: &[T], channels: usize, convert: F) -> bool
    where
        T: Copy,
        F: Fn(T) -> f32,
    {
        let mut frames = data.chunks(channels.max(1)).peekable();
        while frames.peek().is_some() {
            let Ok(mut buffer) = self.pool_consumer.pop() else {
                return false;
            };

            buffer.clear();
            let room = buffer.capacity().max(1);
            buffer.extend(frames.by_ref().take(room).map(|frame| {
                frame.iter().map(|&sample| convert(sample)).sum::<f32>() / frame.len() as f32
            }));

            if self.data_producer.push(buffer).is_err() {
                return false;
            }
        }
        true
    }
}

impl DetectorChannels {
    /// Hand every filled buffer to `consume`, then recycle it
    ///
    /// Returns the number of samples drained.
    pub fn drain<F: FnMut(&[f32])>(&mut self, mut consume: F) -> usize {
        let mut drained = 0;
        while let Ok(buffer) = self.data_consumer.pop() {
            drained += buffer.len();
            consume(&buffer);
            let _ = self.pool_producer.push(buffer);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::rms;
    use crate::audio::FrameWindow;
    use crate::config::AppConfig;

    #[test]
    fn test_buffer_pool_creation() {
        let mut channels = BufferPool::new(16, 2048).unwrap();

        let mut available_buffers = 0;
        while let Ok(buffer) = channels.pool_consumer.pop() {
            assert!(buffer.capacity() >= 2048);
            available_buffers += 1;
        }
        assert_eq!(available_buffers, 16, "Expected 16 buffers in pool queue");
        assert!(
            channels.data_consumer.pop().is_err(),
            "Data queue should be empty initially"
        );
    }

    #[test]
    fn test_zero_sizes_rejected() {
        assert!(matches!(
            BufferPool::new(0, 1024),
            Err(AudioError::InvalidConfig { .. })
        ));
        assert!(matches!(
            BufferPool::new(16, 0),
            Err(AudioError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_frames_are_averaged_to_mono() {
        let (mut callback, mut detector) = BufferPool::new(2, 8).unwrap().split();
        assert!(callback.push_downmixed(&[1.0, 3.0, 2.0, 9.0, -4.0, 4.0], 2));

        let mut received = Vec::new();
        let drained = detector.drain(|samples| received.extend_from_slice(samples));
        assert_eq!(drained, 3);
        assert_eq!(received, vec![2.0, 5.5, 0.0]);
    }

    #[test]
    fn test_integer_samples_are_converted_before_averaging() {
        let (mut callback, mut detector) = BufferPool::new(1, 4).unwrap().split();
        assert!(callback.push_downmixed_with(&[16384i16, 0, -32768, 0], 2, |s| {
            s as f32 / 32768.0
        }));

        let mut received = Vec::new();
        detector.drain(|samples| received.extend_from_slice(samples));
        assert_eq!(received, vec![0.25, -0.5]);
    }

    #[test]
    fn test_oversized_block_spills_across_buffers() {
        let (mut callback, mut detector) = BufferPool::new(4, 4).unwrap().split();
        let block: Vec<f32> = (0..10).map(|i| i as f32).collect();
        assert!(callback.push_downmixed(&block, 1));

        let mut received = Vec::new();
        assert_eq!(detector.drain(|samples| received.extend_from_slice(samples)), 10);
        assert_eq!(received, block);
    }

    #[test]
    fn test_spike_at_end_of_oversized_block_reaches_frame() {
        let config = AppConfig::default();
        let frame_size = config.sampling.frame_size;
        assert!(frame_size > config.audio.buffer_size);
        let (mut callback, mut detector) =
            BufferPool::new(config.audio.buffer_pool_size, config.audio.buffer_size)
                .unwrap()
                .split();

        // One callback delivering a whole frame, with the shot near its end.
        let spike_start = frame_size * 3 / 4;
        let block: Vec<f32> = (0..frame_size)
            .map(|i| if (spike_start..spike_start + 64).contains(&i) { 0.9 } else { 0.01 })
            .collect();
        assert!(callback.push_downmixed(&block, 1));

        let mut window = FrameWindow::new(frame_size);
        detector.drain(|samples| window.extend(samples));
        let mut frame = Vec::new();
        window.copy_into(&mut frame);

        assert_eq!(frame.len(), frame_size);
        assert!(rms(&frame) > 0.15, "spike lost: rms {}", rms(&frame));
    }

    #[test]
    fn test_exhausted_pool_drops_blocks_until_recycled() {
        let (mut callback, mut detector) = BufferPool::new(2, 16).unwrap().split();

        assert!(callback.push_downmixed(&[0.1; 4], 1));
        assert!(callback.push_downmixed(&[0.2; 4], 1));
        assert!(!callback.push_downmixed(&[0.3; 4], 1));

        assert_eq!(detector.drain(|_| {}), 8);
        assert!(callback.push_downmixed(&[0.4; 4], 1));
    }

    #[test]
    fn test_exhausted_pool_keeps_leading_part_of_block() {
        let (mut callback, mut detector) = BufferPool::new(2, 4).unwrap().split();
        assert!(!callback.push_downmixed(&[0.5; 10], 1));
        assert_eq!(detector.drain(|_| {}), 8);
    }

    #[test]
    fn test_send() {
        fn assert_send<T: Send>() {}
        assert_send::<InputCallbackChannels>();
        assert_send::<DetectorChannels>();
    }
}
