// FrameWindow - the most recent N samples of a mono stream
//
// Blocks arriving from the input callback are appended; the window keeps only
// the newest `capacity` samples, which form the frame analysed on each tick.

use std::collections::VecDeque;

pub struct FrameWindow {
    samples: VecDeque<f32>,
    capacity: usize,
}

impl FrameWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn extend(&mut self, block: &[f32]) {
        let block = if block.len() > self.capacity {
            &block[block.len() - self.capacity..]
        } else {
            block
        };

        let overflow = (self.samples.len() + block.len()).saturating_sub(self.capacity);
        self.samples.drain(..overflow);
        self.samples.extend(block.iter().copied());
    }

    /// Replace `frame` with the window contents, oldest sample first
    pub fn copy_into(&self, frame: &mut Vec<f32>) {
        frame.clear();
        frame.extend(self.samples.iter().copied());
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
