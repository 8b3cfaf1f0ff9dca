//! Pre-readiness audio buffer.

use std::collections::VecDeque;
use tracing::warn;

use crate::core::codec::AudioFrame;

/// Bounded FIFO of inbound frames held until the transcoder and upstream are
/// both ready.
///
/// When full, the oldest frame is dropped. The queue is drained exactly once
/// by [`PendingAudio::take_all`], after which it is retired and rejects
/// further frames.
#[derive(Debug)]
pub struct PendingAudio {
    frames: VecDeque<AudioFrame>,
    capacity: usize,
    dropped: u64,
    retired: bool,
}

impl PendingAudio {
    /// Queue holding up to `capacity` frames. A zero capacity is raised to one
    /// with a warning.
    pub fn new(capacity: usize) -> Self {
        if capacity == 0 {
            warn!("Pending audio capacity of zero raised to one frame");
        }
        Self {
            frames: VecDeque::with_capacity(capacity.clamp(1, 64)),
            capacity: capacity.max(1),
            dropped: 0,
            retired: false,
        }
    }

    /// Queue a frame. Returns `false` if the queue has been retired.
    pub fn push(&mut self, frame: AudioFrame) -> bool {
        if self.retired {
            return false;
        }

        if self.frames.len() >= self.capacity
            && let Some(oldest) = self.frames.pop_front()
        {
            self.dropped += 1;
            warn!(
                sequence = oldest.sequence,
                capacity = self.capacity,
                "Pending audio queue full, dropping oldest frame"
            );
        }
        self.frames.push_back(frame);
        true
    }

    /// Remove every queued frame in arrival order and retire the queue.
    pub fn take_all(&mut self) -> Vec<AudioFrame> {
        self.retired = true;
        self.frames.drain(..).collect()
    }

    /// Discard queued frames and retire the queue. Returns how many were
    /// discarded.
    pub fn discard(&mut self) -> usize {
        self.retired = true;
        let count = self.frames.len();
        self.frames.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn is_retired(&self) -> bool {
        self.retired
    }
}
