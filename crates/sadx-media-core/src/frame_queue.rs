//! Pending-frame queue for video playback.
//!
//! Decoded frames wait here until the presentation clock reaches their
//! timestamp. The queue is owned by the decode thread alone, so it needs no
//! locking: the only cross-thread handoff is the shared framebuffer.

use std::collections::VecDeque;

/// Default number of frames to buffer ahead.
pub const DEFAULT_BUFFER_SIZE: usize = 5;

/// A decoded frame in the presentation pixel format (BGRA, tightly packed).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedVideoFrame {
    /// Presentation timestamp in seconds.
    pub pts: f64,
    pub pixels: Vec<u8>,
}

impl DecodedVideoFrame {
    pub fn new(pts: f64, pixels: Vec<u8>) -> Self {
        Self { pts, pixels }
    }
}

/// Why a frame was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRejection {
    /// The queue already holds `capacity` frames.
    Full,
    /// The frame's timestamp precedes the last queued one.
    OutOfOrder,
}

/// Bounded FIFO of decoded frames in non-decreasing timestamp order.
#[derive(Debug)]
pub struct PendingFrameQueue {
    frames: VecDeque<DecodedVideoFrame>,
    capacity: usize,
    /// Timestamp of the most recently accepted frame
    last_pts: Option<f64>,
}

impl PendingFrameQueue {
    /// Creates a new queue with the specified capacity.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            last_pts: None,
        }
    }

    /// Creates a new queue with the default capacity.
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }

    /// Appends a frame.
    ///
    /// Rejected frames are dropped; the queue is left unchanged.
    pub fn push(&mut self, frame: DecodedVideoFrame) -> Result<(), QueueRejection> {
        if self.frames.len() >= self.capacity {
            return Err(QueueRejection::Full);
        }
        if self.last_pts.is_some_and(|last| frame.pts < last) {
            tracing::debug!(
                "Dropping out-of-order frame pts={:.3} (last={:.3?})",
                frame.pts,
                self.last_pts
            );
            return Err(QueueRejection::OutOfOrder);
        }

        self.last_pts = Some(frame.pts);
        self.frames.push_back(frame);
        Ok(())
    }

    /// Pops the head frame if its timestamp has been reached.
    pub fn pop_ready(&mut self, video_time: f64) -> Option<DecodedVideoFrame> {
        match self.frames.front() {
            Some(head) if head.pts <= video_time => self.frames.pop_front(),
            _ => None,
        }
    }

    /// Timestamp of the next frame to present.
    pub fn head_pts(&self) -> Option<f64> {
        self.frames.front().map(|f| f.pts)
    }

    /// Returns true when another frame may be decoded.
    pub fn has_space(&self) -> bool {
        self.frames.len() < self.capacity
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

    /// Drops all queued frames.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.last_pts = None;
    }
}
