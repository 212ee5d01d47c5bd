//! Triple buffer for the shared presentation framebuffer.
//!
//! The decode thread publishes frames and the host thread polls for them.
//! Three fixed-size pixel buffers rotate between the two sides:
//!
//! - **Back buffer**: the decode thread copies the next frame here
//! - **Middle buffer**: latest published frame, waiting to be taken
//! - **Front buffer**: the host copies out of this one
//!
//! The buffer roles and the "fresh frame" bit share one atomic byte, so a
//! publish (swap back↔middle, set fresh) and a take (swap middle↔front,
//! clear fresh) are each a single compare-and-swap. The host can never see
//! the fresh bit without the matching buffer, and never reads a buffer the
//! decode thread is writing. Each pixel buffer still sits behind its own
//! mutex, which the role rotation keeps uncontended.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::MediaError;

/// Set while the middle buffer holds a frame the reader has not taken.
const FRESH: u8 = 0x40;

/// Packed as: fresh bit | (back_idx << 4) | (middle_idx << 2) | front_idx
struct BufferState(AtomicU8);

impl BufferState {
    fn new() -> Self {
        Self(AtomicU8::new(Self::pack(0, 1, 2)))
    }

    fn unpack(packed: u8) -> (usize, usize, usize) {
        let back = ((packed >> 4) & 0x3) as usize;
        let middle = ((packed >> 2) & 0x3) as usize;
        let front = (packed & 0x3) as usize;
        (back, middle, front)
    }

    fn pack(back: usize, middle: usize, front: usize) -> u8 {
        ((back as u8) << 4) | ((middle as u8) << 2) | (front as u8)
    }

    /// Publishes the back buffer: swap back↔middle and mark it fresh.
    fn publish(&self) {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let (back, middle, front) = Self::unpack(current);
            let next = Self::pack(middle, back, front) | FRESH;
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Takes the fresh frame: swap middle↔front and clear the fresh bit.
    /// Returns the new front index, or None when nothing is fresh.
    fn take(&self) -> Option<usize> {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current & FRESH == 0 {
                return None;
            }
            let (back, middle, front) = Self::unpack(current);
            let next = Self::pack(back, front, middle);
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Some(middle),
                Err(actual) => current = actual,
            }
        }
    }

    fn back(&self) -> usize {
        Self::unpack(self.0.load(Ordering::Acquire)).0
    }

    fn is_fresh(&self) -> bool {
        self.0.load(Ordering::Acquire) & FRESH != 0
    }
}

struct FrameBufferInner {
    buffers: [Mutex<Vec<u8>>; 3],
    state: BufferState,
    frame_size: usize,
}

/// Producer end, held by the decode thread.
pub struct FrameBufferWriter {
    inner: Arc<FrameBufferInner>,
}

/// Consumer end, held by the playback controller.
#[derive(Clone)]
pub struct FrameBufferReader {
    inner: Arc<FrameBufferInner>,
}

impl FrameBufferWriter {
    /// Copies `pixels` into the back buffer and publishes it.
    ///
    /// Short input leaves the rest of the buffer untouched; extra input is
    /// ignored.
    pub fn publish(&self, pixels: &[u8]) {
        let back = self.inner.state.back();
        {
            let mut guard = self.inner.buffers[back].lock();
            let n = pixels.len().min(guard.len());
            guard[..n].copy_from_slice(&pixels[..n]);
        }
        self.inner.state.publish();
    }

    pub fn frame_size(&self) -> usize {
        self.inner.frame_size
    }
}

impl FrameBufferReader {
    /// Copies the latest published frame into `dst`.
    ///
    /// Returns false, leaving `dst` untouched, when no frame has been
    /// published since the last successful read or when `dst` is smaller
    /// than a frame.
    pub fn read_into(&self, dst: &mut [u8]) -> bool {
        if dst.len() < self.inner.frame_size {
            return false;
        }
        let Some(front) = self.inner.state.take() else {
            return false;
        };
        let guard = self.inner.buffers[front].lock();
        dst[..guard.len()].copy_from_slice(&guard);
        true
    }

    /// Returns true if a new frame is available to read.
    pub fn has_new_frame(&self) -> bool {
        self.inner.state.is_fresh()
    }

    pub fn frame_size(&self) -> usize {
        self.inner.frame_size
    }
}

/// Creates a framebuffer pair for frames of `frame_size` bytes.
pub fn frame_buffer(frame_size: usize) -> Result<(FrameBufferWriter, FrameBufferReader), MediaError> {
    let inner = Arc::new(FrameBufferInner {
        buffers: [
            Mutex::new(zeroed(frame_size)?),
            Mutex::new(zeroed(frame_size)?),
            Mutex::new(zeroed(frame_size)?),
        ],
        state: BufferState::new(),
        frame_size,
    });

    Ok((
        FrameBufferWriter {
            inner: Arc::clone(&inner),
        },
        FrameBufferReader { inner },
    ))
}

fn zeroed(size: usize) -> Result<Vec<u8>, MediaError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| MediaError::Allocation(size))?;
    buf.resize(size, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_then_read() {
        let (writer, reader) = frame_buffer(4).unwrap();
        let mut dst = [0u8; 4];

        assert!(!reader.read_into(&mut dst));
        writer.publish(&[1, 2, 3, 4]);
        assert!(reader.has_new_frame());
        assert!(reader.read_into(&mut dst));
        assert_eq!(dst, [1, 2, 3, 4]);
    }

    #[test]
    fn test_second_read_without_publish_is_false() {
        let (writer, reader) = frame_buffer(2).unwrap();
        writer.publish(&[7, 7]);

        let mut dst = [0u8; 2];
        assert!(reader.read_into(&mut dst));
        dst = [9, 9];
        assert!(!reader.read_into(&mut dst));
        assert_eq!(dst, [9, 9]);
    }

    #[test]
    fn test_latest_frame_wins() {
        let (writer, reader) = frame_buffer(1).unwrap();
        writer.publish(&[1]);
        writer.publish(&[2]);
        writer.publish(&[3]);

        let mut dst = [0u8; 1];
        assert!(reader.read_into(&mut dst));
        assert_eq!(dst, [3]);
        assert!(!reader.read_into(&mut dst));
    }

    #[test]
    fn test_short_destination_is_rejected() {
        let (writer, reader) = frame_buffer(8).unwrap();
        writer.publish(&[5; 8]);

        let mut small = [0u8; 4];
        assert!(!reader.read_into(&mut small));
        // The frame is still pending for a proper buffer
        let mut dst = [0u8; 8];
        assert!(reader.read_into(&mut dst));
        assert_eq!(dst, [5; 8]);
    }

    #[test]
    fn test_concurrent_frames_are_never_torn() {
        const SIZE: usize = 4096;
        let (writer, reader) = frame_buffer(SIZE).unwrap();

        let producer = std::thread::spawn(move || {
            let mut frame = vec![0u8; SIZE];
            for i in 1..=2000u32 {
                frame.fill((i % 251) as u8);
                writer.publish(&frame);
            }
        });

        let mut dst = vec![0u8; SIZE];
        let mut reads = 0;
        while !producer.is_finished() || reader.has_new_frame() {
            if reader.read_into(&mut dst) {
                let first = dst[0];
                assert!(dst.iter().all(|&b| b == first), "torn frame");
                reads += 1;
            }
        }
        producer.join().unwrap();
        assert!(reads > 0);
    }
}
