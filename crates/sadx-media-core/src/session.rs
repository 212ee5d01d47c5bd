//! Media session state shared between the host thread and the decode thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;

use crate::audio::AudioSink;
use crate::frame_buffer::FrameBufferReader;
use crate::metrics::{PipelineMetrics, PlaybackEvent};

/// Lifecycle of the controller's session slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session.
    Idle,
    /// Contexts are being created; no thread yet.
    Opening,
    /// Decode thread active.
    Running,
    /// Flags cleared, thread being joined.
    Closing,
}

/// Flags read by the decode loop every iteration.
#[derive(Debug, Default)]
pub struct SessionFlags {
    opened: AtomicBool,
    playing: AtomicBool,
    finished: AtomicBool,
}

impl SessionFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_opened(&self) -> bool {
        self.opened.load(Ordering::Acquire)
    }

    pub fn set_opened(&self, value: bool) {
        self.opened.store(value, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn set_playing(&self, value: bool) {
        self.playing.store(value, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn set_finished(&self, value: bool) {
        self.finished.store(value, Ordering::Release);
    }
}

/// Host-side handle of one open container.
///
/// The decode thread owns the container backend; this side keeps the shared
/// flags, the framebuffer reader and the audio sink. Dropping the session
/// closes it.
pub struct MediaSession {
    pub(crate) flags: Arc<SessionFlags>,
    pub(crate) reader: FrameBufferReader,
    pub(crate) sink: Option<Arc<dyn AudioSink>>,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) metrics: PipelineMetrics,
    pub(crate) events: Receiver<PlaybackEvent>,
    pub(crate) thread: Option<JoinHandle<()>>,
}

impl MediaSession {
    pub fn flags(&self) -> &SessionFlags {
        &self.flags
    }

    /// Clears the flags and joins the decode thread.
    ///
    /// The thread drops the backend on exit, so every codec context is gone
    /// before the audio sink is released here.
    pub fn close(&mut self) {
        self.flags.set_opened(false);
        self.flags.set_playing(false);
        self.flags.set_finished(false);

        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("Decode thread panicked");
            }
        }

        if let Some(sink) = self.sink.take() {
            if let Err(e) = sink.pause() {
                tracing::warn!("Failed to pause audio sink: {}", e);
            }
        }
    }
}

impl Drop for MediaSession {
    fn drop(&mut self) {
        self.close();
    }
}
