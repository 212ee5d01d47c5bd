//! Decode pipeline counters and playback events.
//!
//! Decode errors inside the loop never reach the host's boolean API. They are
//! counted here and, when a listener is attached, reported as
//! [`PlaybackEvent`]s on a bounded channel. Events are dropped rather than
//! blocking the decode thread when the channel is full.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// Something noteworthy that happened on the decode thread.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// A packet failed to decode and was skipped.
    DecodeError { stream: StreamKind, message: String },
    /// A frame copy could not be allocated and was skipped.
    AllocationFailed { bytes: usize },
    /// The demuxer has no more packets.
    EndOfInput,
    /// Every frame has been presented.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Container,
}

/// Pipeline counters. Clones share the same counters.
#[derive(Clone, Default)]
pub struct PipelineMetrics {
    inner: Arc<PipelineMetricsInner>,
}

#[derive(Default)]
struct PipelineMetricsInner {
    packets_read: AtomicU64,
    video_frames_decoded: AtomicU64,
    audio_frames_pushed: AtomicU64,
    frames_presented: AtomicU64,
    decode_errors: AtomicU64,
    frames_dropped: AtomicU64,
    allocation_failures: AtomicU64,
    events_dropped: AtomicU64,
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_read: u64,
    pub video_frames_decoded: u64,
    pub audio_frames_pushed: u64,
    pub frames_presented: u64,
    pub decode_errors: u64,
    /// Frames rejected for breaking timestamp order.
    pub frames_dropped: u64,
    pub allocation_failures: u64,
    pub events_dropped: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_packet(&self) {
        self.inner.packets_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_video_frame(&self) {
        self.inner.video_frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio_frame(&self) {
        self.inner.audio_frames_pushed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_presented(&self) {
        self.inner.frames_presented.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.inner.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_frame(&self) {
        self.inner.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_allocation_failure(&self) {
        self.inner.allocation_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_event_dropped(&self) {
        self.inner.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let i = &self.inner;
        MetricsSnapshot {
            packets_read: i.packets_read.load(Ordering::Relaxed),
            video_frames_decoded: i.video_frames_decoded.load(Ordering::Relaxed),
            audio_frames_pushed: i.audio_frames_pushed.load(Ordering::Relaxed),
            frames_presented: i.frames_presented.load(Ordering::Relaxed),
            decode_errors: i.decode_errors.load(Ordering::Relaxed),
            frames_dropped: i.frames_dropped.load(Ordering::Relaxed),
            allocation_failures: i.allocation_failures.load(Ordering::Relaxed),
            events_dropped: i.events_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Sending half of the event channel, owned by the decode loop.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<PlaybackEvent>,
    metrics: PipelineMetrics,
}

impl EventSender {
    /// Sends without blocking; a full or disconnected channel drops the event.
    pub fn emit(&self, event: PlaybackEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.metrics.record_event_dropped(),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

/// Creates a bounded event channel whose overflow is counted in `metrics`.
pub fn event_channel(
    capacity: usize,
    metrics: PipelineMetrics,
) -> (EventSender, Receiver<PlaybackEvent>) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    (EventSender { tx, metrics }, rx)
}
