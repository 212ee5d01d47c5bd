//! Frame decode loop.
//!
//! Runs on the session's decode thread. Every iteration measures elapsed
//! wall-clock time, advances the presentation clock, decodes at most one
//! packet while the pending queue has room, and publishes the queue head to
//! the shared framebuffer once its timestamp is reached.
//!
//! Iterations shorter than the tick resolution are skipped, so the loop is an
//! at-least-once scheduler rather than a periodic one.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::audio::AudioSink;
use crate::clock::{PresentationClock, TimeSource};
use crate::config::PlayerConfig;
use crate::container::{ContainerBackend, PacketRoute};
use crate::error::MediaError;
use crate::frame_buffer::FrameBufferWriter;
use crate::frame_queue::{DecodedVideoFrame, PendingFrameQueue, QueueRejection};
use crate::metrics::{EventSender, PipelineMetrics, PlaybackEvent, StreamKind};
use crate::session::SessionFlags;

/// What a single [`DecodeLoop::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The session was closed; the loop must exit.
    Exit,
    /// Less than one tick elapsed.
    Skipped,
    /// Paused or finished; the clock did not move.
    Idle,
    /// Decode and publish steps ran.
    Ran,
}

/// Everything the loop shares with the host side.
pub struct LoopContext {
    pub flags: Arc<SessionFlags>,
    pub writer: FrameBufferWriter,
    pub sink: Option<Arc<dyn AudioSink>>,
    pub time: Arc<dyn TimeSource>,
    pub metrics: PipelineMetrics,
    pub events: EventSender,
}

pub struct DecodeLoop<B: ContainerBackend> {
    // Field order is drop order: codec contexts go before the sink.
    backend: B,
    queue: PendingFrameQueue,
    clock: PresentationClock,
    tick: Duration,
    input_done: bool,
    video_drained: bool,
    ctx: LoopContext,
}

impl<B: ContainerBackend> DecodeLoop<B> {
    pub fn new(backend: B, config: &PlayerConfig, ctx: LoopContext) -> Self {
        let start_time = backend.video_stream().start_time;
        let clock = PresentationClock::new(config.clock, start_time, ctx.time.now());
        Self {
            backend,
            queue: PendingFrameQueue::new(config.queue_capacity),
            clock,
            tick: config.tick_resolution,
            input_done: false,
            video_drained: false,
            ctx,
        }
    }

    /// Runs until the session is closed.
    pub fn run(mut self) {
        debug!("Decode loop started");
        loop {
            match self.step() {
                StepOutcome::Exit => break,
                StepOutcome::Skipped => thread::yield_now(),
                StepOutcome::Idle => thread::sleep(self.tick),
                StepOutcome::Ran => {}
            }
        }
        debug!(
            "Decode loop exiting ({} frames still queued)",
            self.queue.len()
        );
    }

    /// One loop iteration.
    pub fn step(&mut self) -> StepOutcome {
        if !self.ctx.flags.is_opened() {
            return StepOutcome::Exit;
        }

        let now = self.ctx.time.now();
        let elapsed = self.clock.elapsed(now);
        if elapsed.is_zero() || elapsed < self.tick {
            return StepOutcome::Skipped;
        }
        self.clock.mark(now);

        if !self.ctx.flags.is_playing() || self.ctx.flags.is_finished() {
            return StepOutcome::Idle;
        }

        let audio_position = self.ctx.sink.as_ref().and_then(|s| s.played_duration());
        self.clock.advance(elapsed, audio_position);

        if self.queue.has_space() {
            self.decode_step();
        }
        self.publish_step();
        self.check_finished();

        StepOutcome::Ran
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn video_time(&self) -> f64 {
        self.clock.video_time()
    }

    /// Produces at most one queued frame, reading at most one packet.
    fn decode_step(&mut self) {
        // Frames already buffered in the decoder come first
        match self.backend.receive_video() {
            Ok(Some(frame)) => {
                self.enqueue(frame);
                return;
            }
            Ok(None) => {}
            Err(e) => self.report(StreamKind::Video, e),
        }

        if self.input_done {
            if !self.video_drained {
                debug!("Video decoder drained");
                self.video_drained = true;
            }
            return;
        }

        let packet = match self.backend.read_packet() {
            Ok(Some(packet)) => packet,
            Ok(None) => {
                self.end_of_input();
                return;
            }
            Err(e) => {
                // An unreadable container cannot make progress
                self.report(StreamKind::Container, e);
                self.end_of_input();
                return;
            }
        };
        self.ctx.metrics.record_packet();

        match self.backend.route(&packet) {
            PacketRoute::Video => {
                if let Err(e) = self.backend.send_video(&packet) {
                    self.report(StreamKind::Video, e);
                    return;
                }
                match self.backend.receive_video() {
                    Ok(Some(frame)) => self.enqueue(frame),
                    Ok(None) => {}
                    Err(e) => self.report(StreamKind::Video, e),
                }
            }
            PacketRoute::Audio => match self.backend.decode_audio(&packet) {
                Ok(samples) if samples.is_empty() => {}
                Ok(samples) => self.push_audio(&samples),
                Err(e) => self.report(StreamKind::Audio, e),
            },
            PacketRoute::Ignore => {}
        }
    }

    fn publish_step(&mut self) {
        let Some(frame) = self.queue.pop_ready(self.clock.video_time()) else {
            return;
        };
        self.ctx.writer.publish(&frame.pixels);
        self.ctx.metrics.record_presented();
        trace!(
            "Presented frame pts={:.3} at video_time={:.3}",
            frame.pts,
            self.clock.video_time()
        );
    }

    fn enqueue(&mut self, frame: DecodedVideoFrame) {
        self.ctx.metrics.record_video_frame();
        match self.queue.push(frame) {
            Ok(()) => {}
            Err(QueueRejection::OutOfOrder) => self.ctx.metrics.record_dropped_frame(),
            Err(QueueRejection::Full) => {
                // decode_step only runs with room in the queue
                warn!("Pending queue full, dropping frame");
                self.ctx.metrics.record_dropped_frame();
            }
        }
    }

    fn push_audio(&mut self, samples: &[f32]) {
        let Some(sink) = &self.ctx.sink else {
            return;
        };
        match sink.put_data(samples) {
            Ok(()) => self.ctx.metrics.record_audio_frame(),
            Err(e) => self.report(StreamKind::Audio, e),
        }
    }

    fn end_of_input(&mut self) {
        debug!("End of input after {} packets", self.ctx.metrics.snapshot().packets_read);
        self.input_done = true;
        self.ctx.events.emit(PlaybackEvent::EndOfInput);
        if let Err(e) = self.backend.finish_video() {
            self.report(StreamKind::Video, e);
            self.video_drained = true;
        }
    }

    fn check_finished(&mut self) {
        if self.input_done && self.video_drained && self.queue.is_empty() {
            self.ctx.flags.set_finished(true);
            self.ctx.events.emit(PlaybackEvent::Finished);
            info!("Playback finished at video_time={:.3}", self.clock.video_time());
        }
    }

    fn report(&self, stream: StreamKind, err: MediaError) {
        match err {
            MediaError::Allocation(bytes) => {
                warn!("Skipping frame: failed to allocate {} bytes", bytes);
                self.ctx.metrics.record_allocation_failure();
                self.ctx.events.emit(PlaybackEvent::AllocationFailed { bytes });
            }
            other => {
                debug!("Skipping {:?} packet: {}", stream, other);
                self.ctx.metrics.record_decode_error();
                self.ctx.events.emit(PlaybackEvent::DecodeError {
                    stream,
                    message: other.to_string(),
                });
            }
        }
    }
}
