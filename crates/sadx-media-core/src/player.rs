//! Playback controller.
//!
//! Owns at most one [`MediaSession`] and wires it together: the container
//! backend, the audio sink, the shared framebuffer and the decode thread.
//! All methods are called from the host thread.

use std::sync::Arc;
use std::thread;

use crossbeam_channel::Receiver;
use tracing::{info, warn};

use crate::audio::{AudioOutput, AudioSink, NullAudioOutput};
use crate::clock::{MonotonicTime, TimeSource};
use crate::config::PlayerConfig;
use crate::container::{BackendOpener, ContainerBackend, OpenRequest};
use crate::decode_loop::{DecodeLoop, LoopContext};
use crate::error::MediaError;
use crate::frame_buffer::frame_buffer;
use crate::metrics::{event_channel, MetricsSnapshot, PipelineMetrics, PlaybackEvent};
use crate::session::{MediaSession, SessionFlags, SessionState};

const DECODE_THREAD_NAME: &str = "sadx-media-decode";

pub struct PlaybackController<O: BackendOpener> {
    opener: O,
    audio: Arc<dyn AudioOutput>,
    time: Arc<dyn TimeSource>,
    config: PlayerConfig,
    state: SessionState,
    session: Option<MediaSession>,
}

impl<O: BackendOpener> PlaybackController<O> {
    /// Creates a controller that discards audio.
    pub fn new(opener: O, config: PlayerConfig) -> Self {
        Self::with_audio_output(opener, Arc::new(NullAudioOutput), config)
    }

    pub fn with_audio_output(opener: O, audio: Arc<dyn AudioOutput>, config: PlayerConfig) -> Self {
        Self {
            opener,
            audio,
            time: Arc::new(MonotonicTime::new()),
            config,
            state: SessionState::Idle,
            session: None,
        }
    }

    /// Replaces the wall clock used by future sessions.
    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    /// Opens `path`, closing any current session first.
    ///
    /// The path bytes reach the backend unchanged. On failure nothing is left
    /// running and the controller is idle.
    pub fn open(&mut self, path: impl AsRef<[u8]>, legacy_audio: bool) -> Result<(), MediaError> {
        self.close();

        let request = OpenRequest::new(path.as_ref(), legacy_audio);
        self.state = SessionState::Opening;
        match self.start_session(&request) {
            Ok(session) => {
                info!(
                    "Opened {} ({}x{}, audio={})",
                    request.display_path(),
                    session.width,
                    session.height,
                    session.sink.is_some()
                );
                self.session = Some(session);
                self.state = SessionState::Running;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to open {}: {}", request.display_path(), e);
                self.state = SessionState::Idle;
                Err(e)
            }
        }
    }

    fn start_session(&self, request: &OpenRequest) -> Result<MediaSession, MediaError> {
        let backend = self.opener.open(request)?;
        let video = backend.video_stream().clone();
        let frame_size = video
            .frame_size()
            .filter(|&size| size > 0)
            .ok_or_else(|| {
                MediaError::DecoderInit(format!("invalid frame size {}x{}", video.width, video.height))
            })?;
        let (writer, reader) = frame_buffer(frame_size)?;

        let sink: Option<Arc<dyn AudioSink>> = match backend.audio_format() {
            Some(format) => {
                let sink = self.audio.create_push_stream(format)?;
                sink.play()?;
                Some(sink)
            }
            None => None,
        };

        let metrics = PipelineMetrics::new();
        let (events_tx, events) = event_channel(self.config.event_capacity, metrics.clone());
        let flags = Arc::new(SessionFlags::new());
        flags.set_opened(true);

        let decode = DecodeLoop::new(
            backend,
            &self.config,
            LoopContext {
                flags: Arc::clone(&flags),
                writer,
                sink: sink.clone(),
                time: Arc::clone(&self.time),
                metrics: metrics.clone(),
                events: events_tx,
            },
        );

        // Spawned last so every failure above leaves no thread behind
        let thread = thread::Builder::new()
            .name(DECODE_THREAD_NAME.to_string())
            .spawn(move || decode.run())
            .map_err(|e| {
                if let Some(sink) = &sink {
                    let _ = sink.pause();
                }
                MediaError::Thread(e)
            })?;

        Ok(MediaSession {
            flags,
            reader,
            sink,
            width: video.width,
            height: video.height,
            metrics,
            events,
            thread: Some(thread),
        })
    }

    /// Stops the decode thread and releases every session resource.
    pub fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            self.state = SessionState::Closing;
            session.close();
            info!("Closed media session");
        }
        self.state = SessionState::Idle;
    }

    pub fn play(&self) {
        let Some(session) = &self.session else {
            return;
        };
        session.flags.set_playing(true);
        if let Some(sink) = &session.sink {
            if let Err(e) = sink.play() {
                warn!("Failed to start audio: {}", e);
            }
        }
    }

    pub fn pause(&self) {
        let Some(session) = &self.session else {
            return;
        };
        session.flags.set_playing(false);
        if let Some(sink) = &session.sink {
            if let Err(e) = sink.pause() {
                warn!("Failed to pause audio: {}", e);
            }
        }
    }

    /// Copies the latest unseen frame into `dst`.
    ///
    /// Returns false, leaving `dst` untouched, when no session is open, no
    /// new frame has been published, or `dst` is shorter than
    /// `width * height * 4`.
    pub fn try_get_frame(&self, dst: &mut [u8]) -> bool {
        match &self.session {
            Some(session) if session.flags.is_opened() => session.reader.read_into(dst),
            _ => false,
        }
    }

    /// True once every frame of the current session has been presented.
    pub fn finished(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.flags.is_finished())
    }

    pub fn is_playing(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.flags.is_playing())
    }

    pub fn width(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.width)
    }

    pub fn height(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.height)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn metrics(&self) -> Option<MetricsSnapshot> {
        self.session.as_ref().map(|s| s.metrics.snapshot())
    }

    /// Events of the current session.
    pub fn events(&self) -> Option<Receiver<PlaybackEvent>> {
        self.session.as_ref().map(|s| s.events.clone())
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }
}

impl<O: BackendOpener> Drop for PlaybackController<O> {
    fn drop(&mut self) {
        self.close();
    }
}
