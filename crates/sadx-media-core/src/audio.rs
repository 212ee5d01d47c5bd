//! Push-mode audio sink seam.
//!
//! The decode loop resamples every audio frame to interleaved f32 and pushes
//! it straight into an [`AudioSink`]; there is no intermediate queue. The
//! host's mixing library owns the device and implements [`AudioOutput`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::MediaError;

/// Format of the samples pushed into a sink: interleaved f32.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// A push-mode audio stream.
///
/// Used from both the decode thread (`put_data`) and the host thread
/// (transport), so implementations must be internally synchronized.
pub trait AudioSink: Send + Sync {
    /// Queues interleaved samples for playback.
    fn put_data(&self, samples: &[f32]) -> Result<(), MediaError>;

    /// Starts or resumes output.
    fn play(&self) -> Result<(), MediaError>;

    /// Pauses output, keeping queued data.
    fn pause(&self) -> Result<(), MediaError>;

    /// Media time actually played out, if the sink can report it.
    fn played_duration(&self) -> Option<Duration> {
        None
    }
}

/// Creates push-mode sinks for new sessions.
pub trait AudioOutput: Send + Sync {
    fn create_push_stream(&self, format: AudioFormat) -> Result<Arc<dyn AudioSink>, MediaError>;
}

/// Output that discards audio. Sessions using it are paced by the wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudioOutput;

struct NullSink;

impl AudioSink for NullSink {
    fn put_data(&self, _samples: &[f32]) -> Result<(), MediaError> {
        Ok(())
    }

    fn play(&self) -> Result<(), MediaError> {
        Ok(())
    }

    fn pause(&self) -> Result<(), MediaError> {
        Ok(())
    }
}

impl AudioOutput for NullAudioOutput {
    fn create_push_stream(&self, _format: AudioFormat) -> Result<Arc<dyn AudioSink>, MediaError> {
        Ok(Arc::new(NullSink))
    }
}

/// Sink that keeps everything pushed into it.
///
/// Reports no played position, so the clock falls back to wall-clock pacing.
/// Useful for hosts that mix audio themselves and for tests.
#[derive(Default)]
pub struct MemorySink {
    format: Option<AudioFormat>,
    samples: Mutex<Vec<f32>>,
    playing: AtomicBool,
    pushes: AtomicU64,
}

impl MemorySink {
    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    pub fn samples(&self) -> Vec<f32> {
        self.samples.lock().clone()
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    /// Number of `put_data` calls.
    pub fn push_count(&self) -> u64 {
        self.pushes.load(Ordering::Relaxed)
    }
}

impl AudioSink for MemorySink {
    fn put_data(&self, samples: &[f32]) -> Result<(), MediaError> {
        self.samples.lock().extend_from_slice(samples);
        self.pushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn play(&self) -> Result<(), MediaError> {
        self.playing.store(true, Ordering::Release);
        Ok(())
    }

    fn pause(&self) -> Result<(), MediaError> {
        self.playing.store(false, Ordering::Release);
        Ok(())
    }
}

/// Output handing out [`MemorySink`]s and remembering the last one.
#[derive(Default, Clone)]
pub struct MemoryAudioOutput {
    last: Arc<Mutex<Option<Arc<MemorySink>>>>,
}

impl MemoryAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sink created for the most recent session.
    pub fn last_sink(&self) -> Option<Arc<MemorySink>> {
        self.last.lock().clone()
    }
}

impl AudioOutput for MemoryAudioOutput {
    fn create_push_stream(&self, format: AudioFormat) -> Result<Arc<dyn AudioSink>, MediaError> {
        let sink = Arc::new(MemorySink {
            format: Some(format),
            ..Default::default()
        });
        *self.last.lock() = Some(Arc::clone(&sink));
        Ok(sink)
    }
}
