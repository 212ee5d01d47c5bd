//! Presentation clock.
//!
//! The decode loop keeps a virtual playback clock (`video_time`, seconds)
//! and the wall-clock instant of its last iteration (`real_time`). Each
//! running iteration advances the virtual clock either from the audio sink's
//! played position or from damped wall-clock elapsed time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::ClockConfig;

/// Monotonic time source, as an offset from an arbitrary origin.
pub trait TimeSource: Send + Sync + 'static {
    fn now(&self) -> Duration;
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually driven time source. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    micros: Arc<AtomicU64>,
}

impl ManualTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.micros.fetch_add(by.as_micros() as u64, Ordering::AcqRel);
    }

    pub fn set(&self, to: Duration) {
        self.micros.store(to.as_micros() as u64, Ordering::Release);
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::Acquire))
    }
}

/// Virtual playback clock owned by the decode thread.
#[derive(Debug, Clone)]
pub struct PresentationClock {
    config: ClockConfig,
    start_time: f64,
    video_time: f64,
    real_time: Duration,
    /// Sink position seen on the previous advance.
    last_audio: Duration,
}

impl PresentationClock {
    /// Creates a clock at `start_time` seconds, sampled at `now`.
    pub fn new(config: ClockConfig, start_time: f64, now: Duration) -> Self {
        Self {
            config,
            start_time,
            video_time: start_time,
            real_time: now,
            last_audio: Duration::ZERO,
        }
    }

    /// Wall-clock time since the last [`mark`](Self::mark).
    pub fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.real_time)
    }

    /// Records `now` as the last iteration instant.
    pub fn mark(&mut self, now: Duration) {
        self.real_time = now;
    }

    /// Advances the virtual clock.
    ///
    /// With audio-master enabled the clock tracks the sink's played position
    /// while that position moves forward. A missing, zero or stalled position
    /// (audio ended, sink starved) falls back to `elapsed × damping` from the
    /// current time. The clock never moves backwards.
    pub fn advance(&mut self, elapsed: Duration, audio_position: Option<Duration>) {
        let audio = audio_position.filter(|_| self.config.audio_master);
        match audio {
            Some(pos) if pos > self.last_audio => {
                self.last_audio = pos;
                self.video_time = self.video_time.max(self.start_time + pos.as_secs_f64());
            }
            _ => {
                self.video_time += elapsed.as_secs_f64() * self.config.damping;
            }
        }
    }

    /// Current virtual playback time in seconds.
    pub fn video_time(&self) -> f64 {
        self.video_time
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn config(&self) -> ClockConfig {
        self.config
    }
}
