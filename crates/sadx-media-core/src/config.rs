//! Playback configuration.
//!
//! Defaults reproduce the reference pacing (five frames of decode-ahead, a
//! 0.90 damped wall clock for video-only sessions). Hosts can override them
//! through `SADX_MEDIA_*` environment variables, read once per controller.

use std::time::Duration;

/// Default number of decoded frames buffered ahead of presentation.
pub const DEFAULT_QUEUE_CAPACITY: usize = 5;

/// Default damping applied to wall-clock elapsed time.
pub const DEFAULT_CLOCK_DAMPING: f64 = 0.90;

/// Default capacity of the playback event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

const ENV_QUEUE_CAPACITY: &str = "SADX_MEDIA_QUEUE_CAPACITY";
const ENV_CLOCK_DAMPING: &str = "SADX_MEDIA_CLOCK_DAMPING";
const ENV_AUDIO_MASTER: &str = "SADX_MEDIA_AUDIO_MASTER";

/// Presentation clock policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockConfig {
    /// Factor applied to wall-clock elapsed time when advancing the virtual clock.
    pub damping: f64,
    /// Follow the audio sink's played position when a session has audio.
    pub audio_master: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            damping: DEFAULT_CLOCK_DAMPING,
            audio_master: true,
        }
    }
}

/// Configuration for a [`PlaybackController`](crate::PlaybackController).
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    /// Maximum decoded-but-unpresented frames.
    pub queue_capacity: usize,
    pub clock: ClockConfig,
    /// Iterations shorter than this are skipped.
    pub tick_resolution: Duration,
    /// Bound of the playback event channel. Events are dropped when full.
    pub event_capacity: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            clock: ClockConfig::default(),
            tick_resolution: Duration::from_millis(1),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl PlayerConfig {
    /// Builds a configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// Invalid values are logged and the default is kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_QUEUE_CAPACITY) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.queue_capacity = n,
                _ => tracing::warn!("Ignoring invalid {}={:?}", ENV_QUEUE_CAPACITY, raw),
            }
        }

        if let Some(raw) = lookup(ENV_CLOCK_DAMPING) {
            match raw.trim().parse::<f64>() {
                Ok(d) if d.is_finite() && d > 0.0 => config.clock.damping = d,
                _ => tracing::warn!("Ignoring invalid {}={:?}", ENV_CLOCK_DAMPING, raw),
            }
        }

        if let Some(raw) = lookup(ENV_AUDIO_MASTER) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.clock.audio_master = true,
                "0" | "false" | "no" | "off" => config.clock.audio_master = false,
                _ => tracing::warn!("Ignoring invalid {}={:?}", ENV_AUDIO_MASTER, raw),
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn defaults_match_reference_pacing() {
        let config = PlayerConfig::default();
        assert_eq!(config.queue_capacity, 5);
        assert!((config.clock.damping - 0.90).abs() < f64::EPSILON);
        assert!(config.clock.audio_master);
        assert_eq!(config.tick_resolution, Duration::from_millis(1));
    }

    #[test]
    fn overrides_are_applied() {
        let config = PlayerConfig::from_lookup(lookup(&[
            (ENV_QUEUE_CAPACITY, "8"),
            (ENV_CLOCK_DAMPING, "1.0"),
            (ENV_AUDIO_MASTER, "off"),
        ]));
        assert_eq!(config.queue_capacity, 8);
        assert!((config.clock.damping - 1.0).abs() < f64::EPSILON);
        assert!(!config.clock.audio_master);
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = PlayerConfig::from_lookup(lookup(&[
            (ENV_QUEUE_CAPACITY, "0"),
            (ENV_CLOCK_DAMPING, "nan"),
            (ENV_AUDIO_MASTER, "maybe"),
        ]));
        assert_eq!(config, PlayerConfig::default());
    }
}
