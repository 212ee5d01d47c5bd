//! sadx-media-core: decode pipeline and music export core for the SADX media bridges.
//!
//! This crate contains everything behind the C surface of `sadx-media-ffi`:
//!
//! - Video pipeline: [`frame_queue`], [`decode_loop`], [`frame_buffer`], [`clock`], [`player`]
//! - Container seam: [`container`] with the scripted [`synthetic`] backend and,
//!   behind the `ffmpeg` feature, `ffmpeg_backend`
//! - Music bridge: [`memory_source`], [`music`], [`adx`], [`music_decoder`], [`stream_proc`], [`wav`]
//! - Ambient: [`config`], [`error`], [`metrics`], [`audio`]
//!
//! The crate has no dependency on the host's mixing library. Audio output is
//! reached through the [`audio::AudioOutput`] trait, which the FFI crate
//! implements on top of BASS.

pub mod adx;
pub mod audio;
pub mod clock;
pub mod config;
pub mod container;
pub mod decode_loop;
pub mod error;
pub mod frame_buffer;
pub mod frame_queue;
pub mod memory_source;
pub mod metrics;
pub mod music;
pub mod music_decoder;
pub mod player;
pub mod session;
pub mod stream_proc;
pub mod synthetic;
pub mod wav;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_backend;

pub use config::{ClockConfig, PlayerConfig};
pub use error::{MediaError, MusicError};
pub use player::PlaybackController;
