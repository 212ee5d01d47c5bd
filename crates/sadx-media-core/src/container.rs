//! Container backend seam.
//!
//! A [`ContainerBackend`] owns everything the decode thread needs from the
//! codec library: the demuxer, both decoders, and the pixel and sample
//! converters. The decode loop drives it one packet at a time. Video uses a
//! send/receive split so that a packet producing several frames never
//! overfills the pending queue.

use std::borrow::Cow;

use crate::audio::AudioFormat;
use crate::error::MediaError;
use crate::frame_queue::DecodedVideoFrame;

/// The chosen video stream.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoStreamInfo {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    /// Timestamp of the first frame, in seconds.
    pub start_time: f64,
}

impl VideoStreamInfo {
    /// Bytes in one BGRA frame.
    pub fn frame_size(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(4)
    }
}

/// Where a demuxed packet goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketRoute {
    Video,
    Audio,
    /// Packet from a stream we do not play.
    Ignore,
}

/// Parameters for opening a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    /// Path bytes exactly as the host passed them, without a NUL. They go to
    /// the demuxer unchanged, so paths in the host's code page keep working.
    pub path: Vec<u8>,
    /// Force the legacy ADPCM (ADX) audio codec and a stereo layout. Needed
    /// for the game's own movie files, whose audio cannot be probed.
    pub legacy_audio: bool,
}

impl OpenRequest {
    pub fn new(path: impl Into<Vec<u8>>, legacy_audio: bool) -> Self {
        Self {
            path: path.into(),
            legacy_audio,
        }
    }

    /// The path for log messages.
    pub fn display_path(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.path)
    }
}

/// A demuxer plus decoders for one open container.
pub trait ContainerBackend: Send {
    type Packet;

    fn video_stream(&self) -> &VideoStreamInfo;

    /// Format of the samples returned by [`decode_audio`](Self::decode_audio),
    /// or None for a video-only container.
    fn audio_format(&self) -> Option<AudioFormat>;

    /// Reads the next packet. `Ok(None)` marks the end of input.
    fn read_packet(&mut self) -> Result<Option<Self::Packet>, MediaError>;

    fn route(&self, packet: &Self::Packet) -> PacketRoute;

    /// Feeds a video packet to the decoder.
    fn send_video(&mut self, packet: &Self::Packet) -> Result<(), MediaError>;

    /// Takes one decoded frame, converted to BGRA. `Ok(None)` means the
    /// decoder needs more input, or is fully drained after
    /// [`finish_video`](Self::finish_video).
    fn receive_video(&mut self) -> Result<Option<DecodedVideoFrame>, MediaError>;

    /// Signals end of input so delayed frames can be drained.
    fn finish_video(&mut self) -> Result<(), MediaError>;

    /// Decodes an audio packet into interleaved f32 samples.
    fn decode_audio(&mut self, packet: &Self::Packet) -> Result<Vec<f32>, MediaError>;
}

/// Opens backends for the playback controller.
pub trait BackendOpener: Send + Sync {
    type Backend: ContainerBackend + 'static;

    fn open(&self, request: &OpenRequest) -> Result<Self::Backend, MediaError>;
}

/// Opener for builds without a codec library. Every open fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBackend;

/// Backend type of [`NoBackend`]; cannot be constructed.
pub enum NoContainer {}

impl ContainerBackend for NoContainer {
    type Packet = ();

    fn video_stream(&self) -> &VideoStreamInfo {
        match *self {}
    }

    fn audio_format(&self) -> Option<AudioFormat> {
        match *self {}
    }

    fn read_packet(&mut self) -> Result<Option<()>, MediaError> {
        match *self {}
    }

    fn route(&self, _packet: &()) -> PacketRoute {
        match *self {}
    }

    fn send_video(&mut self, _packet: &()) -> Result<(), MediaError> {
        match *self {}
    }

    fn receive_video(&mut self) -> Result<Option<DecodedVideoFrame>, MediaError> {
        match *self {}
    }

    fn finish_video(&mut self) -> Result<(), MediaError> {
        match *self {}
    }

    fn decode_audio(&mut self, _packet: &()) -> Result<Vec<f32>, MediaError> {
        match *self {}
    }
}

impl BackendOpener for NoBackend {
    type Backend = NoContainer;

    fn open(&self, request: &OpenRequest) -> Result<NoContainer, MediaError> {
        tracing::warn!(
            "Cannot open {}: built without a container backend",
            request.display_path()
        );
        Err(MediaError::BackendUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_is_bgra() {
        let info = VideoStreamInfo {
            index: 0,
            width: 320,
            height: 240,
            start_time: 0.0,
        };
        assert_eq!(info.frame_size(), Some(320 * 240 * 4));
    }

    #[test]
    fn no_backend_always_fails() {
        let request = OpenRequest::new("movie.sfd", true);
        assert!(matches!(
            NoBackend.open(&request),
            Err(MediaError::BackendUnavailable)
        ));
    }
}
