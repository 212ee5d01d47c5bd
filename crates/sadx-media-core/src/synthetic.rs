//! Scripted in-memory container.
//!
//! [`SyntheticContainer`] replays a fixed list of packets through the
//! [`ContainerBackend`] interface. Video frames are solid fills of a known
//! byte so tests can tell which frame reached the framebuffer. A decoder
//! delay can be configured to exercise end-of-stream draining.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::AudioFormat;
use crate::container::{BackendOpener, ContainerBackend, OpenRequest, PacketRoute, VideoStreamInfo};
use crate::error::MediaError;
use crate::frame_queue::DecodedVideoFrame;

const VIDEO_INDEX: usize = 0;
const AUDIO_INDEX: usize = 1;

/// One scripted packet.
#[derive(Debug, Clone, PartialEq)]
pub enum SyntheticPacket {
    /// Decodes to a frame at `pts` seconds filled with `fill`.
    Video { pts: f64, fill: u8 },
    /// Decodes to these samples.
    Audio(Vec<f32>),
    /// Fails to decode.
    CorruptVideo,
    CorruptAudio,
    /// A packet from a stream nobody plays.
    Data,
}

#[derive(Debug, Clone)]
pub struct SyntheticContainer {
    video: VideoStreamInfo,
    audio: Option<AudioFormat>,
    packets: VecDeque<SyntheticPacket>,
    /// Frames the fake decoder holds back until end of input.
    decoder_delay: usize,
    decoded: VecDeque<DecodedVideoFrame>,
    input_finished: bool,
}

impl SyntheticContainer {
    /// A video-only container with the given frame dimensions.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            video: VideoStreamInfo {
                index: VIDEO_INDEX,
                width,
                height,
                start_time: 0.0,
            },
            audio: None,
            packets: VecDeque::new(),
            decoder_delay: 0,
            decoded: VecDeque::new(),
            input_finished: false,
        }
    }

    pub fn with_audio(mut self, format: AudioFormat) -> Self {
        self.audio = Some(format);
        self
    }

    pub fn with_start_time(mut self, seconds: f64) -> Self {
        self.video.start_time = seconds;
        self
    }

    pub fn with_decoder_delay(mut self, frames: usize) -> Self {
        self.decoder_delay = frames;
        self
    }

    pub fn video_frame(self, pts: f64, fill: u8) -> Self {
        self.packet(SyntheticPacket::Video { pts, fill })
    }

    pub fn audio_packet(self, samples: Vec<f32>) -> Self {
        self.packet(SyntheticPacket::Audio(samples))
    }

    pub fn packet(mut self, packet: SyntheticPacket) -> Self {
        self.packets.push_back(packet);
        self
    }

    fn frame_size(&self) -> usize {
        self.video.frame_size().unwrap_or(0)
    }
}

impl ContainerBackend for SyntheticContainer {
    type Packet = SyntheticPacket;

    fn video_stream(&self) -> &VideoStreamInfo {
        &self.video
    }

    fn audio_format(&self) -> Option<AudioFormat> {
        self.audio
    }

    fn read_packet(&mut self) -> Result<Option<SyntheticPacket>, MediaError> {
        Ok(self.packets.pop_front())
    }

    fn route(&self, packet: &SyntheticPacket) -> PacketRoute {
        match packet {
            SyntheticPacket::Video { .. } | SyntheticPacket::CorruptVideo => PacketRoute::Video,
            SyntheticPacket::Audio(_) | SyntheticPacket::CorruptAudio if self.audio.is_some() => {
                PacketRoute::Audio
            }
            _ => PacketRoute::Ignore,
        }
    }

    fn send_video(&mut self, packet: &SyntheticPacket) -> Result<(), MediaError> {
        match packet {
            SyntheticPacket::Video { pts, fill } => {
                let pixels = vec![*fill; self.frame_size()];
                self.decoded.push_back(DecodedVideoFrame::new(*pts, pixels));
                Ok(())
            }
            _ => Err(MediaError::Decode("corrupt video packet".into())),
        }
    }

    fn receive_video(&mut self) -> Result<Option<DecodedVideoFrame>, MediaError> {
        if self.input_finished || self.decoded.len() > self.decoder_delay {
            Ok(self.decoded.pop_front())
        } else {
            Ok(None)
        }
    }

    fn finish_video(&mut self) -> Result<(), MediaError> {
        self.input_finished = true;
        Ok(())
    }

    fn decode_audio(&mut self, packet: &SyntheticPacket) -> Result<Vec<f32>, MediaError> {
        match packet {
            SyntheticPacket::Audio(samples) => Ok(samples.clone()),
            _ => Err(MediaError::Decode("corrupt audio packet".into())),
        }
    }
}

/// Opener that hands out copies of a template container and records every
/// request it sees.
#[derive(Clone)]
pub struct SyntheticOpener {
    template: Option<SyntheticContainer>,
    requests: Arc<Mutex<Vec<OpenRequest>>>,
}

impl SyntheticOpener {
    pub fn new(template: SyntheticContainer) -> Self {
        Self {
            template: Some(template),
            requests: Arc::default(),
        }
    }

    /// An opener whose containers have no video stream.
    pub fn without_video() -> Self {
        Self {
            template: None,
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<OpenRequest> {
        self.requests.lock().clone()
    }
}

impl BackendOpener for SyntheticOpener {
    type Backend = SyntheticContainer;

    fn open(&self, request: &OpenRequest) -> Result<SyntheticContainer, MediaError> {
        self.requests.lock().push(request.clone());
        self.template
            .clone()
            .ok_or_else(|| MediaError::NoVideoStream(request.display_path().into_owned()))
    }
}
