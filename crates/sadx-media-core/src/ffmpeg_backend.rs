//! Container backend built on FFmpeg (ffmpeg-next).
//!
//! Requires the `ffmpeg` feature and the FFmpeg shared libraries:
//!
//! ```toml
//! [dependencies]
//! sadx-media-core = { version = "0.1", features = ["ffmpeg"] }
//! ```
//!
//! Video frames are converted to BGRA at the stream's native size with a
//! bicubic scaler. Audio is resampled to interleaved f32 at the stream's own
//! rate and channel layout.

use std::ffi::CString;
use std::ptr;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::ffi;
use tracing::{debug, info};

use crate::audio::AudioFormat;
use crate::container::{BackendOpener, ContainerBackend, OpenRequest, PacketRoute, VideoStreamInfo};
use crate::error::MediaError;
use crate::frame_queue::DecodedVideoFrame;

struct AudioPath {
    stream_index: usize,
    decoder: ffmpeg::decoder::Audio,
    resampler: Option<ffmpeg::software::resampling::Context>,
    format: AudioFormat,
    /// Override the decoder's channel layout with stereo.
    force_stereo: bool,
}

pub struct FfmpegBackend {
    // Codec and conversion contexts are declared before the format context
    // so they are dropped first.
    decoder: ffmpeg::decoder::Video,
    scaler: Option<ffmpeg::software::scaling::Context>,
    audio: Option<AudioPath>,
    video: VideoStreamInfo,
    time_base: (i32, i32),
    input: ffmpeg::format::context::Input,
}

// SAFETY: FfmpegBackend is moved into the decode thread once and only ever
// used from there. The raw pointers are not inherently thread-safe, but they
// are never shared.
unsafe impl Send for FfmpegBackend {}

impl FfmpegBackend {
    pub fn open(request: &OpenRequest) -> Result<Self, MediaError> {
        let path = request.display_path().into_owned();
        let open_err = |reason: String| MediaError::Open {
            path: path.clone(),
            reason,
        };

        // ffmpeg::init() is safe to call multiple times (just registers codecs/formats)
        ffmpeg::init().map_err(|e| MediaError::DecoderInit(format!("FFmpeg init failed: {e}")))?;

        let mut input = open_input(&request.path, request.legacy_audio).map_err(open_err)?;

        // Probing may have consumed data; start from the top
        if let Err(e) = input.seek(0, ..) {
            debug!("Rewind after probing failed: {}", e);
        }

        let video_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| MediaError::NoVideoStream(path.clone()))?;
        let video_index = video_stream.index();
        let time_base = video_stream.time_base();
        let time_base = (time_base.numerator(), time_base.denominator());
        let start_ts = video_stream.start_time();

        let decoder = ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|e| MediaError::DecoderInit(format!("Failed to open video decoder: {e}")))?;

        let video = VideoStreamInfo {
            index: video_index,
            width: decoder.width(),
            height: decoder.height(),
            start_time: if start_ts == ffi::AV_NOPTS_VALUE {
                0.0
            } else {
                ts_to_seconds(start_ts, time_base)
            },
        };

        let audio = match input.streams().best(ffmpeg::media::Type::Audio) {
            Some(stream) => Some(open_audio(&stream, request.legacy_audio)?),
            None => {
                info!("{} has no audio stream, playing video only", path);
                None
            }
        };

        info!(
            "Video: {}x{}, start={:.3}s, time_base={}/{}, legacy_audio={}",
            video.width, video.height, video.start_time, time_base.0, time_base.1, request.legacy_audio
        );

        let mut backend = Self {
            decoder,
            scaler: None,
            audio,
            video,
            time_base,
            input,
        };
        let format = backend.decoder.format();
        backend.ensure_scaler(backend.video.width, backend.video.height, format)?;
        Ok(backend)
    }

    fn ensure_scaler(
        &mut self,
        width: u32,
        height: u32,
        src_format: ffmpeg::format::Pixel,
    ) -> Result<(), MediaError> {
        // Recreate scaler if format OR dimensions changed
        let needs_recreate = self.scaler.as_ref().map_or(true, |s| {
            let input = s.input();
            input.format != src_format || input.width != width || input.height != height
        });

        if needs_recreate {
            let scaler = ffmpeg::software::scaling::Context::get(
                src_format,
                width,
                height,
                ffmpeg::format::Pixel::BGRA,
                self.video.width,
                self.video.height,
                ffmpeg::software::scaling::Flags::BICUBIC,
            )
            .map_err(|e| MediaError::DecoderInit(format!("Failed to create scaler: {e}")))?;
            self.scaler = Some(scaler);
        }
        Ok(())
    }

    fn convert(&mut self, frame: &ffmpeg::frame::Video) -> Result<DecodedVideoFrame, MediaError> {
        self.ensure_scaler(frame.width(), frame.height(), frame.format())?;
        let Some(scaler) = self.scaler.as_mut() else {
            return Err(MediaError::Decode("Scaler not initialized".to_string()));
        };

        let mut bgra = ffmpeg::frame::Video::empty();
        scaler
            .run(frame, &mut bgra)
            .map_err(|e| MediaError::Decode(format!("Scaling failed: {e}")))?;

        // Copy rows; the scaler's stride may exceed width * 4
        let row = self.video.width as usize * 4;
        let rows = self.video.height as usize;
        let stride = bgra.stride(0);
        let data = bgra.data(0);
        let size = row * rows;

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(size)
            .map_err(|_| MediaError::Allocation(size))?;
        for y in 0..rows {
            let start = y * stride;
            pixels.extend_from_slice(&data[start..start + row]);
        }

        let ts = frame.timestamp().or_else(|| frame.pts()).unwrap_or(0);
        Ok(DecodedVideoFrame::new(ts_to_seconds(ts, self.time_base), pixels))
    }
}

impl ContainerBackend for FfmpegBackend {
    type Packet = ffmpeg::Packet;

    fn video_stream(&self) -> &VideoStreamInfo {
        &self.video
    }

    fn audio_format(&self) -> Option<AudioFormat> {
        self.audio.as_ref().map(|a| a.format)
    }

    fn read_packet(&mut self) -> Result<Option<ffmpeg::Packet>, MediaError> {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => Ok(Some(packet)),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(MediaError::Decode(format!("Read packet failed: {e}"))),
        }
    }

    fn route(&self, packet: &ffmpeg::Packet) -> PacketRoute {
        let index = packet.stream();
        if index == self.video.index {
            PacketRoute::Video
        } else if self.audio.as_ref().is_some_and(|a| a.stream_index == index) {
            PacketRoute::Audio
        } else {
            PacketRoute::Ignore
        }
    }

    fn send_video(&mut self, packet: &ffmpeg::Packet) -> Result<(), MediaError> {
        self.decoder
            .send_packet(packet)
            .map_err(|e| MediaError::Decode(format!("Send packet failed: {e}")))
    }

    fn receive_video(&mut self) -> Result<Option<DecodedVideoFrame>, MediaError> {
        let mut decoded = ffmpeg::frame::Video::empty();
        match self.decoder.receive_frame(&mut decoded) {
            Ok(()) => self.convert(&decoded).map(Some),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => Ok(None),
            Err(e) => Err(MediaError::Decode(format!("Decode error: {e}"))),
        }
    }

    fn finish_video(&mut self) -> Result<(), MediaError> {
        self.decoder
            .send_eof()
            .map_err(|e| MediaError::Decode(format!("Flush failed: {e}")))
    }

    fn decode_audio(&mut self, packet: &ffmpeg::Packet) -> Result<Vec<f32>, MediaError> {
        let Some(audio) = self.audio.as_mut() else {
            return Ok(Vec::new());
        };
        audio
            .decoder
            .send_packet(packet)
            .map_err(|e| MediaError::Decode(format!("Send audio packet failed: {e}")))?;

        let mut samples = Vec::new();
        let mut frame = ffmpeg::frame::Audio::empty();
        loop {
            match audio.decoder.receive_frame(&mut frame) {
                Ok(()) => audio.resample(&mut frame, &mut samples)?,
                Err(ffmpeg::Error::Eof) => break,
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => break,
                Err(e) => return Err(MediaError::Decode(format!("Audio decode error: {e}"))),
            }
        }
        Ok(samples)
    }
}

impl AudioPath {
    fn ensure_resampler(&mut self, frame: &ffmpeg::frame::Audio) -> Result<(), MediaError> {
        let src_format = frame.format();
        let src_rate = frame.rate();
        let src_layout = frame.channel_layout();

        let needs_recreate = match &self.resampler {
            None => true,
            Some(resampler) => {
                let input = resampler.input();
                input.format != src_format
                    || input.rate != src_rate
                    || input.channel_layout != src_layout
            }
        };

        if needs_recreate {
            let resampler = ffmpeg::software::resampling::Context::get(
                src_format,
                src_layout,
                src_rate,
                ffmpeg::format::Sample::F32(ffmpeg::format::sample::Type::Packed),
                src_layout,
                src_rate,
            )
            .map_err(|e| MediaError::DecoderInit(format!("Failed to create resampler: {e}")))?;
            self.resampler = Some(resampler);
        }
        Ok(())
    }

    fn resample(
        &mut self,
        frame: &mut ffmpeg::frame::Audio,
        out: &mut Vec<f32>,
    ) -> Result<(), MediaError> {
        if self.force_stereo {
            frame.set_channel_layout(ffmpeg::ChannelLayout::STEREO);
        }
        self.ensure_resampler(frame)?;
        let Some(resampler) = self.resampler.as_mut() else {
            return Err(MediaError::Decode("Resampler not initialized".to_string()));
        };

        let mut output = ffmpeg::frame::Audio::empty();
        resampler
            .run(frame, &mut output)
            .map_err(|e| MediaError::Decode(format!("Resampling failed: {e}")))?;

        let count = output.samples() * usize::from(self.format.channels);
        let raw = output.data(0);
        let count = count.min(raw.len() / 4);
        out.try_reserve(count)
            .map_err(|_| MediaError::Allocation(count * 4))?;
        out.extend(
            raw[..count * 4]
                .chunks_exact(4)
                .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
        );
        Ok(())
    }
}

fn open_audio(stream: &ffmpeg::format::stream::Stream, legacy: bool) -> Result<AudioPath, MediaError> {
    let decoder = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
        .and_then(|ctx| ctx.decoder().audio())
        .map_err(|e| MediaError::DecoderInit(format!("Failed to open audio decoder: {e}")))?;

    let channels = if legacy { 2 } else { decoder.channels() as u16 };
    let format = AudioFormat {
        sample_rate: decoder.rate(),
        channels,
    };
    info!(
        "Audio: {}Hz, {} channels, codec: {}",
        format.sample_rate,
        format.channels,
        decoder
            .codec()
            .map(|c| c.name().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    );

    Ok(AudioPath {
        stream_index: stream.index(),
        decoder,
        resampler: None,
        format,
        force_stereo: legacy,
    })
}

/// Opens and probes `path`, optionally forcing the ADX audio codec.
///
/// `path` is handed to libavformat byte for byte.
///
/// ffmpeg-next's `format::input` cannot set codec overrides before probing,
/// so the context is allocated and opened by hand and then wrapped.
fn open_input(path: &[u8], legacy_audio: bool) -> Result<ffmpeg::format::context::Input, String> {
    let c_path = CString::new(path).map_err(|_| "path contains NUL".to_string())?;

    // SAFETY: every pointer passed to libavformat comes from libavformat
    // itself or from `c_path`, which outlives the calls. On failure
    // avformat_open_input frees the context; after success ownership moves
    // into `Input`, which closes it on drop.
    unsafe {
        let mut ctx = ffi::avformat_alloc_context();
        if ctx.is_null() {
            return Err("failed to allocate format context".to_string());
        }
        if legacy_audio {
            (*ctx).audio_codec_id = ffi::AVCodecID::AV_CODEC_ID_ADPCM_ADX;
        }

        let ret = ffi::avformat_open_input(&mut ctx, c_path.as_ptr(), ptr::null(), ptr::null_mut());
        if ret != 0 {
            return Err(format!("avformat_open_input failed: {}", ffmpeg::Error::from(ret)));
        }

        let ret = ffi::avformat_find_stream_info(ctx, ptr::null_mut());
        if ret < 0 {
            ffi::avformat_close_input(&mut ctx);
            return Err(format!("avformat_find_stream_info failed: {}", ffmpeg::Error::from(ret)));
        }

        Ok(ffmpeg::format::context::Input::wrap(ctx))
    }
}

fn ts_to_seconds(ts: i64, time_base: (i32, i32)) -> f64 {
    if time_base.1 == 0 {
        return 0.0;
    }
    ts as f64 * time_base.0 as f64 / time_base.1 as f64
}

/// Opens [`FfmpegBackend`]s for the playback controller.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegOpener;

impl BackendOpener for FfmpegOpener {
    type Backend = FfmpegBackend;

    fn open(&self, request: &OpenRequest) -> Result<FfmpegBackend, MediaError> {
        FfmpegBackend::open(request)
    }
}
