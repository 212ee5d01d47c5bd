//! Symphonia-backed [`MusicStream`].
//!
//! Decodes a music file held in memory into interleaved
//! 16-bit PCM. Loop points come from a WAV "smpl" chunk or from
//! `LOOPSTART`/`LOOPLENGTH`/`LOOPEND` tags; a looping stream seeks back to
//! its loop start every time playback reaches the loop end.

use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, Tag};
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::MusicError;
use crate::memory_source::MemoryStreamFile;
use crate::music::{MusicInfo, MusicStream};
use crate::wav;

/// Consecutive corrupt packets tolerated before giving up on a refill.
const MAX_DECODE_RETRIES: usize = 3;

pub struct SymphoniaMusicStream {
    source: MemoryStreamFile,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: MusicInfo,
    /// Decoded interleaved samples not yet rendered.
    pending: Vec<i16>,
    pending_offset: usize,
    /// Next sample to render, per channel.
    position: u64,
    exhausted: bool,
}

impl SymphoniaMusicStream {
    /// Opens a stream over an in-memory source.
    ///
    /// The source's name provides the container hint.
    pub fn open_memory(source: MemoryStreamFile) -> Result<Self, MusicError> {
        let (format, decoder, track_id, info, tags) = probe(&source)?;
        let mut stream = Self {
            source,
            format,
            decoder,
            track_id,
            info,
            pending: Vec::new(),
            pending_offset: 0,
            position: 0,
            exhausted: false,
        };
        stream.resolve_length()?;

        let loop_points = wav::read_loop_points(stream.source.bytes())
            .map(|p| (p.start, p.end))
            .or_else(|| loop_points_from_tags(&tags, stream.info.num_samples));
        if let Some((start, end)) = loop_points {
            if start < end {
                stream.info.loop_flag = true;
                stream.info.loop_start = start;
                stream.info.loop_end = end;
            } else {
                warn!("Ignoring invalid loop region {}..{}", start, end);
            }
        }

        debug!(
            sample_rate = stream.info.sample_rate,
            channels = stream.info.channels,
            samples = stream.info.num_samples,
            looping = stream.info.loop_flag,
            "Opened music stream '{}'",
            stream.source.name()
        );
        Ok(stream)
    }

    /// Counts frames with a full decode pass when the container does not
    /// declare its length, then rewinds.
    fn resolve_length(&mut self) -> Result<(), MusicError> {
        if self.info.num_samples > 0 {
            return Ok(());
        }
        let mut total = 0u64;
        loop {
            self.refill()?;
            if self.exhausted {
                break;
            }
            total += self.pending_frames() as u64;
        }
        debug!("Counted {} frames in '{}'", total, self.source.name());
        self.info.num_samples = total;
        self.seek_to(0)
    }

    fn channels(&self) -> usize {
        usize::from(self.info.channels)
    }

    fn pending_frames(&self) -> usize {
        (self.pending.len() - self.pending_offset) / self.channels()
    }

    /// Decodes the next packet of our track into `pending`.
    fn refill(&mut self) -> Result<(), MusicError> {
        let mut retries = 0;
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(Error::IoError(_)) | Err(Error::ResetRequired) => {
                    self.exhausted = true;
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(Error::DecodeError(msg)) if retries < MAX_DECODE_RETRIES => {
                    retries += 1;
                    debug!("Skipping corrupt music packet: {}", msg);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if decoded.frames() == 0 {
                continue;
            }

            let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, *decoded.spec());
            buffer.copy_interleaved_ref(decoded);
            self.pending.clear();
            self.pending.extend_from_slice(buffer.samples());
            self.pending_offset = 0;
            return Ok(());
        }
    }

    /// Moves the decode position to `frame`, sample-accurately.
    fn seek_to(&mut self, frame: u64) -> Result<(), MusicError> {
        self.pending.clear();
        self.pending_offset = 0;
        self.exhausted = false;

        let skip = match self.format.seek(
            SeekMode::Accurate,
            SeekTo::TimeStamp {
                ts: frame,
                track_id: self.track_id,
            },
        ) {
            Ok(seeked) => {
                self.decoder.reset();
                seeked.required_ts.saturating_sub(seeked.actual_ts)
            }
            Err(e) => {
                debug!("Seek to {} failed ({}), reopening", frame, e);
                let (format, decoder, track_id, _, _) = probe(&self.source)?;
                self.format = format;
                self.decoder = decoder;
                self.track_id = track_id;
                frame
            }
        };

        let mut skip = skip;
        while skip > 0 {
            if self.pending_frames() == 0 {
                self.refill()?;
                if self.exhausted {
                    break;
                }
            }
            let n = (self.pending_frames() as u64).min(skip);
            self.pending_offset += n as usize * self.channels();
            skip -= n;
        }

        self.position = frame;
        Ok(())
    }
}

impl MusicStream for SymphoniaMusicStream {
    fn info(&self) -> MusicInfo {
        self.info
    }

    fn current_sample(&self) -> u64 {
        self.position
    }

    fn render(&mut self, out: &mut [i16]) -> Result<(), MusicError> {
        let channels = self.channels();
        let mut written = 0;

        while written < out.len() {
            if self.info.loop_flag && self.position >= u64::from(self.info.loop_end) {
                self.seek_to(u64::from(self.info.loop_start))?;
            }

            if self.pending_frames() == 0 && !self.exhausted {
                self.refill()?;
            }

            let wanted = (out.len() - written) / channels;
            if wanted == 0 {
                break;
            }
            let mut frames = wanted;
            if self.info.loop_flag {
                let to_loop_end = u64::from(self.info.loop_end).saturating_sub(self.position);
                frames = frames.min(to_loop_end as usize);
            }

            if self.exhausted && self.pending_frames() == 0 {
                // Past the end: silence
                out[written..written + frames * channels].fill(0);
            } else {
                frames = frames.min(self.pending_frames());
                let n = frames * channels;
                out[written..written + n]
                    .copy_from_slice(&self.pending[self.pending_offset..self.pending_offset + n]);
                self.pending_offset += n;
            }

            written += frames * channels;
            self.position += frames as u64;
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<(), MusicError> {
        self.seek_to(0)
    }
}

type Probed = (Box<dyn FormatReader>, Box<dyn Decoder>, u32, MusicInfo, Vec<Tag>);

fn probe(source: &MemoryStreamFile) -> Result<Probed, MusicError> {
    let handle = source
        .open(source.name())
        .ok_or_else(|| MusicError::Open(source.name().to_string()))?;
    let mss = MediaSourceStream::new(Box::new(handle), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = Path::new(source.name()).extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let format_opts = FormatOptions {
        enable_gapless: true,
        ..Default::default()
    };
    let mut probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &format_opts,
        &MetadataOptions::default(),
    )?;

    let mut tags: Vec<Tag> = Vec::new();
    if let Some(rev) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
        tags.extend(rev.tags().iter().cloned());
    }
    if let Some(rev) = probed.format.metadata().current() {
        tags.extend(rev.tags().iter().cloned());
    }

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.channels.is_some())
        .ok_or_else(|| MusicError::UnsupportedFormat("no decodable audio track".into()))?;

    let track_id = track.id;
    let params = track.codec_params.clone();
    let sample_rate = params
        .sample_rate
        .ok_or_else(|| MusicError::UnsupportedFormat("missing sample rate".into()))?;
    let channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);
    if channels == 0 {
        return Err(MusicError::UnsupportedFormat("no channels".into()));
    }

    let decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;
    let info = MusicInfo {
        sample_rate,
        channels,
        num_samples: params.n_frames.unwrap_or(0),
        ..Default::default()
    };
    Ok((probed.format, decoder, track_id, info, tags))
}

/// Reads `LOOPSTART` plus `LOOPLENGTH` or `LOOPEND` tags.
fn loop_points_from_tags(tags: &[Tag], num_samples: u64) -> Option<(u32, u32)> {
    let find = |key: &str| {
        tags.iter()
            .find(|t| t.key.eq_ignore_ascii_case(key))
            .and_then(|t| t.value.to_string().trim().parse::<u32>().ok())
    };

    let start = find("LOOPSTART")?;
    let end = find("LOOPLENGTH")
        .map(|len| start.saturating_add(len))
        .or_else(|| find("LOOPEND"))
        .unwrap_or(num_samples.min(u64::from(u32::MAX)) as u32);
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::meta::Value;

    /// Mono 8 kHz WAV whose sample n has the value n.
    fn ramp_wav(samples: u32, loop_points: Option<(u32, u32)>) -> Vec<u8> {
        let mut file = wav::build_wav_header(samples, 8_000, 1, loop_points.is_some()).to_vec();
        for n in 0..samples {
            file.extend_from_slice(&(n as i16).to_le_bytes());
        }
        if let Some((start, end)) = loop_points {
            file.extend_from_slice(&wav::build_loop_chunk(start, end));
        }
        file
    }

    fn open(bytes: Vec<u8>) -> SymphoniaMusicStream {
        SymphoniaMusicStream::open_memory(MemoryStreamFile::new(bytes, "ramp.wav")).unwrap()
    }

    #[test]
    fn probes_wav_metadata() {
        let stream = open(ramp_wav(3000, Some((100, 2000))));
        let info = stream.info();
        assert_eq!(info.sample_rate, 8_000);
        assert_eq!(info.channels, 1);
        assert_eq!(info.num_samples, 3000);
        assert!(info.loop_flag);
        assert_eq!((info.loop_start, info.loop_end), (100, 2000));
    }

    #[test]
    fn renders_and_pads_with_silence() {
        let mut stream = open(ramp_wav(10, None));
        let mut out = [7i16; 14];
        stream.render(&mut out).unwrap();
        assert_eq!(&out[..10], &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(&out[10..], &[0, 0, 0, 0]);
        assert_eq!(stream.current_sample(), 14);
    }

    #[test]
    fn loops_back_to_loop_start() {
        let mut stream = open(ramp_wav(3000, Some((100, 2000))));
        let mut out = vec![0i16; 2005];
        stream.render(&mut out).unwrap();
        assert_eq!(out[1999], 1999);
        assert_eq!(&out[2000..], &[100, 101, 102, 103, 104]);
    }

    #[test]
    fn reset_rewinds() {
        let mut stream = open(ramp_wav(500, None));
        let mut out = vec![0i16; 300];
        stream.render(&mut out).unwrap();
        stream.reset().unwrap();
        assert_eq!(stream.current_sample(), 0);
        stream.render(&mut out[..3]).unwrap();
        assert_eq!(&out[..3], &[0, 1, 2]);
    }

    #[test]
    fn counts_frames_when_length_is_undeclared() {
        let mut stream = open(ramp_wav(3000, None));
        stream.info.num_samples = 0;
        stream.resolve_length().unwrap();
        assert_eq!(stream.info().num_samples, 3000);
        assert_eq!(stream.current_sample(), 0);

        let mut out = [0i16; 3];
        stream.render(&mut out).unwrap();
        assert_eq!(out, [0, 1, 2]);
    }

    #[test]
    fn rejects_garbage() {
        let err = SymphoniaMusicStream::open_memory(MemoryStreamFile::new(vec![1u8; 64], "x.bin"));
        assert!(err.is_err());
    }

    #[test]
    fn loop_tags() {
        let tag = |k: &str, v: &str| Tag::new(None, k, Value::String(v.to_string()));
        assert_eq!(
            loop_points_from_tags(&[tag("LOOPSTART", "10"), tag("LOOPLENGTH", "90")], 500),
            Some((10, 100))
        );
        assert_eq!(
            loop_points_from_tags(&[tag("loopstart", "10"), tag("LOOPEND", "40")], 500),
            Some((10, 40))
        );
        assert_eq!(loop_points_from_tags(&[tag("LOOPSTART", "10")], 500), Some((10, 500)));
        assert_eq!(loop_points_from_tags(&[tag("TITLE", "x")], 500), None);
    }
}
