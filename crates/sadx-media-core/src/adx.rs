//! CRI ADX music stream.
//!
//! ADX is the game's own music format: a big-endian header followed by
//! frames of 4-bit ADPCM, one frame per channel in turn. Every frame starts
//! with a 16-bit scale and predicts each sample from the previous two with
//! fixed coefficients. Loop points live in the header, so a looping stream
//! restores the predictor state saved at the loop start frame.

use std::f64::consts::{PI, SQRT_2};

use bytes::Bytes;
use tracing::debug;

use crate::error::MusicError;
use crate::memory_source::MemoryStreamFile;
use crate::music::{MusicInfo, MusicStream};

const ADX_MAGIC: [u8; 2] = [0x80, 0x00];
const ADX_COPYRIGHT: &[u8; 6] = b"(c)CRI";

/// Predictor pairs of the fixed-coefficient encoding, selected per frame.
const FIXED_COEFS: [(i32, i32); 4] = [(0x0000, 0x0000), (0x0F00, 0x0000), (0x1CC0, -0x0D00), (0x1880, -0x0DC0)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    /// Per-frame predictor from [`FIXED_COEFS`].
    Fixed,
    /// Coefficients derived from the header's high-pass cutoff.
    Standard,
    /// As standard, with the scale stored as a power of two.
    Exponential,
}

/// Parsed ADX header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdxHeader {
    pub data_offset: usize,
    encoding: Encoding,
    pub frame_size: usize,
    pub channels: u16,
    pub sample_rate: u32,
    pub total_samples: u32,
    pub highpass: u16,
    pub loop_points: Option<(u32, u32)>,
}

fn be16(bytes: &[u8], at: usize) -> Option<u16> {
    let raw = bytes.get(at..at + 2)?;
    Some(u16::from_be_bytes([raw[0], raw[1]]))
}

fn be32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at + 4)?;
    Some(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

impl AdxHeader {
    /// True when `bytes` starts with an ADX header.
    pub fn sniff(bytes: &[u8]) -> bool {
        Self::parse(bytes).is_ok()
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, MusicError> {
        let bad = |what: &str| MusicError::UnsupportedFormat(format!("ADX: {what}"));

        if bytes.get(0..2) != Some(&ADX_MAGIC[..]) {
            return Err(bad("missing header magic"));
        }
        let data_offset = usize::from(be16(bytes, 2).ok_or_else(|| bad("truncated header"))?) + 4;
        if data_offset < 0x14 + 6 || bytes.get(data_offset - 6..data_offset) != Some(&ADX_COPYRIGHT[..]) {
            return Err(bad("missing copyright marker"));
        }

        let encoding = match bytes[4] {
            2 => Encoding::Fixed,
            3 => Encoding::Standard,
            4 => Encoding::Exponential,
            other => return Err(bad(&format!("encoding type {other}"))),
        };
        let frame_size = usize::from(bytes[5]);
        if frame_size < 3 {
            return Err(bad("frame size"));
        }
        if bytes[6] != 4 {
            return Err(bad(&format!("{}-bit samples", bytes[6])));
        }
        let channels = u16::from(bytes[7]);
        let sample_rate = be32(bytes, 0x08).ok_or_else(|| bad("truncated header"))?;
        if channels == 0 || sample_rate == 0 {
            return Err(bad("no channels or sample rate"));
        }
        let total_samples = be32(bytes, 0x0C).ok_or_else(|| bad("truncated header"))?;
        let highpass = be16(bytes, 0x10).ok_or_else(|| bad("truncated header"))?;
        let version = bytes[0x12];
        if bytes[0x13] & 0x08 != 0 {
            return Err(bad("encrypted stream"));
        }

        // Loop fields: enabled flag, start sample, start byte, end sample
        let loop_base = match version {
            3 => Some(0x18),
            4 => Some(0x24),
            _ => None,
        };
        let loop_points = loop_base
            .filter(|base| data_offset >= base + 0x14)
            .and_then(|base| {
                (be32(bytes, base)? != 0).then_some(())?;
                Some((be32(bytes, base + 4)?, be32(bytes, base + 12)?))
            })
            .filter(|(start, end)| start < end);

        Ok(Self {
            data_offset,
            encoding,
            frame_size,
            channels,
            sample_rate,
            total_samples,
            highpass,
            loop_points,
        })
    }

    pub fn samples_per_frame(&self) -> usize {
        (self.frame_size - 2) * 2
    }

    /// Prediction coefficients in 4.12 fixed point.
    fn coefficients(&self) -> (i32, i32) {
        let z = (2.0 * PI * f64::from(self.highpass) / f64::from(self.sample_rate)).cos();
        let a = SQRT_2 - z;
        let b = SQRT_2 - 1.0;
        let c = (a - ((a + b) * (a - b)).sqrt()) / b;
        ((c * 8192.0) as i32, (c * c * -4096.0) as i32)
    }
}

/// Predictor history of one channel: the previous two samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct History {
    s1: i32,
    s2: i32,
}

pub struct AdxMusicStream {
    data: Bytes,
    header: AdxHeader,
    info: MusicInfo,
    coefs: (i32, i32),
    history: Vec<History>,
    /// History at the start of the loop start frame, captured on first pass.
    loop_history: Option<Vec<History>>,
    /// Decoded interleaved samples of `frame`.
    decoded: Vec<i16>,
    frame: Option<u64>,
    position: u64,
}

impl AdxMusicStream {
    pub fn open_memory(source: MemoryStreamFile) -> Result<Self, MusicError> {
        let data = source.bytes().clone();
        let header = AdxHeader::parse(&data)?;
        let (loop_start, loop_end) = header.loop_points.unwrap_or((0, 0));
        let info = MusicInfo {
            sample_rate: header.sample_rate,
            channels: header.channels,
            num_samples: u64::from(header.total_samples),
            loop_flag: header.loop_points.is_some(),
            loop_start,
            loop_end,
        };
        debug!(
            sample_rate = info.sample_rate,
            channels = info.channels,
            samples = info.num_samples,
            looping = info.loop_flag,
            "Opened ADX stream '{}'",
            source.name()
        );

        Ok(Self {
            coefs: header.coefficients(),
            history: vec![History::default(); usize::from(header.channels)],
            decoded: vec![0; header.samples_per_frame() * usize::from(header.channels)],
            loop_history: None,
            frame: None,
            position: 0,
            data,
            header,
            info,
        })
    }

    fn channels(&self) -> usize {
        usize::from(self.header.channels)
    }

    fn loop_frame(&self) -> Option<u64> {
        self.info
            .loop_flag
            .then(|| u64::from(self.info.loop_start) / self.header.samples_per_frame() as u64)
    }

    /// Decodes frame `index` of every channel into `decoded`.
    fn decode_frame(&mut self, index: u64) {
        if self.loop_frame() == Some(index) {
            self.loop_history = Some(self.history.clone());
        }

        let channels = self.channels();
        let spf = self.header.samples_per_frame();
        let size = self.header.frame_size;
        for ch in 0..channels {
            let at = (index as usize)
                .checked_mul(channels)
                .and_then(|n| n.checked_add(ch))
                .and_then(|n| n.checked_mul(size))
                .and_then(|n| n.checked_add(self.header.data_offset));
            let Some(frame) = at.and_then(|at| self.data.get(at..at + size)) else {
                // Truncated file: silence, predictor reset
                self.history[ch] = History::default();
                for i in 0..spf {
                    self.decoded[i * channels + ch] = 0;
                }
                continue;
            };

            let raw_scale = i32::from(u16::from_be_bytes([frame[0], frame[1]]));
            let (scale, (c1, c2)) = match self.header.encoding {
                Encoding::Standard => ((raw_scale & 0x1FFF) + 1, self.coefs),
                Encoding::Exponential => (1 << (12 - (raw_scale & 0x0F).min(12)), self.coefs),
                Encoding::Fixed => ((raw_scale & 0x1FFF) + 1, FIXED_COEFS[usize::from(frame[0] >> 5) & 3]),
            };

            let mut hist = self.history[ch];
            for (i, byte) in frame[2..].iter().enumerate() {
                for (j, nibble) in [(*byte as i8) >> 4, ((*byte << 4) as i8) >> 4].into_iter().enumerate() {
                    let predicted = (c1 * hist.s1 + c2 * hist.s2) >> 12;
                    let sample = (i32::from(nibble) * scale + predicted).clamp(i32::from(i16::MIN), i32::from(i16::MAX));
                    hist.s2 = hist.s1;
                    hist.s1 = sample;
                    self.decoded[(i * 2 + j) * channels + ch] = sample as i16;
                }
            }
            self.history[ch] = hist;
        }
        self.frame = Some(index);
    }

    /// Makes `index` the decoded frame, replaying from the nearest known
    /// predictor state.
    fn load_frame(&mut self, index: u64) {
        match self.frame {
            Some(f) if f == index => return,
            Some(f) if f + 1 == index => {}
            None if index == 0 => {}
            _ => match (&self.loop_history, self.loop_frame()) {
                (Some(saved), Some(loop_frame)) if loop_frame == index => {
                    self.history = saved.clone();
                }
                _ => {
                    self.history.fill(History::default());
                    for f in 0..index {
                        self.decode_frame(f);
                    }
                }
            },
        }
        self.decode_frame(index);
    }
}

impl MusicStream for AdxMusicStream {
    fn info(&self) -> MusicInfo {
        self.info
    }

    fn current_sample(&self) -> u64 {
        self.position
    }

    fn render(&mut self, out: &mut [i16]) -> Result<(), MusicError> {
        let channels = self.channels();
        let spf = self.header.samples_per_frame() as u64;
        let mut written = 0;

        while written + channels <= out.len() {
            if self.info.loop_flag && self.position >= u64::from(self.info.loop_end) {
                self.position = u64::from(self.info.loop_start);
            }

            let wanted = ((out.len() - written) / channels) as u64;
            let mut limit = if self.info.loop_flag {
                u64::from(self.info.loop_end) - self.position
            } else {
                u64::MAX
            };

            if self.position >= self.info.num_samples {
                // Past the end: silence
                let n = wanted.min(limit) as usize * channels;
                out[written..written + n].fill(0);
                written += n;
                self.position += (n / channels) as u64;
                continue;
            }
            limit = limit.min(self.info.num_samples - self.position);

            self.load_frame(self.position / spf);
            let within = self.position % spf;
            let n = wanted.min(limit).min(spf - within) as usize;
            let from = within as usize * channels;
            out[written..written + n * channels].copy_from_slice(&self.decoded[from..from + n * channels]);
            written += n * channels;
            self.position += n as u64;
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<(), MusicError> {
        self.position = 0;
        self.frame = None;
        self.history.fill(History::default());
        Ok(())
    }
}
