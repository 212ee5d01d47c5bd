//! WAV export with optional "smpl" loop metadata.
//!
//! Output layout: a 44-byte canonical RIFF/WAVE header, 16-bit little-endian
//! PCM, and for looping streams a trailing 68-byte "smpl" chunk describing
//! one loop region. The constant fields of the loop chunk follow the
//! conventions of the game's own tooling and must stay bit-exact.

use crate::error::MusicError;
use crate::music::{MusicInfo, MusicStream};

/// Size of the RIFF/WAVE/fmt/data header.
pub const WAV_HEADER_SIZE: usize = 0x2C;

/// Size of the single-loop "smpl" chunk, including its 8-byte chunk header.
pub const LOOP_CHUNK_SIZE: usize = 0x44;

/// Samples per channel rendered per encode step.
pub const ENCODE_CHUNK_SAMPLES: usize = 4000;

const SMPL_SAMPLE_PERIOD: u32 = 45_351;
const SMPL_UNITY_NOTE: u32 = 60;
const SMPL_SMPTE_FORMAT: u32 = 30;

/// Loop region read back from a "smpl" chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopPoints {
    pub start: u32,
    pub end: u32,
}

/// Builds the 44-byte header for `sample_count` samples per channel.
///
/// The declared RIFF size covers the trailing loop chunk when
/// `has_loop_chunk` is set.
pub fn build_wav_header(
    sample_count: u32,
    sample_rate: u32,
    channels: u16,
    has_loop_chunk: bool,
) -> [u8; WAV_HEADER_SIZE] {
    let block_align = u32::from(channels) * 2;
    let data_size = sample_count.wrapping_mul(block_align);
    let mut riff_size = data_size.wrapping_add(WAV_HEADER_SIZE as u32 - 8);
    if has_loop_chunk {
        riff_size = riff_size.wrapping_add(LOOP_CHUNK_SIZE as u32);
    }

    let mut h = [0u8; WAV_HEADER_SIZE];
    h[0..4].copy_from_slice(b"RIFF");
    h[4..8].copy_from_slice(&riff_size.to_le_bytes());
    h[8..12].copy_from_slice(b"WAVE");
    h[12..16].copy_from_slice(b"fmt ");
    h[16..20].copy_from_slice(&16u32.to_le_bytes());
    h[20..22].copy_from_slice(&1u16.to_le_bytes()); // PCM
    h[22..24].copy_from_slice(&channels.to_le_bytes());
    h[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    h[28..32].copy_from_slice(&sample_rate.wrapping_mul(block_align).to_le_bytes());
    h[32..34].copy_from_slice(&(block_align as u16).to_le_bytes());
    h[34..36].copy_from_slice(&16u16.to_le_bytes());
    h[36..40].copy_from_slice(b"data");
    h[40..44].copy_from_slice(&data_size.to_le_bytes());
    h
}

/// Builds the 68-byte "smpl" chunk for one forward loop.
pub fn build_loop_chunk(loop_start: u32, loop_end: u32) -> [u8; LOOP_CHUNK_SIZE] {
    let fields: [u32; 16] = [
        (LOOP_CHUNK_SIZE - 8) as u32,
        0, // manufacturer
        0, // product
        SMPL_SAMPLE_PERIOD,
        SMPL_UNITY_NOTE,
        0, // pitch fraction
        SMPL_SMPTE_FORMAT,
        0, // SMPTE offset
        1, // loop count
        0, // sampler data
        0, // cue point id
        0, // forward loop
        loop_start,
        loop_end,
        0, // fraction
        0, // play count (infinite)
    ];

    let mut chunk = [0u8; LOOP_CHUNK_SIZE];
    chunk[0..4].copy_from_slice(b"smpl");
    for (i, value) in fields.iter().enumerate() {
        let at = 4 + i * 4;
        chunk[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
    chunk
}

/// Total bytes a full export of a stream with `info` occupies.
pub fn compute_output_size(info: &MusicInfo) -> usize {
    let pcm = info.export_samples() as usize * usize::from(info.channels) * 2;
    pcm + WAV_HEADER_SIZE + if info.loop_flag { LOOP_CHUNK_SIZE } else { 0 }
}

/// Renders the whole stream into `out` as a WAV file.
///
/// The stream is rewound first. Returns the number of bytes written, which
/// always equals [`compute_output_size`]. Nothing is written when `out` is
/// too small; a render failure aborts the export with an error.
pub fn encode<S: MusicStream + ?Sized>(stream: &mut S, out: &mut [u8]) -> Result<usize, MusicError> {
    let info = stream.info();
    let needed = compute_output_size(&info);
    if out.len() < needed {
        return Err(MusicError::BufferTooSmall {
            needed,
            got: out.len(),
        });
    }
    if info.channels == 0 {
        return Err(MusicError::UnsupportedFormat("stream has no channels".into()));
    }

    stream.reset()?;

    let total = info.export_samples();
    let header = build_wav_header(total as u32, info.sample_rate, info.channels, info.loop_flag);
    out[..WAV_HEADER_SIZE].copy_from_slice(&header);

    let channels = usize::from(info.channels);
    let mut pcm = vec![0i16; ENCODE_CHUNK_SAMPLES * channels];
    let mut position = WAV_HEADER_SIZE;
    let mut done = 0u64;
    while done < total {
        let count = (total - done).min(ENCODE_CHUNK_SAMPLES as u64) as usize;
        let chunk = &mut pcm[..count * channels];
        stream.render(chunk)?;

        for sample in chunk.iter() {
            out[position..position + 2].copy_from_slice(&sample.to_le_bytes());
            position += 2;
        }
        done += count as u64;
    }

    if info.loop_flag {
        out[position..position + LOOP_CHUNK_SIZE]
            .copy_from_slice(&build_loop_chunk(info.loop_start, info.loop_end));
        position += LOOP_CHUNK_SIZE;
    }

    tracing::debug!(
        "Exported {} samples x {} channels ({} bytes, loop={})",
        total,
        channels,
        position,
        info.loop_flag
    );
    Ok(position)
}

/// Reads the first loop of a "smpl" chunk from a RIFF/WAVE file.
pub fn read_loop_points(bytes: &[u8]) -> Option<LoopPoints> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return None;
    }

    let mut at = 12usize;
    while at + 8 <= bytes.len() {
        let id = &bytes[at..at + 4];
        let size = read_u32(bytes, at + 4)? as usize;
        let body = at + 8;

        if id == b"smpl" {
            let loops = read_u32(bytes, body + 28)?;
            if loops == 0 {
                return None;
            }
            return Some(LoopPoints {
                start: read_u32(bytes, body + 44)?,
                end: read_u32(bytes, body + 48)?,
            });
        }

        // Chunks are word aligned
        at = body.checked_add(size)?.checked_add(size & 1)?;
    }
    None
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::music::test_support::RampStream;

    fn le32(bytes: &[u8], at: usize) -> u32 {
        read_u32(bytes, at).unwrap()
    }

    #[test]
    fn header_fields() {
        let h = build_wav_header(1000, 44_100, 2, false);
        assert_eq!(&h[0..4], b"RIFF");
        assert_eq!(&h[8..16], b"WAVEfmt ");
        assert_eq!(le32(&h, 16), 16);
        assert_eq!(u16::from_le_bytes([h[20], h[21]]), 1);
        assert_eq!(u16::from_le_bytes([h[22], h[23]]), 2);
        assert_eq!(le32(&h, 24), 44_100);
        assert_eq!(le32(&h, 28), 44_100 * 4);
        assert_eq!(u16::from_le_bytes([h[32], h[33]]), 4);
        assert_eq!(u16::from_le_bytes([h[34], h[35]]), 16);
        assert_eq!(&h[36..40], b"data");
        assert_eq!(le32(&h, 40), 4000);
    }

    #[test]
    fn riff_size_is_total_minus_eight() {
        for &(count, rate, channels, looped) in &[
            (0u32, 8_000u32, 1u16, false),
            (1, 22_050, 1, true),
            (4001, 44_100, 2, false),
            (12_345, 48_000, 6, true),
        ] {
            let info = MusicInfo {
                sample_rate: rate,
                channels,
                num_samples: u64::from(count),
                loop_flag: looped,
                loop_start: count,
                loop_end: count,
            };
            let h = build_wav_header(count, rate, channels, looped);
            let total = compute_output_size(&info);
            assert_eq!(le32(&h, 4) as usize, total - 8, "count={count} ch={channels}");
        }
    }

    #[test]
    fn loop_chunk_layout() {
        let chunk = build_loop_chunk(100, 1000);
        assert_eq!(chunk.len(), 68);
        assert_eq!(&chunk[0..4], b"smpl");
        assert_eq!(le32(&chunk, 4), 0x3C);
        assert_eq!(le32(&chunk, 16), 45_351);
        assert_eq!(le32(&chunk, 20), 60);
        assert_eq!(le32(&chunk, 28), 30);
        assert_eq!(le32(&chunk, 36), 1);
        assert_eq!(le32(&chunk, 52), 100);
        assert_eq!(le32(&chunk, 56), 1000);
        assert_eq!(le32(&chunk, 64), 0);
    }

    #[test]
    fn loop_chunk_round_trips_extremes() {
        for &(start, end) in &[(0u32, 0u32), (0, u32::MAX), (i32::MAX as u32, i32::MAX as u32)] {
            let chunk = build_loop_chunk(start, end);
            assert_eq!((le32(&chunk, 52), le32(&chunk, 56)), (start, end));
        }
    }

    #[test]
    fn encode_looping_stream() {
        let info = MusicInfo {
            sample_rate: 44_100,
            channels: 2,
            num_samples: 1000,
            loop_flag: true,
            loop_start: 100,
            loop_end: 1000,
        };
        let mut stream = RampStream::new(info);
        stream.position = 321;

        let size = compute_output_size(&info);
        assert_eq!(size, 1000 * 2 * 2 + 0x2C + 0x44);

        let mut out = vec![0u8; size];
        assert_eq!(encode(&mut stream, &mut out).unwrap(), size);
        assert_eq!(stream.resets, 1);

        // Stream was rewound, so the first frame is sample 0 and the last is 999
        let pcm = &out[WAV_HEADER_SIZE..WAV_HEADER_SIZE + 4000];
        assert_eq!(i16::from_le_bytes([pcm[0], pcm[1]]), 0);
        assert_eq!(i16::from_le_bytes([pcm[3996], pcm[3997]]), 999);

        let smpl = &out[size - LOOP_CHUNK_SIZE..];
        assert_eq!(&smpl[0..4], b"smpl");
        assert_eq!(le32(smpl, 52), 100);
        assert_eq!(le32(smpl, 56), 1000);
        assert_eq!(le32(&out, 4) as usize, size - 8);

        assert_eq!(
            read_loop_points(&out),
            Some(LoopPoints {
                start: 100,
                end: 1000
            })
        );
    }

    #[test]
    fn encode_spans_multiple_chunks() {
        let info = MusicInfo {
            sample_rate: 8_000,
            channels: 1,
            num_samples: 9_001,
            ..Default::default()
        };
        let mut stream = RampStream::new(info);
        let mut out = vec![0u8; compute_output_size(&info)];
        let written = encode(&mut stream, &mut out).unwrap();

        assert_eq!(written, 9_001 * 2 + WAV_HEADER_SIZE);
        assert_eq!(stream.current_sample(), 9_001);
        assert_eq!(read_loop_points(&out), None);
    }

    #[test]
    fn encode_rejects_short_buffer() {
        let info = MusicInfo {
            sample_rate: 8_000,
            channels: 1,
            num_samples: 10,
            ..Default::default()
        };
        let mut stream = RampStream::new(info);
        let mut out = vec![0xEEu8; 40];
        let err = encode(&mut stream, &mut out).unwrap_err();

        assert!(matches!(err, MusicError::BufferTooSmall { needed: 64, got: 40 }));
        assert!(out.iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn encode_propagates_render_failure() {
        let info = MusicInfo {
            sample_rate: 8_000,
            channels: 1,
            num_samples: 10,
            ..Default::default()
        };
        let mut stream = RampStream::new(info);
        stream.fail_at = Some(5);
        let mut out = vec![0u8; compute_output_size(&info)];
        assert!(matches!(encode(&mut stream, &mut out), Err(MusicError::Decode(_))));
    }

    #[test]
    fn read_loop_points_skips_other_chunks() {
        let mut file = build_wav_header(0, 8_000, 1, true).to_vec();
        // Odd-sized LIST chunk before smpl exercises padding
        file.extend_from_slice(b"LIST");
        file.extend_from_slice(&3u32.to_le_bytes());
        file.extend_from_slice(&[1, 2, 3, 0]);
        file.extend_from_slice(&build_loop_chunk(7, 70));

        assert_eq!(read_loop_points(&file), Some(LoopPoints { start: 7, end: 70 }));
        assert_eq!(read_loop_points(b"RIFF"), None);
    }
}
