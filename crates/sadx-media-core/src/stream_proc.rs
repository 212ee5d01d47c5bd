//! Pull-mode stream callback adapter.
//!
//! The mixer asks for up to N bytes at a time; [`StreamProc::fill`] answers
//! with rendered PCM and decides between continuing, rewinding for a
//! channel-level loop, or flagging the end of the stream.

use crate::music::MusicStream;

/// Flag OR'd into the returned byte count to end a pull stream.
pub const STREAM_PROC_END: u32 = 0x8000_0000;

/// Result of one callback invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamProcOutcome {
    /// Bytes written to the front of the caller's buffer.
    pub bytes: usize,
    /// The mixer should stop pulling after these bytes.
    pub ended: bool,
}

impl StreamProcOutcome {
    /// Encodes the outcome as a mixer callback return value.
    pub fn to_raw(self) -> u32 {
        let bytes = self.bytes as u32 & !STREAM_PROC_END;
        if self.ended {
            bytes | STREAM_PROC_END
        } else {
            bytes
        }
    }
}

/// Owns a music stream for the lifetime of a mixer channel.
///
/// Dropping the adapter closes the stream, so the channel's free
/// notification is the only place it needs to be released.
pub struct StreamProc<S: MusicStream> {
    stream: S,
    scratch: Vec<i16>,
}

impl<S: MusicStream> StreamProc<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            scratch: Vec::new(),
        }
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Fills `buf` with interleaved little-endian 16-bit PCM.
    ///
    /// `channel_loops` is the owning channel's own loop flag; when it is set
    /// a finished non-looping stream is rewound instead of ended.
    pub fn fill(&mut self, buf: &mut [u8], channel_loops: bool) -> StreamProcOutcome {
        let info = self.stream.info();
        let channels = usize::from(info.channels);
        if channels == 0 {
            return StreamProcOutcome {
                bytes: 0,
                ended: true,
            };
        }

        let max_samples = buf.len() / 2 / channels;
        let remaining = info.num_samples.saturating_sub(self.stream.current_sample());
        let (samples, mut ended) = if !info.loop_flag && (max_samples as u64) > remaining {
            (remaining as usize, true)
        } else {
            (max_samples, false)
        };

        let count = samples * channels;
        self.scratch.clear();
        self.scratch.resize(count, 0);
        let failed = match self.stream.render(&mut self.scratch) {
            Ok(()) => false,
            Err(e) => {
                tracing::warn!("Music render failed, ending stream: {}", e);
                self.scratch.fill(0);
                ended = true;
                true
            }
        };

        for (dst, sample) in buf.chunks_exact_mut(2).zip(self.scratch.iter()) {
            dst.copy_from_slice(&sample.to_le_bytes());
        }

        // A failed stream ends even on a looping channel
        if ended && channel_loops && !failed {
            match self.stream.reset() {
                Ok(()) => ended = false,
                Err(e) => tracing::warn!("Music reset failed: {}", e),
            }
        }

        StreamProcOutcome {
            bytes: count * 2,
            ended,
        }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::music::test_support::RampStream;
    use crate::music::MusicInfo;

    fn info(looping: bool) -> MusicInfo {
        MusicInfo {
            sample_rate: 32_000,
            channels: 2,
            num_samples: 10,
            loop_flag: looping,
            loop_start: 2,
            loop_end: 10,
        }
    }

    #[test]
    fn full_request_when_data_remains() {
        let mut proc = StreamProc::new(RampStream::new(info(false)));
        let mut buf = [0u8; 16];
        let out = proc.fill(&mut buf, false);

        assert_eq!(out, StreamProcOutcome { bytes: 16, ended: false });
        assert_eq!(out.to_raw(), 16);
        assert_eq!(i16::from_le_bytes([buf[12], buf[13]]), 3);
    }

    #[test]
    fn tail_is_rendered_then_ended() {
        let mut stream = RampStream::new(info(false));
        stream.position = 7;
        let mut proc = StreamProc::new(stream);
        let mut buf = [0u8; 64];
        let out = proc.fill(&mut buf, false);

        assert_eq!(out, StreamProcOutcome { bytes: 12, ended: true });
        assert_eq!(out.to_raw(), 12 | STREAM_PROC_END);
        assert_eq!(i16::from_le_bytes([buf[8], buf[9]]), 9);
    }

    #[test]
    fn channel_loop_rewinds_instead_of_ending() {
        let mut stream = RampStream::new(info(false));
        stream.position = 9;
        let mut proc = StreamProc::new(stream);
        let out = proc.fill(&mut [0u8; 64], true);

        assert_eq!(out, StreamProcOutcome { bytes: 4, ended: false });
        assert_eq!(proc.stream().resets, 1);
        assert_eq!(proc.stream().current_sample(), 0);
    }

    #[test]
    fn looping_stream_always_fills() {
        let mut stream = RampStream::new(info(true));
        stream.position = 9;
        let mut proc = StreamProc::new(stream);
        let mut buf = [0u8; 40];
        let out = proc.fill(&mut buf, false);

        assert_eq!(out, StreamProcOutcome { bytes: 40, ended: false });
        // 9, then wrap to loop start 2
        assert_eq!(i16::from_le_bytes([buf[0], buf[1]]), 9);
        assert_eq!(i16::from_le_bytes([buf[4], buf[5]]), 2);
    }

    #[test]
    fn render_error_ends_with_silence() {
        let mut stream = RampStream::new(info(false));
        stream.fail_at = Some(0);
        let mut proc = StreamProc::new(stream);
        let mut buf = [0xFFu8; 8];
        let out = proc.fill(&mut buf, false);

        assert!(out.ended);
        assert_eq!(buf, [0u8; 8]);
    }

    #[test]
    fn render_error_ends_even_on_looping_channel() {
        let mut stream = RampStream::new(info(false));
        stream.fail_at = Some(0);
        let mut proc = StreamProc::new(stream);
        let out = proc.fill(&mut [0u8; 8], true);

        assert!(out.ended);
        assert_eq!(out.to_raw() & STREAM_PROC_END, STREAM_PROC_END);
        assert_eq!(proc.stream().resets, 0);
    }
}
