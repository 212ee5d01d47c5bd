//! Music stream abstraction shared by the stream callback adapter and the
//! WAV exporter.

use std::path::Path;

use crate::adx::{AdxHeader, AdxMusicStream};
use crate::error::MusicError;
use crate::memory_source::MemoryStreamFile;
use crate::music_decoder::SymphoniaMusicStream;

/// Static description of a music stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MusicInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// Natural length in samples per channel.
    pub num_samples: u64,
    pub loop_flag: bool,
    pub loop_start: u32,
    pub loop_end: u32,
}

impl MusicInfo {
    /// Samples played with zero extra loops and no fade.
    pub fn play_samples(&self) -> u64 {
        if self.loop_flag {
            u64::from(self.loop_start)
        } else {
            self.num_samples
        }
    }

    /// Samples written by a full WAV export: the play length, extended to
    /// cover the loop end when it lies beyond.
    pub fn export_samples(&self) -> u64 {
        self.play_samples().max(u64::from(self.loop_end))
    }
}

/// A decodable, resettable stream of interleaved 16-bit PCM.
pub trait MusicStream: Send {
    fn info(&self) -> MusicInfo;

    /// Position of the next rendered sample, per channel.
    fn current_sample(&self) -> u64;

    /// Fills `out` with interleaved samples.
    ///
    /// `out.len()` must be a multiple of the channel count. Looping streams
    /// wrap from the loop end back to the loop start internally; other
    /// streams render silence past their end.
    fn render(&mut self, out: &mut [i16]) -> Result<(), MusicError>;

    /// Rewinds to the first sample.
    fn reset(&mut self) -> Result<(), MusicError>;
}

impl<S: MusicStream + ?Sized> MusicStream for Box<S> {
    fn info(&self) -> MusicInfo {
        (**self).info()
    }

    fn current_sample(&self) -> u64 {
        (**self).current_sample()
    }

    fn render(&mut self, out: &mut [i16]) -> Result<(), MusicError> {
        (**self).render(out)
    }

    fn reset(&mut self) -> Result<(), MusicError> {
        (**self).reset()
    }
}

/// Opens a music file held in memory.
///
/// ADX data (recognized by its header, or by an `.adx` name) gets the ADX
/// decoder; everything else goes through symphonia.
pub fn open_memory(source: MemoryStreamFile) -> Result<Box<dyn MusicStream>, MusicError> {
    let adx_name = Path::new(source.name())
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("adx"));
    if adx_name || AdxHeader::sniff(source.bytes()) {
        Ok(Box::new(AdxMusicStream::open_memory(source)?))
    } else {
        Ok(Box::new(SymphoniaMusicStream::open_memory(source)?))
    }
}

/// Reads `path` fully into memory and opens it with [`open_memory`].
pub fn open_path(path: &Path) -> Result<Box<dyn MusicStream>, MusicError> {
    let data = std::fs::read(path).map_err(|e| MusicError::Open(format!("{}: {e}", path.display())))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    open_memory(MemoryStreamFile::new(data, name))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Ramp stream: every sample of frame `n` has the value `n as i16`.
    pub struct RampStream {
        pub info: MusicInfo,
        pub position: u64,
        pub resets: usize,
        pub fail_at: Option<u64>,
    }

    impl RampStream {
        pub fn new(info: MusicInfo) -> Self {
            Self {
                info,
                position: 0,
                resets: 0,
                fail_at: None,
            }
        }
    }

    impl MusicStream for RampStream {
        fn info(&self) -> MusicInfo {
            self.info
        }

        fn current_sample(&self) -> u64 {
            self.position
        }

        fn render(&mut self, out: &mut [i16]) -> Result<(), MusicError> {
            let channels = usize::from(self.info.channels.max(1));
            for frame in out.chunks_mut(channels) {
                if self.fail_at == Some(self.position) {
                    return Err(MusicError::Decode("scripted failure".into()));
                }
                if self.info.loop_flag && self.position >= u64::from(self.info.loop_end) {
                    self.position = u64::from(self.info.loop_start);
                }
                let value = if self.position < self.info.num_samples {
                    self.position as i16
                } else {
                    0
                };
                frame.fill(value);
                self.position += 1;
            }
            Ok(())
        }

        fn reset(&mut self) -> Result<(), MusicError> {
            self.position = 0;
            self.resets += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_samples_extend_to_loop_end() {
        let info = MusicInfo {
            sample_rate: 44_100,
            channels: 2,
            num_samples: 1000,
            loop_flag: true,
            loop_start: 100,
            loop_end: 1000,
        };
        assert_eq!(info.play_samples(), 100);
        assert_eq!(info.export_samples(), 1000);
    }

    #[test]
    fn non_looping_export_uses_natural_length() {
        let info = MusicInfo {
            sample_rate: 22_050,
            channels: 1,
            num_samples: 500,
            ..Default::default()
        };
        assert_eq!(info.export_samples(), 500);
    }

    #[test]
    fn open_memory_picks_decoder_by_content() {
        let adx = crate::adx::tests::adx_file(32_000, 2, 96, Some((40, 80)), &[]);
        let stream = open_memory(MemoryStreamFile::new(adx, "track")).unwrap();
        let info = stream.info();
        assert_eq!((info.sample_rate, info.channels, info.num_samples), (32_000, 2, 96));
        assert!(info.loop_flag);

        let mut wav = crate::wav::build_wav_header(4, 8_000, 1, false).to_vec();
        wav.extend_from_slice(&[0u8; 8]);
        let stream = open_memory(MemoryStreamFile::new(wav, "track.wav")).unwrap();
        assert_eq!(stream.info().sample_rate, 8_000);
    }

    #[test]
    fn adx_name_with_bad_data_is_rejected() {
        let err = open_memory(MemoryStreamFile::new(vec![0u8; 64], "bgm.adx"));
        assert!(matches!(err, Err(MusicError::UnsupportedFormat(_))));
    }
}
