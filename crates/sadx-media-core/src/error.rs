//! Error types for the video pipeline and the music bridge (thiserror-based).

use thiserror::Error;

/// Errors raised while opening or running a media session.
///
/// Only [`MediaError::Open`]-class variants ever escape to the host; errors
/// raised inside the decode loop are counted and reported as events.
#[derive(Error, Debug)]
pub enum MediaError {
    /// The container could not be opened or probed.
    #[error("Failed to open media '{path}': {reason}")]
    Open { path: String, reason: String },

    /// The container has no video stream.
    #[error("No video stream found in '{0}'")]
    NoVideoStream(String),

    /// A codec, scaler or resampler context could not be created.
    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    /// A packet failed to decode.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A frame buffer could not be allocated.
    #[error("Failed to allocate {0} bytes for a frame")]
    Allocation(usize),

    /// The audio sink rejected an operation.
    #[error("Audio output error: {0}")]
    Audio(String),

    /// The decode thread could not be spawned.
    #[error("Failed to spawn decode thread: {0}")]
    Thread(#[source] std::io::Error),

    /// No container backend is compiled into this build.
    #[error("No container backend available")]
    BackendUnavailable,
}

/// Errors raised by the music bridge (decoder streams and WAV export).
#[derive(Error, Debug)]
pub enum MusicError {
    /// Failed to open or probe a music stream.
    #[error("Failed to open music stream: {0}")]
    Open(String),

    /// The stream format or codec is not supported.
    #[error("Unsupported music format: {0}")]
    UnsupportedFormat(String),

    /// A packet or frame failed to decode.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The caller-supplied export buffer cannot hold the full WAV file.
    #[error("Export buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall { needed: usize, got: usize },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<symphonia::core::errors::Error> for MusicError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        use symphonia::core::errors::Error;
        match err {
            Error::IoError(e) => MusicError::Io(e),
            Error::Unsupported(what) => MusicError::UnsupportedFormat(what.to_string()),
            other => MusicError::Decode(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_error_display() {
        let err = MediaError::Open {
            path: "movie.sfd".to_string(),
            reason: "not found".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to open media 'movie.sfd': not found");
    }

    #[test]
    fn buffer_too_small_display() {
        let err = MusicError::BufferTooSmall { needed: 100, got: 44 };
        assert_eq!(err.to_string(), "Export buffer too small: need 100 bytes, got 44");
    }

    #[test]
    fn symphonia_unsupported_maps_to_format_error() {
        let err: MusicError = symphonia::core::errors::Error::Unsupported("codec").into();
        assert!(matches!(err, MusicError::UnsupportedFormat(_)));
    }
}
