//! C ABI for the SADX media bridges.
//!
//! Two surfaces share this library:
//!
//! - `ffPlayer*`: a single process-wide video player. The host calls these
//!   from its render thread; decoding runs on a background thread.
//! - `BASS_VGMSTREAM_*`: music decoding, WAV export and (with the `bass`
//!   feature) BASS channels backed by the decoder.
//!
//! Every entry point catches panics and treats null pointers as a no-op
//! with the documented default return.

// FFI functions intentionally take raw pointers without `unsafe` on the fn signature.
// Safety is enforced inside each function body via null checks + the boundary helpers.
#![allow(clippy::not_unsafe_ptr_arg_deref)]
#![allow(non_snake_case)]

#[cfg(feature = "bass")]
pub mod bass;
pub mod error;
pub mod logging;
pub mod music;
pub mod safety;

use std::os::raw::{c_char, c_uint};
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use tracing::warn;

use sadx_media_core::audio::AudioOutput;
use sadx_media_core::{PlaybackController, PlayerConfig};

use crate::safety::{c_bytes, ffi_boundary_or};

#[cfg(feature = "ffmpeg")]
type Opener = sadx_media_core::ffmpeg_backend::FfmpegOpener;
#[cfg(not(feature = "ffmpeg"))]
type Opener = sadx_media_core::container::NoBackend;

static PLAYER: LazyLock<Mutex<PlaybackController<Opener>>> = LazyLock::new(|| {
    logging::init();
    Mutex::new(PlaybackController::with_audio_output(
        Opener::default(),
        audio_output(),
        PlayerConfig::from_env(),
    ))
});

#[cfg(feature = "bass")]
fn audio_output() -> Arc<dyn AudioOutput> {
    Arc::new(bass::BassOutput)
}

#[cfg(not(feature = "bass"))]
fn audio_output() -> Arc<dyn AudioOutput> {
    Arc::new(sadx_media_core::audio::NullAudioOutput)
}

/// Starts or resumes playback.
#[no_mangle]
pub extern "C" fn ffPlayerPlay() {
    ffi_boundary_or((), || PLAYER.lock().play())
}

#[no_mangle]
pub extern "C" fn ffPlayerPause() {
    ffi_boundary_or((), || PLAYER.lock().pause())
}

/// True once the open video has presented its last frame.
#[no_mangle]
pub extern "C" fn ffPlayerFinished() -> bool {
    ffi_boundary_or(false, || PLAYER.lock().finished())
}

/// Opens `path`, replacing any open video. Playback starts paused.
///
/// `sfd` selects the legacy container mode: audio is decoded as ADX and
/// forced to stereo.
#[no_mangle]
pub extern "C" fn ffPlayerOpen(path: *const c_char, sfd: bool) -> bool {
    ffi_boundary_or(false, || {
        let Some(path) = (unsafe { c_bytes(path) }) else {
            warn!("ffPlayerOpen called with a null path");
            return false;
        };
        PLAYER.lock().open(path, sfd).is_ok()
    })
}

/// Stops decoding and releases the open video. Safe to call repeatedly.
#[no_mangle]
pub extern "C" fn ffPlayerClose() {
    ffi_boundary_or((), || PLAYER.lock().close())
}

/// Copies the newest unseen frame as BGRA into `buffer`.
///
/// `buffer` must hold `ffPlayerWidth() * ffPlayerHeight() * 4` bytes.
/// Returns false when there is no new frame.
#[no_mangle]
pub extern "C" fn ffPlayerGetFrameBuffer(buffer: *mut u8) -> bool {
    ffi_boundary_or(false, || {
        if buffer.is_null() {
            return false;
        }
        let player = PLAYER.lock();
        let size = player.width() as usize * player.height() as usize * 4;
        if size == 0 {
            return false;
        }
        // SAFETY: the caller sizes `buffer` from the reported dimensions.
        let dst = unsafe { std::slice::from_raw_parts_mut(buffer, size) };
        player.try_get_frame(dst)
    })
}

/// Width of the open video, or 0.
#[no_mangle]
pub extern "C" fn ffPlayerWidth() -> c_uint {
    ffi_boundary_or(0, || PLAYER.lock().width())
}

/// Height of the open video, or 0.
#[no_mangle]
pub extern "C" fn ffPlayerHeight() -> c_uint {
    ffi_boundary_or(0, || PLAYER.lock().height())
}
