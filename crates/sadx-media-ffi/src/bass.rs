//! Bindings to the host's BASS mixing library.
//!
//! Provides the push-mode [`AudioOutput`] used for video soundtracks and the
//! pull-mode music stream constructors. BASS is already loaded by the host,
//! so only the handful of functions used here are declared.

use std::os::raw::{c_char, c_int, c_void};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use sadx_media_core::audio::{AudioFormat, AudioOutput, AudioSink};
use sadx_media_core::memory_source::MemoryStreamFile;
use sadx_media_core::music::{self, MusicStream};
use sadx_media_core::stream_proc::{StreamProc, STREAM_PROC_END};
use sadx_media_core::{MediaError, MusicError};

use crate::safety::{c_bytes, c_string_lossy, ffi_boundary_or, host_path};

type Dword = u32;
type Qword = u64;
type Bool = c_int;

type StreamProcFn =
    unsafe extern "system" fn(handle: Dword, buffer: *mut c_void, length: Dword, user: *mut c_void) -> Dword;
type SyncProcFn = unsafe extern "system" fn(handle: Dword, channel: Dword, data: Dword, user: *mut c_void);

const BASS_SAMPLE_LOOP: Dword = 4;
const BASS_SAMPLE_FLOAT: Dword = 256;
const BASS_SYNC_FREE: Dword = 8;
const BASS_SYNC_MIXTIME: Dword = 0x4000_0000;
const BASS_POS_BYTE: Dword = 0;
const BASS_ERROR_DWORD: Dword = Dword::MAX;
const BASS_ERROR_QWORD: Qword = Qword::MAX;

#[link(name = "bass")]
extern "system" {
    fn BASS_StreamCreate(freq: Dword, chans: Dword, flags: Dword, proc_: *const c_void, user: *mut c_void) -> Dword;
    fn BASS_StreamPutData(handle: Dword, buffer: *const c_void, length: Dword) -> Dword;
    fn BASS_StreamFree(handle: Dword) -> Bool;
    fn BASS_ChannelPlay(handle: Dword, restart: Bool) -> Bool;
    fn BASS_ChannelPause(handle: Dword) -> Bool;
    fn BASS_ChannelFlags(handle: Dword, flags: Dword, mask: Dword) -> Dword;
    fn BASS_ChannelSetSync(handle: Dword, kind: Dword, param: Qword, proc_: SyncProcFn, user: *mut c_void) -> Dword;
    fn BASS_ChannelGetPosition(handle: Dword, mode: Dword) -> Qword;
    fn BASS_ChannelBytes2Seconds(handle: Dword, pos: Qword) -> f64;
    fn BASS_ErrorGetCode() -> c_int;
}

/// `STREAMPROC_PUSH`: the stream is fed with `BASS_StreamPutData`.
fn streamproc_push() -> *const c_void {
    usize::MAX as *const c_void
}

fn last_error(call: &str) -> MediaError {
    // SAFETY: plain query of thread-local BASS state.
    let code = unsafe { BASS_ErrorGetCode() };
    MediaError::Audio(format!("{call} failed (BASS error {code})"))
}

/// A BASS push stream of interleaved f32.
pub struct BassSink {
    handle: Dword,
}

impl AudioSink for BassSink {
    fn put_data(&self, samples: &[f32]) -> Result<(), MediaError> {
        let bytes = std::mem::size_of_val(samples);
        let len = Dword::try_from(bytes).map_err(|_| MediaError::Audio(format!("{bytes} bytes is too large")))?;
        // SAFETY: BASS copies `len` bytes out of the slice before returning.
        let queued = unsafe { BASS_StreamPutData(self.handle, samples.as_ptr() as *const c_void, len) };
        if queued == BASS_ERROR_DWORD {
            return Err(last_error("BASS_StreamPutData"));
        }
        Ok(())
    }

    fn play(&self) -> Result<(), MediaError> {
        // SAFETY: the handle is live until drop.
        if unsafe { BASS_ChannelPlay(self.handle, 0) } == 0 {
            return Err(last_error("BASS_ChannelPlay"));
        }
        Ok(())
    }

    fn pause(&self) -> Result<(), MediaError> {
        // Pausing keeps the queued samples; a stop would flush them.
        // SAFETY: the handle is live until drop.
        if unsafe { BASS_ChannelPause(self.handle) } == 0 {
            return Err(last_error("BASS_ChannelPause"));
        }
        Ok(())
    }

    fn played_duration(&self) -> Option<Duration> {
        // SAFETY: the handle is live until drop.
        let secs = unsafe {
            let pos = BASS_ChannelGetPosition(self.handle, BASS_POS_BYTE);
            if pos == BASS_ERROR_QWORD {
                return None;
            }
            BASS_ChannelBytes2Seconds(self.handle, pos)
        };
        (secs.is_finite() && secs >= 0.0).then(|| Duration::from_secs_f64(secs))
    }
}

impl Drop for BassSink {
    fn drop(&mut self) {
        // SAFETY: the handle was created by BassOutput and is freed once.
        unsafe {
            BASS_StreamFree(self.handle);
        }
    }
}

/// Creates float push streams on the host's current BASS device.
#[derive(Debug, Default, Clone, Copy)]
pub struct BassOutput;

impl AudioOutput for BassOutput {
    fn create_push_stream(&self, format: AudioFormat) -> Result<Arc<dyn AudioSink>, MediaError> {
        // SAFETY: push streams take no callback or user data.
        let handle = unsafe {
            BASS_StreamCreate(
                format.sample_rate,
                Dword::from(format.channels),
                BASS_SAMPLE_FLOAT,
                streamproc_push(),
                std::ptr::null_mut(),
            )
        };
        if handle == 0 {
            return Err(last_error("BASS_StreamCreate"));
        }
        debug!(
            "Created BASS push stream {}: {}Hz, {} ch",
            handle, format.sample_rate, format.channels
        );
        Ok(Arc::new(BassSink { handle }))
    }
}

type MusicProc = StreamProc<Box<dyn MusicStream>>;

unsafe extern "system" fn music_stream_proc(
    handle: Dword,
    buffer: *mut c_void,
    length: Dword,
    user: *mut c_void,
) -> Dword {
    ffi_boundary_or(STREAM_PROC_END, || {
        if buffer.is_null() || user.is_null() {
            return STREAM_PROC_END;
        }
        // SAFETY: `user` is the MusicProc registered with this channel and is
        // only freed by the channel's free sync, after the last callback.
        let proc_ = unsafe { &mut *(user as *mut MusicProc) };
        let buf = unsafe { std::slice::from_raw_parts_mut(buffer as *mut u8, length as usize) };

        let flags = unsafe { BASS_ChannelFlags(handle, 0, 0) };
        let channel_loops = flags != BASS_ERROR_DWORD && flags & BASS_SAMPLE_LOOP != 0;
        proc_.fill(buf, channel_loops).to_raw()
    })
}

unsafe extern "system" fn music_stream_free(_sync: Dword, channel: Dword, _data: Dword, user: *mut c_void) {
    ffi_boundary_or((), || {
        if user.is_null() {
            return;
        }
        debug!("Freeing music stream for channel {}", channel);
        // SAFETY: ownership of the MusicProc was handed to this sync.
        drop(unsafe { Box::from_raw(user as *mut MusicProc) });
    })
}

/// Wraps `stream` in a pull-mode BASS channel that owns it.
fn create_music_channel(stream: Box<dyn MusicStream>, flags: Dword) -> Dword {
    let info = stream.info();
    let user = Box::into_raw(Box::new(MusicProc::new(stream))) as *mut c_void;
    let callback = music_stream_proc as StreamProcFn;

    // SAFETY: `user` stays alive until music_stream_free runs, or is freed
    // below when the channel could not be created.
    unsafe {
        let handle = BASS_StreamCreate(
            info.sample_rate,
            Dword::from(info.channels),
            flags,
            callback as *const c_void,
            user,
        );
        if handle == 0 {
            warn!("{}", last_error("BASS_StreamCreate"));
            drop(Box::from_raw(user as *mut MusicProc));
            return 0;
        }
        if BASS_ChannelSetSync(handle, BASS_SYNC_FREE | BASS_SYNC_MIXTIME, 0, music_stream_free, user) == 0 {
            warn!("{}", last_error("BASS_ChannelSetSync"));
            BASS_StreamFree(handle);
            drop(Box::from_raw(user as *mut MusicProc));
            return 0;
        }
        info!(
            "Created music channel {}: {}Hz, {} ch, loop={}",
            handle, info.sample_rate, info.channels, info.loop_flag
        );
        handle
    }
}

fn open_or_log(result: Result<Box<dyn MusicStream>, MusicError>, what: &str) -> Option<Box<dyn MusicStream>> {
    match result {
        Ok(stream) => Some(stream),
        Err(e) => {
            warn!("Failed to open music {}: {}", what, e);
            None
        }
    }
}

/// Creates a BASS channel playing the music file at `file`. Returns 0 on failure.
#[no_mangle]
pub extern "C" fn BASS_VGMSTREAM_StreamCreate(file: *const c_char, flags: Dword) -> Dword {
    crate::logging::init();
    ffi_boundary_or(0, || {
        let Some(raw) = (unsafe { c_bytes(file) }) else {
            return 0;
        };
        let path = host_path(raw);
        open_or_log(music::open_path(&path), &path.to_string_lossy())
            .map_or(0, |stream| create_music_channel(stream, flags))
    })
}

/// Creates a BASS channel playing a music file held in memory. Returns 0 on failure.
///
/// # Safety
/// `buf` must stay valid and unmodified until the channel is freed.
#[no_mangle]
pub extern "C" fn BASS_VGMSTREAM_StreamCreateFromMemory(
    buf: *mut u8,
    size: c_int,
    name: *const c_char,
    flags: Dword,
) -> Dword {
    crate::logging::init();
    ffi_boundary_or(0, || {
        if buf.is_null() || size <= 0 {
            return 0;
        }
        let name = unsafe { c_string_lossy(name) }.unwrap_or_default();
        let source = unsafe { MemoryStreamFile::from_raw_parts(buf, size as usize, name.as_str()) };
        open_or_log(music::open_memory(source), &name)
            .map_or(0, |stream| create_music_channel(stream, flags))
    })
}
