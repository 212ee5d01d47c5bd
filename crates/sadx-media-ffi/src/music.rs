//! In-memory music conversion entry points.
//!
//! The host hands over a music file it already holds in memory, asks for
//! the size of the WAV rendition, allocates that many bytes and has the
//! stream rendered into it.

use std::os::raw::{c_char, c_int, c_void};

use tracing::{info, warn};

use sadx_media_core::memory_source::MemoryStreamFile;
use sadx_media_core::music::{self, MusicStream};
use sadx_media_core::wav;

use crate::error::ExportStatus;
use crate::safety::{c_string_lossy, ffi_boundary, ffi_boundary_or};

/// Opaque music handle given to the host.
pub struct MusicHandle {
    stream: Box<dyn MusicStream>,
}

/// Opens a decoder over `size` bytes at `data`.
///
/// Returns null when the data is missing or cannot be decoded. ADX data is
/// recognised by its header or an `.adx` name; anything else goes to
/// symphonia with `name`'s extension as a hint.
///
/// # Safety
/// `data` must stay valid and unmodified until the handle is closed.
#[no_mangle]
pub extern "C" fn BASS_VGMSTREAM_InitVGMStreamFromMemory(
    data: *mut c_void,
    size: c_int,
    name: *const c_char,
) -> *mut c_void {
    crate::logging::init();
    ffi_boundary_or(std::ptr::null_mut(), || {
        if data.is_null() || size <= 0 {
            return std::ptr::null_mut();
        }
        let name = unsafe { c_string_lossy(name) }.unwrap_or_default();
        let source =
            unsafe { MemoryStreamFile::from_raw_parts(data as *const u8, size as usize, name.as_str()) };

        match music::open_memory(source) {
            Ok(stream) => {
                let info = stream.info();
                info!(
                    "Opened music {}: {}Hz, {} ch, {} samples, loop={}",
                    name, info.sample_rate, info.channels, info.num_samples, info.loop_flag
                );
                Box::into_raw(Box::new(MusicHandle { stream })) as *mut c_void
            }
            Err(e) => {
                warn!("Failed to open music {}: {}", name, e);
                std::ptr::null_mut()
            }
        }
    })
}

/// Frees a handle from [`BASS_VGMSTREAM_InitVGMStreamFromMemory`]. Null is a no-op.
#[no_mangle]
pub extern "C" fn BASS_VGMSTREAM_CloseVGMStream(handle: *mut c_void) {
    ffi_boundary_or((), || {
        if handle.is_null() {
            return;
        }
        // SAFETY: non-null handles only come from Box::into_raw above.
        drop(unsafe { Box::from_raw(handle as *mut MusicHandle) });
    })
}

/// Size in bytes of the WAV produced by the conversion, or 0 for null.
#[no_mangle]
pub extern "C" fn BASS_VGMSTREAM_GetVGMStreamOutputSize(handle: *mut c_void) -> c_int {
    ffi_boundary_or(0, || {
        let Some(music) = (unsafe { (handle as *const MusicHandle).as_ref() }) else {
            return 0;
        };
        let size = wav::compute_output_size(&music.stream.info());
        c_int::try_from(size).unwrap_or_else(|_| {
            warn!("WAV output of {} bytes does not fit the C interface", size);
            0
        })
    })
}

/// Renders the whole stream as WAV into `output`.
///
/// Returns 0 on success and 1 on error.
///
/// # Safety
/// `output` must be writable for
/// [`BASS_VGMSTREAM_GetVGMStreamOutputSize`] bytes.
#[no_mangle]
pub extern "C" fn BASS_VGMSTREAM_ConvertVGMStreamToWav(
    handle: *mut c_void,
    output: *mut c_char,
) -> c_int {
    ffi_boundary(|| {
        if output.is_null() {
            return Err(ExportStatus::Failed);
        }
        let Some(music) = (unsafe { (handle as *mut MusicHandle).as_mut() }) else {
            return Err(ExportStatus::Failed);
        };

        let size = wav::compute_output_size(&music.stream.info());
        // SAFETY: the caller sized `output` from GetVGMStreamOutputSize.
        let out = unsafe { std::slice::from_raw_parts_mut(output as *mut u8, size) };
        match wav::encode(&mut music.stream, out) {
            Ok(written) => {
                info!("Exported {} bytes of WAV", written);
                Ok(())
            }
            Err(e) => {
                warn!("WAV export failed: {}", e);
                Err(e.into())
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_input_gives_null_handle() {
        let mut data = vec![0u8; 64];
        let name = std::ffi::CString::new("garbage.bin").unwrap();
        let handle = BASS_VGMSTREAM_InitVGMStreamFromMemory(
            data.as_mut_ptr() as *mut c_void,
            data.len() as c_int,
            name.as_ptr(),
        );
        assert!(handle.is_null());
    }

    #[test]
    fn empty_input_gives_null_handle() {
        let handle =
            BASS_VGMSTREAM_InitVGMStreamFromMemory(std::ptr::null_mut(), 16, std::ptr::null());
        assert!(handle.is_null());
        let mut byte = 0u8;
        let handle = BASS_VGMSTREAM_InitVGMStreamFromMemory(
            &mut byte as *mut u8 as *mut c_void,
            0,
            std::ptr::null(),
        );
        assert!(handle.is_null());
    }
}
