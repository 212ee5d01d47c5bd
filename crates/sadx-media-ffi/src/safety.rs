//! FFI boundary safety utilities.
//!
//! Every exported function runs its body inside [`ffi_boundary`] or
//! [`ffi_boundary_or`], so a Rust panic never unwinds into the host.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::ExportStatus;

/// Wraps a status-returning entry point with panic catching.
///
/// Returns [`ExportStatus::Failed`] if the closure panics.
///
/// # Safety rationale for `AssertUnwindSafe`
///
/// Shared state behind the boundary lives in `parking_lot::Mutex`, which
/// does not poison. On unwind the guard is dropped and the mutex is left
/// unlocked and usable.
pub fn ffi_boundary<F>(f: F) -> i32
where
    F: FnOnce() -> Result<(), ExportStatus>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => ExportStatus::Ok.as_raw(),
        Ok(Err(e)) => e.as_raw(),
        Err(_panic) => {
            tracing::error!("FFI: caught Rust panic at FFI boundary");
            ExportStatus::Failed.as_raw()
        }
    }
}

/// Wraps a non-status entry point with panic catching.
///
/// Returns `default` if the closure panics.
pub fn ffi_boundary_or<T, F>(default: T, f: F) -> T
where
    F: FnOnce() -> T,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(val) => val,
        Err(_panic) => {
            tracing::error!("FFI: caught Rust panic at FFI boundary");
            default
        }
    }
}

/// Reads an optional C string, replacing invalid UTF-8.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
pub unsafe fn c_string_lossy(ptr: *const std::os::raw::c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: guaranteed by the caller.
    Some(unsafe { std::ffi::CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Reads an optional C string as raw bytes, without the NUL.
///
/// The host passes paths in its own code page, so no decoding happens here.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string that outlives `'a`.
pub unsafe fn c_bytes<'a>(ptr: *const std::os::raw::c_char) -> Option<&'a [u8]> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: guaranteed by the caller.
    Some(unsafe { std::ffi::CStr::from_ptr(ptr) }.to_bytes())
}

/// Turns host path bytes into a filesystem path.
///
/// On Windows the bytes are in the ANSI code page and are widened with it.
#[cfg(windows)]
pub fn host_path(bytes: &[u8]) -> std::path::PathBuf {
    use std::os::windows::ffi::OsStringExt;
    use windows::Win32::Globalization::{MultiByteToWideChar, CP_ACP, MULTI_BYTE_TO_WIDE_CHAR_FLAGS};

    if bytes.is_empty() {
        return std::path::PathBuf::new();
    }
    // SAFETY: both slices are valid for the lengths the call reads and writes.
    let len = unsafe { MultiByteToWideChar(CP_ACP, MULTI_BYTE_TO_WIDE_CHAR_FLAGS(0), bytes, None) };
    let mut wide = vec![0u16; len.max(0) as usize];
    let written = unsafe {
        MultiByteToWideChar(CP_ACP, MULTI_BYTE_TO_WIDE_CHAR_FLAGS(0), bytes, Some(&mut wide))
    };
    wide.truncate(written.max(0) as usize);
    std::ffi::OsString::from_wide(&wide).into()
}

#[cfg(unix)]
pub fn host_path(bytes: &[u8]) -> std::path::PathBuf {
    use std::os::unix::ffi::OsStrExt;
    std::ffi::OsStr::from_bytes(bytes).into()
}

#[cfg(not(any(unix, windows)))]
pub fn host_path(bytes: &[u8]) -> std::path::PathBuf {
    String::from_utf8_lossy(bytes).into_owned().into()
}
