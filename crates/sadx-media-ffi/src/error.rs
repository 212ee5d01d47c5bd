//! Status codes returned across the C boundary.

use sadx_media_core::MusicError;

/// Result codes of `BASS_VGMSTREAM_ConvertVGMStreamToWav`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStatus {
    Ok = 0,
    Failed = 1,
}

impl From<MusicError> for ExportStatus {
    fn from(_: MusicError) -> Self {
        ExportStatus::Failed
    }
}

impl ExportStatus {
    /// Convert to the raw i32 for FFI return.
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}
