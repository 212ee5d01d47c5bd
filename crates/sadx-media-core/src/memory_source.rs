//! Memory-backed random-access source.
//!
//! A [`MemoryStreamFile`] exposes an in-memory byte buffer through the
//! file-like contract music decoders expect: bounded reads at arbitrary
//! offsets, a logical name, and reopen-by-name. Malformed requests degrade to
//! zero-length reads instead of failing.

use std::io::{self, Read, Seek, SeekFrom};

use bytes::Bytes;
use symphonia::core::io::MediaSource;

/// A read-only, named view of an in-memory buffer.
///
/// Cloning the underlying [`Bytes`] is cheap, so every handle opened through
/// [`MemoryStreamFile::open`] shares the same storage while keeping its own
/// offsets.
#[derive(Debug, Clone)]
pub struct MemoryStreamFile {
    data: Bytes,
    name: String,
    /// Start offset of the last successful [`read_at`](Self::read_at).
    last_offset: u64,
    /// Cursor for the `io::Read`/`io::Seek` view.
    cursor: u64,
}

impl MemoryStreamFile {
    /// Creates a source over `data` with the logical name `name`.
    pub fn new(data: impl Into<Bytes>, name: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            name: name.into(),
            last_offset: 0,
            cursor: 0,
        }
    }

    /// Creates a source over a buffer owned by the caller.
    ///
    /// The buffer is never freed by this crate.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `len` bytes, and the memory must stay
    /// alive and unmodified until every handle derived from the returned
    /// source has been dropped.
    pub unsafe fn from_raw_parts(ptr: *const u8, len: usize, name: impl Into<String>) -> Self {
        let slice: &'static [u8] = if ptr.is_null() || len == 0 {
            &[]
        } else {
            // SAFETY: guaranteed by the caller.
            unsafe { std::slice::from_raw_parts(ptr, len) }
        };
        Self::new(Bytes::from_static(slice), name)
    }

    /// Copies up to `dst.len()` bytes starting at `offset` into `dst`.
    ///
    /// Returns the number of bytes copied, clamped to the buffer end. Returns
    /// 0 when `dst` is empty or `offset` is at or past the end.
    pub fn read_at(&mut self, offset: u64, dst: &mut [u8]) -> usize {
        let size = self.data.len() as u64;
        if dst.is_empty() || offset >= size {
            return 0;
        }

        let start = offset as usize;
        let n = dst.len().min(self.data.len() - start);
        dst[..n].copy_from_slice(&self.data[start..start + n]);
        self.last_offset = offset;
        n
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Start offset of the last successful read.
    pub fn offset(&self) -> u64 {
        self.last_offset
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copies the name into `buf` as a NUL-terminated string, truncating when
    /// it does not fit. Returns the number of name bytes written.
    pub fn name_into(&self, buf: &mut [u8]) -> usize {
        let Some(room) = buf.len().checked_sub(1) else {
            return 0;
        };
        let n = self.name.len().min(room);
        buf[..n].copy_from_slice(&self.name.as_bytes()[..n]);
        buf[n] = 0;
        n
    }

    /// Opens an independent handle, but only for this source's own name.
    pub fn open(&self, filename: &str) -> Option<MemoryStreamFile> {
        if filename != self.name {
            return None;
        }
        Some(Self::new(self.data.clone(), self.name.clone()))
    }

    /// The whole buffer.
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }
}

impl Read for MemoryStreamFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.read_at(self.cursor, buf);
        self.cursor += n as u64;
        Ok(n)
    }
}

impl Seek for MemoryStreamFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let size = self.size() as i128;
        let target = match pos {
            SeekFrom::Start(p) => p as i128,
            SeekFrom::End(d) => size + d as i128,
            SeekFrom::Current(d) => self.cursor as i128 + d as i128,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of memory stream",
            ));
        }
        self.cursor = target as u64;
        Ok(self.cursor)
    }
}

impl MediaSource for MemoryStreamFile {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        Some(self.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> MemoryStreamFile {
        MemoryStreamFile::new((0u8..100).collect::<Vec<_>>(), "bgm.adx")
    }

    #[test]
    fn read_is_clamped_to_buffer_end() {
        let mut src = source();
        let mut dst = [0u8; 32];

        assert_eq!(src.read_at(90, &mut dst), 10);
        assert_eq!(&dst[..10], &[90, 91, 92, 93, 94, 95, 96, 97, 98, 99]);
        assert_eq!(src.offset(), 90);
    }

    #[test]
    fn read_past_end_returns_zero() {
        let mut src = source();
        let mut dst = [0xAAu8; 4];

        assert_eq!(src.read_at(100, &mut dst), 0);
        assert_eq!(src.read_at(u64::MAX, &mut dst), 0);
        assert_eq!(src.read_at(0, &mut []), 0);
        assert_eq!(dst, [0xAA; 4]);
        // Failed reads leave the offset untouched
        assert_eq!(src.offset(), 0);
    }

    #[test]
    fn name_copy_truncates() {
        let src = source();
        let mut buf = [0xFFu8; 4];
        assert_eq!(src.name_into(&mut buf), 3);
        assert_eq!(&buf, b"bgm\0");
        assert_eq!(src.name_into(&mut []), 0);
    }

    #[test]
    fn open_requires_matching_name() {
        let mut src = source();
        let mut dst = [0u8; 1];
        src.read_at(50, &mut dst);

        assert!(src.open("other.adx").is_none());
        let reopened = src.open("bgm.adx").expect("same name reopens");
        assert_eq!(reopened.offset(), 0);
        assert_eq!(reopened.size(), 100);
        assert_eq!(src.offset(), 50);
    }

    #[test]
    fn io_read_and_seek() {
        let mut src = source();
        let mut buf = [0u8; 4];
        src.seek(SeekFrom::End(-2)).unwrap();
        assert_eq!(src.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[98, 99]);
        assert_eq!(src.read(&mut buf).unwrap(), 0);
        assert!(src.seek(SeekFrom::Current(-200)).is_err());
    }

    #[test]
    fn raw_parts_null_is_empty() {
        // SAFETY: null pointers are mapped to an empty buffer.
        let mut src = unsafe { MemoryStreamFile::from_raw_parts(std::ptr::null(), 16, "x") };
        assert_eq!(src.size(), 0);
        assert_eq!(src.read_at(0, &mut [0u8; 4]), 0);
    }
}
