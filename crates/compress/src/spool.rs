//! Spill-to-disk byte buffer.
//!
//! Codec output lands in a [`SpoolBuffer`]: bytes stay in memory up to a
//! fixed threshold, after which the buffer transparently moves to an unnamed
//! temporary file. This keeps the pipeline safe for entities of any size
//! while avoiding disk I/O for the common small case.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::{Read, Seek, SeekFrom, Write};
use tempfile::SpooledTempFile;

/// Keep up to 256 KiB in memory before spilling to disk.
const SPOOL_THRESHOLD: usize = 256 * 1024;

/// A read/write buffer that spills to a temporary file past a size threshold.
///
/// Write the transformed stream into it, then [`rewind`](SpoolBuffer::rewind)
/// and hand it off as a reader. The backing file (if any) is unlinked by the
/// OS once the buffer is dropped.
///
/// # Examples
///
/// ```
/// use std::io::{Read, Write};
/// use hoard_compress::SpoolBuffer;
///
/// let mut spool = SpoolBuffer::new();
/// spool.write_all(b"payload").unwrap();
/// spool.rewind().unwrap();
/// let mut out = Vec::new();
/// spool.read_to_end(&mut out).unwrap();
/// assert_eq!(out, b"payload");
/// ```
pub struct SpoolBuffer {
    inner: SpooledTempFile,
    written: u64,
}

impl SpoolBuffer {
    /// Create an empty buffer with the standard spill threshold.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: SpooledTempFile::new(SPOOL_THRESHOLD),
            written: 0,
        }
    }

    /// Total number of bytes written into the buffer.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.written
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Seek back to the start, ready for reading.
    pub fn rewind(&mut self) -> Result<()> {
        self.inner.seek(SeekFrom::Start(0)).or_raise(|| ErrorKind::Io)?;
        Ok(())
    }
}

impl Default for SpoolBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for SpoolBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl Read for SpoolBuffer {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for SpoolBuffer {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}
