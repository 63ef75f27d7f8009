//! Compression operations.

use crate::error::{ErrorKind, Result};
use crate::{Compression, SpoolBuffer};
use bzip2::{Compression as BzCompression, read::BzDecoder, write::BzEncoder};
use exn::ResultExt;
use flate2::{Compression as GzCompression, read::GzDecoder, write::GzEncoder};
use std::io::{Read, Write};
use tracing::instrument;
use xz2::{read::XzDecoder, write::XzEncoder};

// Use the highest compression level available for the formats; this crate
// prioritizes storage space over speed. If a deployment finds these levels
// too resource-intensive, choose a different format.
const BZIP2_LEVEL: BzCompression = BzCompression::best();
const GZIP_LEVEL: GzCompression = GzCompression::best();
const XZ_LEVEL: u32 = 9;

/// Work with 32 KiB chunks.
const CHUNK_SIZE: usize = 32 * 1024;

/// Copy `src` into `dst` in fixed-size chunks, tagging read failures with
/// `read_kind` (source errors mean different things on the compress and
/// decompress paths).
fn copy_chunks(src: &mut impl Read, dst: &mut impl Write, read_kind: ErrorKind) -> Result<u64> {
    let mut buf = [0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = src.read(&mut buf).or_raise(|| read_kind.clone())?;
        if n == 0 {
            return Ok(total);
        }
        dst.write_all(&buf[..n]).or_raise(|| ErrorKind::Io)?;
        total += n as u64;
    }
}

impl Compression {
    /// Compress a byte slice in memory.
    ///
    /// # Examples
    ///
    /// ```
    /// use hoard_compress::Compression;
    ///
    /// let data = vec![0u8; 4096];
    /// let compressed = Compression::Bzip2.compress(&data).unwrap();
    /// assert!(compressed.len() < data.len());
    /// ```
    pub fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.compress_into(input, &mut output)?;
        Ok(output)
    }

    /// Decompress a byte slice in memory.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use hoard_compress::Compression;
    ///
    /// let original = b"Hello, world!";
    /// let compressed = Compression::Gzip.compress(original).unwrap();
    /// let decompressed = Compression::Gzip.decompress(&compressed).unwrap();
    /// assert_eq!(decompressed, original);
    /// ```
    pub fn decompress(&self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.decompress_into(input, &mut output)?;
        Ok(output)
    }

    #[instrument(skip(input, output), fields(format = %self, input_size = input.len(), output_size))]
    pub fn compress_into(&self, input: &[u8], output: &mut Vec<u8>) -> Result<usize> {
        let size = match self {
            Compression::None => {
                output.extend_from_slice(input);
                input.len()
            },
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(&mut *output, GZIP_LEVEL);
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
                output.len()
            },
            Compression::Bzip2 => {
                let mut encoder = BzEncoder::new(&mut *output, BZIP2_LEVEL);
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
                output.len()
            },
            Compression::Lzma => {
                let mut encoder = XzEncoder::new(&mut *output, XZ_LEVEL);
                encoder.write_all(input).or_raise(|| ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
                output.len()
            },
        };
        tracing::Span::current().record("output_size", size);
        Ok(size)
    }

    #[instrument(skip(input, output), fields(format = %self, input_size = input.len(), output_size))]
    pub fn decompress_into(&self, input: &[u8], output: &mut Vec<u8>) -> Result<usize> {
        let size = match self {
            Compression::None => {
                output.extend_from_slice(input);
                input.len()
            },
            Compression::Gzip => {
                let mut decoder = GzDecoder::new(input);
                decoder.read_to_end(output).or_raise(|| ErrorKind::InvalidData)?
            },
            Compression::Bzip2 => {
                let mut decoder = BzDecoder::new(input);
                decoder.read_to_end(output).or_raise(|| ErrorKind::InvalidData)?
            },
            Compression::Lzma => {
                let mut decoder = XzDecoder::new(input);
                decoder.read_to_end(output).or_raise(|| ErrorKind::InvalidData)?
            },
        };
        tracing::Span::current().record("output_size", size);
        Ok(size)
    }

    /// Wrap a reader with the appropriate decompression layer.
    ///
    /// Returns a boxed reader that yields the decoded stream. Decoders need
    /// no finalisation, so this is safe for pass-through use; corrupt input
    /// surfaces as read errors.
    pub fn wrap_reader<'a, R: Read + 'a>(&self, reader: R) -> Box<dyn Read + 'a> {
        match self {
            Compression::None => Box::new(reader),
            Compression::Gzip => Box::new(GzDecoder::new(reader)),
            Compression::Bzip2 => Box::new(BzDecoder::new(reader)),
            Compression::Lzma => Box::new(XzDecoder::new(reader)),
        }
    }

    /// Compress a stream into a fresh spool buffer, rewound and ready to
    /// read.
    ///
    /// The source is consumed in fixed-size chunks; output spills to disk
    /// past the in-memory threshold. On any failure the partial buffer is
    /// dropped with the error.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::io::{Cursor, Read};
    /// use hoard_compress::Compression;
    ///
    /// let body = vec![7u8; 10_000];
    /// let mut spool = Compression::Gzip.compress_spooled(Cursor::new(&body)).unwrap();
    /// let mut compressed = Vec::new();
    /// spool.read_to_end(&mut compressed).unwrap();
    /// assert!(compressed.len() < body.len());
    /// ```
    #[instrument(skip(src), fields(format = %self))]
    pub fn compress_spooled(&self, mut src: impl Read) -> Result<SpoolBuffer> {
        let mut spool = SpoolBuffer::new();
        match self {
            Compression::None => {
                copy_chunks(&mut src, &mut spool, ErrorKind::Io)?;
            },
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(&mut spool, GZIP_LEVEL);
                copy_chunks(&mut src, &mut encoder, ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
            },
            Compression::Bzip2 => {
                let mut encoder = BzEncoder::new(&mut spool, BZIP2_LEVEL);
                copy_chunks(&mut src, &mut encoder, ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
            },
            Compression::Lzma => {
                let mut encoder = XzEncoder::new(&mut spool, XZ_LEVEL);
                copy_chunks(&mut src, &mut encoder, ErrorKind::Io)?;
                encoder.finish().or_raise(|| ErrorKind::Io)?;
            },
        }
        spool.rewind()?;
        Ok(spool)
    }

    /// Decompress a stream into a fresh spool buffer, rewound and ready to
    /// read. Corrupt input fails the whole operation.
    #[instrument(skip(src), fields(format = %self))]
    pub fn decompress_spooled(&self, src: impl Read) -> Result<SpoolBuffer> {
        let mut decoder = self.wrap_reader(src);
        let mut spool = SpoolBuffer::new();
        copy_chunks(&mut decoder, &mut spool, ErrorKind::InvalidData)?;
        spool.rewind()?;
        Ok(spool)
    }
}
