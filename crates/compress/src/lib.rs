//! Compression and decompression codecs.
//!
//! Every hoard service moves entity bodies through the same small set of
//! streaming codecs. Bodies are consumed in fixed-size chunks and written to
//! a spill-to-disk buffer so that arbitrarily large entities never have to
//! fit in memory.

mod construct;
pub mod error;
mod ops;
mod spool;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::spool::SpoolBuffer;

/// Compression format enum.
///
/// The `None` variant is the identity algorithm: a no-op that copies bytes
/// through unchanged. On the wire, "no compression" is expressed as a JSON
/// `null`, so record types carry an `Option<Compression>` and treat both
/// `None`s equivalently.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Uncompressed
    #[default]
    None,
    /// Gzip/zlib compression ("gzip")
    Gzip,
    /// Bzip2 compression ("bz2")
    Bzip2,
    /// XZ/LZMA compression ("lzma")
    Lzma,
}

impl Compression {
    /// Every real algorithm, in wire-name order. Excludes the identity.
    pub const ALL: [Compression; 3] = [Compression::Gzip, Compression::Bzip2, Compression::Lzma];
}
