//! Compression error types.
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction, with one actionable `ErrorKind` per failure category.

use derive_more::{Display, Error};

/// A compression error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for compression operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally. Any codec failure is fatal to the in-flight operation and the
/// partial output is discarded by the pipeline.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Data is corrupt or malformed. Don't retry with the same input.
    #[display("invalid or corrupted data")]
    InvalidData,
    /// The requested format is not one this build knows about.
    #[display("unsupported format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// An I/O operation on the source or the spool buffer failed.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Io)
    }
}
