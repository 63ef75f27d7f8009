//! Storage-proxy error types.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A storage-proxy error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage-proxy operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The spool area could not be read or written.
    #[display("spool disk error: {}", _0.display())]
    Disk(#[error(not(source))] PathBuf),
    /// A queued metadata file did not parse.
    #[display("corrupt queue entry: {}", _0.display())]
    Corrupt(#[error(not(source))] PathBuf),
}
