//! Storage error types.
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. The variants mirror the errno classes the local
//! backend can hit; request handlers and maintenance loops dispatch on them.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// File does not exist
    #[display("file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Access denied by the operating system
    #[display("permission denied: {}", _0.display())]
    Permission(#[error(not(source))] PathBuf),
    /// A resource already exists with the target name; expected in directory
    /// creation races and swallowed there
    #[display("already exists: {}", _0.display())]
    Collision(#[error(not(source))] PathBuf),
    /// Directory removal refused because it has contents
    #[display("directory not empty: {}", _0.display())]
    NotEmpty(#[error(not(source))] PathBuf),
    /// No space remains on the device
    #[display("no space left on device")]
    NoSpace,
    /// No filehandle could be allocated
    #[display("no filehandle available")]
    NoFileHandle,
    /// Path contains invalid characters or escapes the backend root
    #[display("invalid path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Underlying I/O error with no more specific classification
    #[display("I/O error: {_0}")]
    Io(IoError),
}

impl ErrorKind {
    /// Classify an I/O error against the path it was raised for.
    pub fn from_io(path: &std::path::Path, err: IoError) -> Self {
        use std::io::ErrorKind as Io;
        match err.kind() {
            Io::NotFound => Self::NotFound(path.to_path_buf()),
            Io::PermissionDenied => Self::Permission(path.to_path_buf()),
            Io::AlreadyExists => Self::Collision(path.to_path_buf()),
            Io::DirectoryNotEmpty => Self::NotEmpty(path.to_path_buf()),
            Io::StorageFull => Self::NoSpace,
            // EMFILE/ENFILE carry no stable ErrorKind; match the errno.
            _ if matches!(err.raw_os_error(), Some(23) | Some(24)) => Self::NoFileHandle,
            _ => Self::Io(err),
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::NoFileHandle)
    }
}
