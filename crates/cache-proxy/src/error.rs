//! Caching-proxy error types.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The presented read key does not match the cached record's key.
    #[display("invalid read key for '{_0}'")]
    Permission(#[error(not(source))] String),
    /// The upstream server has no such entity.
    #[display("entity not found upstream: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The upstream fetch failed for some other reason.
    #[display("upstream error")]
    Upstream,
    /// Local cache files could not be read or written.
    #[display("cache disk error")]
    Disk,
    /// A cached metadata file did not parse.
    #[display("corrupt cache entry")]
    Corrupt,
}
