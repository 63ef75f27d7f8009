//! Client error types.
//!
//! Each protocol status the server can answer with maps to its own kind, so
//! callers (the proxies in particular) can tell terminal rejections from
//! conditions worth retrying.

use derive_more::{Display, Error};

/// A client error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// 403: an invalid key was provided for the required facet.
    #[display("not authorised")]
    NotAuthorised,
    /// 404: the record or its blob is gone.
    #[display("not found")]
    NotFound,
    /// 409: the request is structurally flawed; retrying the same payload
    /// can never succeed.
    #[display("invalid record")]
    InvalidRecord,
    /// 412: a header (likely Content-Length) was rejected.
    #[display("invalid headers")]
    InvalidHeaders,
    /// 503: the server could not reach its record store; retry later.
    #[display("temporary failure")]
    TemporaryFailure,
    /// Any other non-success status.
    #[display("http error: {_0}")]
    Http(#[error(not(source))] u16),
    /// The request never completed (connect failure, timeout).
    #[display("transport error")]
    Transport,
    /// The response body was not the JSON the protocol promises.
    #[display("undecodable response")]
    Decode,
    /// Local compression work on the payload failed.
    #[display("compression error")]
    Compression,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// The storage proxy's upload pool keys its requeue-vs-discard decision
    /// off this: an [`InvalidRecord`](ErrorKind::InvalidRecord) upload is
    /// dead on arrival, everything else gets another chance.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::InvalidRecord | ErrorKind::NotAuthorised | ErrorKind::InvalidHeaders)
    }
}
