//! Record store error types.

use derive_more::{Display, Error};

/// A record-store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for record-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong
/// internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The store could not be reached or a statement failed; short-term
    /// outage as far as the protocol is concerned.
    #[display("record store error")]
    Database,
    #[display("record store migration error")]
    Migration,
    /// Insert raced against an existing record with the same uid.
    #[display("record already exists: {_0}")]
    Duplicate(#[error(not(source))] String),
    /// A stored row could not be mapped back into a record.
    #[display("invalid record data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// A query filter could not be compiled.
    #[display("invalid query filter: {_0}")]
    BadFilter(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Database)
    }
}
