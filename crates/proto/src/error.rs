//! Protocol error types.

use derive_more::{Display, Error};

/// A protocol error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A metadata filter string had filter structure but could not be parsed.
    #[display("unrecognised filter: {_0}")]
    BadFilter(#[error(not(source))] String),
    /// A filter operand that must be numeric was not.
    #[display("non-numeric filter operand: {_0}")]
    BadOperand(#[error(not(source))] String),
}
