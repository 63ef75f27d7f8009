//! HTTP request handlers.

pub mod get;
pub mod misc;
pub mod put;
pub mod query;
pub mod update;

use crate::error::ApiError;
use serde::de::DeserializeOwned;
use tracing::warn;

/// Parse a JSON request body; anything malformed means the request made no
/// sense (409).
pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "request did not adhere to the expected structure");
        ApiError::BadRequest
    })
}
