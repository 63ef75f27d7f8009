//! Request-pipeline error responses.
//!
//! Handlers collapse every failure into one of the protocol's status codes.
//! Classification (and alert dispatch for the fatal classes) happens on
//! [`AppState`](crate::state::AppState); this type only carries the verdict
//! to the wire.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// The protocol-visible outcome of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    /// 409: the request made no sense.
    BadRequest,
    /// 403: the required key facet was denied.
    Forbidden,
    /// 404: no such record or blob.
    NotFound,
    /// 503: the record store is unreachable; a short-term problem.
    Unavailable,
    /// 500: an internal error happened.
    Internal,
}

impl ApiError {
    pub fn status(self) -> StatusCode {
        match self {
            ApiError::BadRequest => StatusCode::CONFLICT,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::info!(code = self.status().as_u16(), "request served with failure code");
        self.status().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::BadRequest.status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ApiError::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
