//! Colocated read-side cache for a hoard storage server.
//!
//! Recently-requested entities are fetched once, pinned on local disk and
//! served from there until their clamped lifetime expires. Writes never
//! pass through here; this proxy trades a bounded staleness window for
//! cheap repeated reads next to the consumer.

pub mod cache;
pub mod error;
pub mod http;

pub use crate::cache::{Cache, run_purger};
pub use crate::error::{Error, ErrorKind, Result};
pub use crate::http::ProxyState;

use axum::Router;
use axum::routing::post;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the HTTP surface over the proxy state.
pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/get", post(http::get))
        .route("/describe", post(http::describe))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
