//! Colocated write-side buffer for a hoard storage server.
//!
//! Uploads are accepted instantly into a durable on-disk spool and pushed
//! toward their destination server by a worker pool with per-server flood
//! avoidance. A crash loses nothing: startup recovery sweeps staging
//! residue and requeues every surviving entry.

pub mod error;
pub mod http;
pub mod spool;
pub mod upload;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::spool::{QueueEntry, Spool};
pub use crate::upload::{Outcome, StoreProxy};

use axum::Router;
use axum::routing::post;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the HTTP surface over the proxy state.
pub fn router(state: Arc<StoreProxy>) -> Router {
    Router::new()
        .route("/put", post(http::put))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
