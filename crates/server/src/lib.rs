//! The authoritative hoard storage server.
//!
//! One process serves the request pipeline (put/get/describe/update/unlink/
//! query plus ping, family listing and a load snapshot), routes families to
//! filesystem backends, and runs the background maintenance loops that keep
//! records and blobs coherent over time.

pub mod auth;
pub mod error;
pub mod families;
pub mod handlers;
pub mod maint;
pub mod state;
pub mod status;

pub use hoard_alerts as alert;

pub use crate::families::FamilyRouter;
pub use crate::state::AppState;

use axum::Router;
use axum::routing::post;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the HTTP surface over a composed application state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ping", post(handlers::misc::ping))
        .route("/list/families", post(handlers::misc::list_families))
        .route("/status", post(handlers::misc::status))
        .route("/put", post(handlers::put::put))
        .route("/get", post(handlers::get::get))
        .route("/describe", post(handlers::get::describe))
        .route("/update", post(handlers::update::update))
        .route("/unlink", post(handlers::update::unlink))
        .route("/query", post(handlers::query::query))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
