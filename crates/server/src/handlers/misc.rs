//! Liveness, family listing and load snapshot.

use crate::error::ApiError;
use crate::state::AppState;
use crate::status;
use axum::Json;
use axum::extract::State;
use hoard_proto::{FamiliesResponse, PingResponse, StatusResponse};
use std::collections::BTreeSet;
use std::sync::Arc;

pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse { online: true })
}

/// The union of families known to the record store and the family router,
/// sorted; the null (generic) entry is not a family name.
pub async fn list_families(State(state): State<Arc<AppState>>) -> Result<Json<FamiliesResponse>, ApiError> {
    let mut families: BTreeSet<String> =
        state.records.families().await.map_err(|e| state.records_failure(e))?.into_iter().collect();
    families.extend(state.families.families());
    Ok(Json(FamiliesResponse { families: families.into_iter().collect() }))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let (process, system) = status::snapshot();
    Json(StatusResponse { process, system, families: state.families.families() })
}
