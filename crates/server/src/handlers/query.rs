//! The `query` endpoint: predicate search over the record store.

use crate::auth::get_trust;
use crate::error::ApiError;
use crate::handlers::parse_body;
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use hoard_proto::{QueryRequest, QueryResponse};
use hoard_storage::resolve_path;
use std::net::SocketAddr;
use std::sync::Arc;

pub async fn query(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Result<Json<QueryResponse>, ApiError> {
    let request: QueryRequest = parse_body(&body)?;
    // With no record in scope only the trusted-host list can grant read;
    // everyone else is restricted to anonymous records and sees no keys.
    let trust = get_trust(None, None, &addr.ip().to_string(), state.trusted());

    let limit = state.config.security.query_size;
    let records =
        state.records.search(&request, limit, !trust.read).await.map_err(|e| state.records_failure(e))?;

    let records = records
        .into_iter()
        .map(|record| {
            let path = trust.read.then(|| {
                resolve_path(record.physical.ctime, record.physical.min_res, &record.uid)
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            });
            record.query_view(path)
        })
        .collect();
    Ok(Json(QueryResponse { records }))
}
