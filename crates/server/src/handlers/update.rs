//! The `update` and `unlink` endpoints: mutation and removal.

use crate::auth::get_trust;
use crate::error::ApiError;
use crate::handlers::parse_body;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::StatusCode;
use hoard_proto::{EntityRequest, UpdateRequest};
use hoard_records::{CompressPolicy, PolicyWindow, Record, epoch};
use hoard_storage::{prune_eligible, resolve_path};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Load a record and check the write facet.
async fn writable_record(state: &AppState, uid: &str, keys: Option<&hoard_proto::AccessKeys>, host: &str) -> Result<Record, ApiError> {
    let record = state.records.get(uid).await.map_err(|e| state.records_failure(e))?.ok_or(ApiError::NotFound)?;
    let trust = get_trust(Some(&record), keys, host, state.trusted());
    if !trust.write {
        return Err(ApiError::Forbidden);
    }
    Ok(record)
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let request: UpdateRequest = parse_body(&body)?;
    info!(uid = %request.uid, "proceeding with update request");
    let mut record = writable_record(&state, &request.uid, request.keys.as_ref(), &addr.ip().to_string()).await?;

    apply_policy(&state, &mut record, &request);

    for removed in &request.meta.removed {
        record.meta.remove(removed);
    }
    record.meta.extend(request.meta.new.clone());

    state.records.update(&record).await.map_err(|e| state.records_failure(e))?;
    Ok(StatusCode::OK)
}

/// Replace-semantics policy application: an absent branch changes nothing,
/// an empty object clears, anything populated replaces.
fn apply_policy(state: &AppState, record: &mut Record, request: &UpdateRequest) {
    let Some(policy) = &request.policy else {
        return;
    };
    let now = epoch() as i64;
    if let Some(delete) = &policy.delete {
        record.policy.delete = PolicyWindow::unpack(delete, now);
    }
    if let Some(compress) = &policy.compress {
        if compress.comp.is_none() && compress.window == hoard_proto::PolicyDelta::default() {
            record.policy.compress.clear();
        } else {
            match CompressPolicy::unpack(compress, now, state.allowed_formats()) {
                Some(compress) => record.policy.compress = compress,
                None => warn!(format = ?compress.comp, "unsupported compression format specified; policy unchanged"),
            }
        }
    }
}

pub async fn unlink(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let request: EntityRequest = parse_body(&body)?;
    info!(uid = %request.uid, "proceeding with unlink request");
    let record = writable_record(&state, &request.uid, request.keys.as_ref(), &addr.ip().to_string()).await?;

    let path = resolve_path(record.physical.ctime, record.physical.min_res, &record.uid)
        .map_err(|e| state.internal("resolving blob path", &e))?;
    let backend = state.families.backend(record.physical.family.as_deref());
    let prune = prune_eligible(epoch(), record.physical.ctime, record.physical.min_res);
    let blob_missing = match backend.unlink(&path, prune).await {
        Ok(()) => false,
        Err(e) if matches!(&*e, hoard_storage::error::ErrorKind::NotFound(_)) => {
            error!(uid = %record.uid, "record exists but its blob does not");
            true
        },
        Err(e) => return Err(state.storage_failure(e)),
    };

    // The record goes regardless; a missing blob still reads as 404 so the
    // caller knows no bytes were reclaimed.
    state.records.drop_record(&record.uid).await.map_err(|e| state.records_failure(e))?;
    if blob_missing {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::OK)
}
