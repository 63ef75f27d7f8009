//! HTTP surface of the storage proxy: `put`.

use crate::upload::StoreProxy;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use hoard_proto::{AccessKeys, ProxyPutRequest, PutResponse, QueuedRecord};
use hoard_records::ident::{new_key, new_uid};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Accept an upload: spool it durably, queue it, answer immediately.
/// Delivery to the storage server is asynchronous.
pub async fn put(State(state): State<Arc<StoreProxy>>, body: Bytes) -> Result<Json<PutResponse>, StatusCode> {
    let request: ProxyPutRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "request did not adhere to the expected structure");
        StatusCode::CONFLICT
    })?;

    let record = QueuedRecord {
        uid: request.uid.unwrap_or_else(new_uid),
        keys: request
            .keys
            .unwrap_or_else(|| AccessKeys { read: Some(new_key()), write: Some(new_key()) }),
        physical: request.physical,
        policy: request.policy,
        meta: request.meta.unwrap_or_default(),
    };
    info!(uid = %record.uid, "writing spool files for accepted upload");

    let entry = match state.spool.add_entity(&request.proxy.server, &request.proxy.data, &record).await {
        Ok(entry) => entry,
        Err(e) => {
            let summary = format!("unable to write spool files to disk: {e:?}");
            error!(%e, "spooling failed");
            state.alerts.dispatch(&summary);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        },
    };
    state.enqueue(entry);

    Ok(Json(PutResponse { uid: record.uid, keys: record.keys }))
}
