//! HTTP surface of the caching proxy: `get` and `describe`.

use crate::cache::Cache;
use crate::error::ErrorKind;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use hoard_alerts::Alerter;
use hoard_proto::ProxyFetchRequest;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct ProxyState {
    pub cache: Arc<Cache>,
    pub alerts: Alerter,
}

fn parse(body: &[u8]) -> Result<ProxyFetchRequest, StatusCode> {
    serde_json::from_slice(body).map_err(|e| {
        warn!(error = %e, "request did not adhere to the expected structure");
        StatusCode::CONFLICT
    })
}

fn fail(state: &ProxyState, err: crate::error::Error) -> StatusCode {
    match &*err {
        ErrorKind::Permission(uid) => {
            warn!(uid, "request presented the wrong read key");
            StatusCode::FORBIDDEN
        },
        ErrorKind::NotFound(_) => StatusCode::NOT_FOUND,
        ErrorKind::Disk | ErrorKind::Corrupt => {
            let summary = format!("unable to access cache files on disk: {err:?}");
            error!(%err, "cache disk failure");
            state.alerts.dispatch(&summary);
            StatusCode::INTERNAL_SERVER_ERROR
        },
        ErrorKind::Upstream => {
            error!(%err, "upstream fetch failed");
            StatusCode::INTERNAL_SERVER_ERROR
        },
    }
}

pub async fn get(State(state): State<Arc<ProxyState>>, body: Bytes) -> Result<Response, StatusCode> {
    let request = parse(&body)?;
    info!(uid = %request.uid, "attempting to serve content from the cache");
    let (meta, content) = state
        .cache
        .retrieve(&request.proxy.server, &request.uid, request.keys.read.as_deref(), true)
        .await
        .map_err(|e| fail(&state, e))?;
    let mime = meta
        .get("physical")
        .and_then(|p| p.get("format"))
        .and_then(|f| f.get("mime"))
        .and_then(Value::as_str)
        .unwrap_or("application/octet-stream");
    let mime = HeaderValue::from_str(mime).unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    Ok(([(header::CONTENT_TYPE, mime)], content.unwrap_or_default()).into_response())
}

pub async fn describe(State(state): State<Arc<ProxyState>>, body: Bytes) -> Result<Json<Value>, StatusCode> {
    let request = parse(&body)?;
    info!(uid = %request.uid, "attempting to serve description from the cache");
    let (meta, _) = state
        .cache
        .retrieve(&request.proxy.server, &request.uid, request.keys.read.as_deref(), false)
        .await
        .map_err(|e| fail(&state, e))?;
    Ok(Json(meta))
}
