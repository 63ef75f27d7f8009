//! End-to-end exercises of the request pipeline against an in-memory
//! composition: every endpoint, the key model, compression negotiation and
//! the policy machinery, driven through the router exactly as a client
//! would.

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use hoard_compress::Compression;
use hoard_config::ServerConfig;
use hoard_records::{Database, RecordStore};
use hoard_server::alert::Alerter;
use hoard_server::{AppState, FamilyRouter, maint, router};
use hoard_storage::MemoryBackend;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "hoard-test-boundary";
const STRANGER: [u8; 4] = [203, 0, 113, 9];
const TRUSTED: [u8; 4] = [10, 0, 0, 1];

async fn app_state() -> Arc<AppState> {
    let db = Database::connect_in_memory().await.unwrap();
    let mut config = ServerConfig::default();
    config.security.trusted_hosts = "10.0.0.1".to_string();
    let families = FamilyRouter::new(Arc::new(MemoryBackend::new("generic")));
    Arc::new(AppState::new(config, RecordStore::from(&db), families, Alerter::disabled()))
}

fn request(from: [u8; 4], path: &str, headers: &[(&str, &str)], content_type: &str, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(path).header("content-type", content_type);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let mut request = builder.body(Body::from(body)).unwrap();
    request.extensions_mut().insert(ConnectInfo(SocketAddr::from((from, 40000))));
    request
}

fn json_request(from: [u8; 4], path: &str, headers: &[(&str, &str)], body: &Value) -> Request<Body> {
    request(from, path, headers, "application/json", serde_json::to_vec(body).unwrap())
}

fn multipart_request(from: [u8; 4], headers: &[(&str, &str)], header: &Value, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Disposition: form-data; name=\"header\"\r\n\r\n");
    body.extend_from_slice(serde_json::to_string(header).unwrap().as_bytes());
    body.extend_from_slice(format!("\r\n--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"content\"; filename=\"payload\"\r\n\
          Content-Type: application/octet-stream\r\n\r\n",
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    request(from, "/put", headers, &format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec();
    (status, headers, body)
}

async fn put(state: &Arc<AppState>, header: Value, content: &[u8]) -> Value {
    let (status, _, body) = send(state, multipart_request(STRANGER, &[], &header, content)).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn ping_reports_online() {
    let state = app_state().await;
    let (status, _, body) = send(&state, json_request(STRANGER, "/ping", &[], &json!(null))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Value>(&body).unwrap(), json!({"online": true}));
}

#[tokio::test]
async fn anonymous_put_and_get() {
    let state = app_state().await;
    let stored = put(
        &state,
        json!({
            "keys": {"read": null, "write": null},
            "physical": {"format": {"mime": "text/plain"}},
        }),
        b"hello",
    )
    .await;
    assert!(stored["uid"].is_string());
    assert!(stored["keys"]["read"].is_null());
    assert!(stored["keys"]["write"].is_null());

    // Any host, no keys: still readable.
    let (status, headers, body) =
        send(&state, json_request(STRANGER, "/get", &[], &json!({"uid": stored["uid"]}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["content-type"].to_str().unwrap(), "text/plain");
    assert_eq!(body, b"hello");
}

#[tokio::test]
async fn keyed_access_is_enforced() {
    let state = app_state().await;
    let stored = put(&state, json!({"physical": {"format": {"mime": "text/plain"}}}), b"secret").await;
    let uid = stored["uid"].as_str().unwrap().to_string();
    let read = stored["keys"]["read"].as_str().unwrap().to_string();
    let write = stored["keys"]["write"].as_str().unwrap().to_string();

    let wrong = json_request(STRANGER, "/get", &[], &json!({"uid": uid, "keys": {"read": "X"}}));
    assert_eq!(send(&state, wrong).await.0, StatusCode::FORBIDDEN);

    let right = json_request(STRANGER, "/get", &[], &json!({"uid": uid, "keys": {"read": read}}));
    let (status, _, body) = send(&state, right).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"secret");

    // The read key does not grant the write facet.
    let bad_unlink = json_request(STRANGER, "/unlink", &[], &json!({"uid": uid, "keys": {"write": read}}));
    assert_eq!(send(&state, bad_unlink).await.0, StatusCode::FORBIDDEN);

    let good_unlink = json_request(STRANGER, "/unlink", &[], &json!({"uid": uid, "keys": {"write": write}}));
    assert_eq!(send(&state, good_unlink).await.0, StatusCode::OK);

    // Gone for good.
    let after = json_request(STRANGER, "/get", &[], &json!({"uid": uid, "keys": {"read": "irrelevant"}}));
    assert_eq!(send(&state, after).await.0, StatusCode::NOT_FOUND);
    let describe = json_request(STRANGER, "/describe", &[], &json!({"uid": uid}));
    assert_eq!(send(&state, describe).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn server_side_compression_round_trip() {
    let state = app_state().await;
    let body = vec![b'a'; 10_000];
    let stored = put_with_headers(
        &state,
        json!({
            "keys": {"read": null, "write": null},
            "physical": {"format": {"mime": "text/plain", "comp": "gzip"}},
        }),
        &body,
        &[("X-Hoard-Compress-On-Server", "yes")],
    )
    .await;
    let uid = stored["uid"].as_str().unwrap().to_string();

    let (status, _, describe) = send(&state, json_request(STRANGER, "/describe", &[], &json!({"uid": uid}))).await;
    assert_eq!(status, StatusCode::OK);
    let described: Value = serde_json::from_slice(&describe).unwrap();
    assert_eq!(described["physical"]["format"]["comp"], "gzip");
    // Internals never leak out of describe.
    assert!(described.get("keys").is_none());
    assert!(described["physical"].get("minRes").is_none());

    // A gzip-capable client gets the stored bytes as-is.
    let capable = json_request(
        STRANGER,
        "/get",
        &[("X-Hoard-Supported-Compression", "gzip;bz2")],
        &json!({"uid": uid}),
    );
    let (status, headers, compressed) = send(&state, capable).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["X-Hoard-Applied-Compression"].to_str().unwrap(), "gzip");
    assert!(compressed.len() < body.len());
    assert_eq!(Compression::Gzip.decompress(&compressed).unwrap(), body);

    // A client advertising nothing gets the original bytes back.
    let plain = json_request(STRANGER, "/get", &[], &json!({"uid": uid}));
    let (status, headers, decompressed) = send(&state, plain).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers.get("X-Hoard-Applied-Compression").is_none());
    assert_eq!(decompressed, body);
}

async fn put_with_headers(
    state: &Arc<AppState>,
    header: Value,
    content: &[u8],
    headers: &[(&str, &str)],
) -> Value {
    let (status, _, body) = send(state, multipart_request(STRANGER, headers, &header, content)).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn deletion_policy_removes_the_entity() {
    let state = app_state().await;
    let stored = put(
        &state,
        json!({
            "keys": {"read": null, "write": null},
            "physical": {"format": {"mime": "text/plain"}},
            "policy": {"delete": {"fixed": -2}},
        }),
        b"short-lived",
    )
    .await;
    let uid = stored["uid"].as_str().unwrap().to_string();

    assert_eq!(maint::deletion::sweep(&state).await, 1);

    let after = json_request(STRANGER, "/get", &[], &json!({"uid": uid}));
    assert_eq!(send(&state, after).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn compression_policy_transcodes_the_entity() {
    let state = app_state().await;
    let body = vec![b'z'; 8_000];
    let stored = put(
        &state,
        json!({
            "keys": {"read": null, "write": null},
            "physical": {"format": {"mime": "application/octet-stream"}},
            "policy": {"compress": {"fixed": -2, "comp": "bz2"}},
        }),
        &body,
    )
    .await;
    let uid = stored["uid"].as_str().unwrap().to_string();

    assert_eq!(maint::compression::sweep(&state).await, 1);

    let (_, _, describe) = send(&state, json_request(STRANGER, "/describe", &[], &json!({"uid": uid}))).await;
    let described: Value = serde_json::from_slice(&describe).unwrap();
    assert_eq!(described["physical"]["format"]["comp"], "bz2");
    assert_eq!(described["policy"]["compress"], json!({}));

    // Retrieval still yields the original bytes.
    let (status, _, served) = send(&state, json_request(STRANGER, "/get", &[], &json!({"uid": uid}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(served, body);
}

#[tokio::test]
async fn get_refreshes_access_state_and_stale_deadlines() {
    let state = app_state().await;
    let stored = put(
        &state,
        json!({
            "keys": {"read": null, "write": null},
            "physical": {"format": {"mime": "text/plain"}},
            "policy": {"delete": {"stale": 3600}},
        }),
        b"x",
    )
    .await;
    let uid = stored["uid"].as_str().unwrap().to_string();

    let (_, _, before) = send(&state, json_request(STRANGER, "/describe", &[], &json!({"uid": uid}))).await;
    let before: Value = serde_json::from_slice(&before).unwrap();
    assert_eq!(before["stats"]["accesses"], 0);

    send(&state, json_request(STRANGER, "/get", &[], &json!({"uid": uid}))).await;

    let (_, _, after) = send(&state, json_request(STRANGER, "/describe", &[], &json!({"uid": uid}))).await;
    let after: Value = serde_json::from_slice(&after).unwrap();
    assert_eq!(after["stats"]["accesses"], 1);
    let atime = after["physical"]["atime"].as_i64().unwrap();
    assert!(atime >= before["physical"]["atime"].as_i64().unwrap());
    assert_eq!(after["policy"]["delete"]["staleTime"].as_i64().unwrap(), atime + 3600);
}

#[tokio::test]
async fn update_applies_replace_semantics() {
    let state = app_state().await;
    let stored = put(
        &state,
        json!({
            "physical": {"format": {"mime": "text/plain"}},
            "policy": {"delete": {"fixed": 9999}},
            "meta": {"kind": "episode", "stale": true},
        }),
        b"x",
    )
    .await;
    let uid = stored["uid"].as_str().unwrap().to_string();
    let write = stored["keys"]["write"].as_str().unwrap().to_string();
    let read = stored["keys"]["read"].as_str().unwrap().to_string();

    let update = json!({
        "uid": uid,
        "keys": {"write": write},
        "policy": {"delete": {}},
        "meta": {"new": {"kind": "film", "year": 2012}, "removed": ["stale"]},
    });
    assert_eq!(send(&state, json_request(STRANGER, "/update", &[], &update)).await.0, StatusCode::OK);

    let describe = json_request(STRANGER, "/describe", &[], &json!({"uid": uid, "keys": {"read": read}}));
    let (_, _, body) = send(&state, describe).await;
    let described: Value = serde_json::from_slice(&body).unwrap();
    // Empty object cleared the delete policy entirely.
    assert_eq!(described["policy"]["delete"], json!({}));
    assert_eq!(described["meta"]["kind"], "film");
    assert_eq!(described["meta"]["year"], 2012);
    assert!(described["meta"].get("stale").is_none());
}

#[tokio::test]
async fn query_respects_trust_boundaries() {
    let state = app_state().await;
    let open = put(
        &state,
        json!({
            "keys": {"read": null, "write": null},
            "physical": {"format": {"mime": "text/plain"}},
            "meta": {"show": "firefly"},
        }),
        b"open",
    )
    .await;
    put(
        &state,
        json!({
            "physical": {"format": {"mime": "text/plain"}},
            "meta": {"show": "firefly"},
        }),
        b"keyed",
    )
    .await;

    // A stranger sees only anonymous records, with keys stripped.
    let query = json!({"meta": {"show": "firefly"}});
    let (status, _, body) = send(&state, json_request(STRANGER, "/query", &[], &query)).await;
    assert_eq!(status, StatusCode::OK);
    let result: Value = serde_json::from_slice(&body).unwrap();
    let records = result["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["uid"], open["uid"]);
    assert!(records[0].get("keys").is_none());
    assert!(records[0]["physical"].get("path").is_none());

    // A trusted host sees everything, including keys and resolved paths.
    let (status, _, body) = send(&state, json_request(TRUSTED, "/query", &[], &query)).await;
    assert_eq!(status, StatusCode::OK);
    let result: Value = serde_json::from_slice(&body).unwrap();
    let records = result["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    for record in records {
        assert!(record["physical"]["path"].is_string());
        assert!(record["physical"].get("minRes").is_none());
        assert!(record.get("keys").is_some());
    }
}

#[tokio::test]
async fn query_filter_mini_language_over_http() {
    let state = app_state().await;
    for (season, body) in [(1, "a"), (2, "b"), (5, "c")] {
        put(
            &state,
            json!({
                "keys": {"read": null, "write": null},
                "physical": {"format": {"mime": "text/plain"}},
                "meta": {"season": season},
            }),
            body.as_bytes(),
        )
        .await;
    }
    let query = json!({"meta": {"season": ":range:1:2"}});
    let (status, _, body) = send(&state, json_request(STRANGER, "/query", &[], &query)).await;
    assert_eq!(status, StatusCode::OK);
    let result: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(result["records"].as_array().unwrap().len(), 2);

    // A broken filter is a malformed request.
    let bad = json!({"meta": {"season": ":nope:1"}});
    assert_eq!(send(&state, json_request(STRANGER, "/query", &[], &bad)).await.0, StatusCode::CONFLICT);
}

#[tokio::test]
async fn spooled_side_channel_upload() {
    let state = app_state().await;
    let spool = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(spool.path(), b"spooled body").unwrap();
    let (_file, path) = spool.keep().unwrap();

    let header = json!({
        "keys": {"read": null, "write": null},
        "physical": {"format": {"mime": "text/plain"}},
    });
    let form = format!(
        "header={}&nginx=1&content={}",
        urlencode(&serde_json::to_string(&header).unwrap()),
        urlencode(path.to_str().unwrap()),
    );
    let upload = request(STRANGER, "/put", &[], "application/x-www-form-urlencoded", form.into_bytes());
    let (status, _, body) = send(&state, upload).await;
    assert_eq!(status, StatusCode::OK);
    let stored: Value = serde_json::from_slice(&body).unwrap();

    // The spooled file is reclaimed after the upload is opened.
    assert!(!path.exists());

    let (status, _, served) =
        send(&state, json_request(STRANGER, "/get", &[], &json!({"uid": stored["uid"]}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(served, b"spooled body");
}

/// Minimal percent-encoding for the form bodies built by hand above.
fn urlencode(text: &str) -> String {
    let mut out = String::new();
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[tokio::test]
async fn malformed_put_header_is_rejected() {
    let state = app_state().await;
    // Missing the required mime field.
    let header = json!({"physical": {"format": {}}});
    let (status, _, _) = send(&state, multipart_request(STRANGER, &[], &header, b"x")).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn list_families_unions_store_and_router() {
    let state = app_state().await;
    put(
        &state,
        json!({"physical": {"family": "video", "format": {"mime": "video/mp4"}}}),
        b"x",
    )
    .await;
    let (status, _, body) = send(&state, json_request(STRANGER, "/list/families", &[], &json!(null))).await;
    assert_eq!(status, StatusCode::OK);
    let families: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(families["families"], json!(["video"]));
}

#[tokio::test]
async fn status_reports_load() {
    let state = app_state().await;
    let (status, _, body) = send(&state, json_request(STRANGER, "/status", &[], &json!(null))).await;
    assert_eq!(status, StatusCode::OK);
    let report: Value = serde_json::from_slice(&body).unwrap();
    assert!(report["process"]["memory"]["rss"].as_u64().unwrap() > 0);
    assert!(report["system"]["load"]["t1"].is_number());
    assert!(report["families"].is_array());
}
