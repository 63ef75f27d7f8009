//! JSON envelope types for every endpoint.
//!
//! Input types lean on `Option` to distinguish "member absent" from
//! "member present but null" where the protocol gives the two different
//! meanings (key generation, policy replace-vs-clear).

use hoard_compress::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Per-record access keys. A `null` facet means that facet is
/// world-accessible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKeys {
    #[serde(default)]
    pub read: Option<String>,
    #[serde(default)]
    pub write: Option<String>,
}

/// A lifecycle window as submitted by clients: `fixed` is relative seconds
/// from now, `stale` is seconds since last access. An empty object clears
/// the policy on update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale: Option<i64>,
}

/// A compression policy window plus its target algorithm.
///
/// The algorithm stays a plain string here: an unsupported name is logged
/// and dropped by the server rather than failing the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressPolicyDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comp: Option<String>,
    #[serde(flatten)]
    pub window: PolicyDelta,
}

/// The `policy` member of `put` and `update` requests. On update, each
/// branch obeys replace semantics: absent means no change, an empty object
/// clears, anything else replaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyIn {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<PolicyDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compress: Option<CompressPolicyDelta>,
}

/// Entity format: MIME type plus the compression it is stored under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatIn {
    pub mime: String,
    #[serde(default)]
    pub comp: Option<Compression>,
}

/// Physical placement of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalIn {
    #[serde(default)]
    pub family: Option<String>,
    pub format: FormatIn,
}

/// The `header` part of a `put` request.
///
/// When `keys` is absent entirely, the server generates both facets; when it
/// is present, the given values (nulls included) are taken verbatim, so an
/// explicit `{"read": null, "write": null}` stores an anonymous record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutHeader {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<AccessKeys>,
    pub physical: PhysicalIn,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyIn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<BTreeMap<String, Value>>,
}

/// `get`, `describe` and `unlink` all address one record with optional keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRequest {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<AccessKeys>,
}

/// Metadata mutation block of an `update` request: `removed` keys are
/// deleted first, then `new` is merged in (new wins on collision).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaUpdate {
    #[serde(default)]
    pub new: BTreeMap<String, Value>,
    #[serde(default)]
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<AccessKeys>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyIn>,
    #[serde(default)]
    pub meta: MetaUpdate,
}

/// An optional inclusive range block in a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MinMax<T> {
    #[serde(default = "Option::default")]
    pub min: Option<T>,
    #[serde(default = "Option::default")]
    pub max: Option<T>,
}

/// A predicate over the record store.
///
/// `family` is always an equality match, a null selecting generic-family
/// records. `mime` with a `/` matches exactly; without one it matches the
/// type super-class as a prefix. `meta` string values may use the filter
/// mini-language (see [`crate::filter`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub ctime: MinMax<f64>,
    #[serde(default)]
    pub atime: MinMax<i64>,
    #[serde(default)]
    pub accesses: MinMax<i64>,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub mime: Option<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PutResponse {
    pub uid: String,
    pub keys: AccessKeys,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub online: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamiliesResponse {
    pub families: Vec<String>,
}

/// Records come back as raw JSON documents: trusted callers see `keys` and a
/// computed `physical.path`, untrusted callers see neither.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub records: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuStatus {
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryStatus {
    pub percent: f64,
    pub rss: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProcessStatus {
    pub cpu: CpuStatus,
    pub memory: MemoryStatus,
    pub threads: usize,
}

/// 1/5/15-minute load averages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadStatus {
    pub t1: f64,
    pub t5: f64,
    pub t15: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub load: LoadStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub process: ProcessStatus,
    pub system: SystemStatus,
    pub families: Vec<String>,
}

/// Address of an upstream storage server a proxy acts for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyFetch {
    pub server: ServerAddress,
}

/// Caching-proxy request body for `get` and `describe`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyFetchRequest {
    pub uid: String,
    #[serde(default)]
    pub keys: AccessKeys,
    pub proxy: ProxyFetch,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySpool {
    pub server: ServerAddress,
    /// Local filesystem path of the spooled source file.
    pub data: PathBuf,
}

/// Storage-proxy `put` body: a complete record descriptor plus where the
/// bytes are and which server they are destined for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyPutRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<AccessKeys>,
    pub physical: PhysicalIn,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyIn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<BTreeMap<String, Value>>,
    pub proxy: ProxySpool,
}

/// The descriptor the storage proxy persists beside each queued upload and
/// later replays against the destination server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRecord {
    pub uid: String,
    pub keys: AccessKeys,
    pub physical: PhysicalIn,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyIn>,
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
}
