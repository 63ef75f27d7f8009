//! The record: the authoritative description of one stored entity.

use hoard_compress::Compression;
use hoard_proto::{CompressPolicyDelta, PolicyDelta};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub use hoard_proto::AccessKeys;

/// Seconds since the Unix epoch, with sub-second precision.
#[must_use]
pub fn epoch() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// Entity format: MIME type and the compression the blob is stored under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    pub mime: String,
    #[serde(default)]
    pub comp: Option<Compression>,
}

/// Physical placement facts. `ctime`, `minRes` and the uid determine the
/// blob path, so none of them is ever updated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Physical {
    #[serde(default)]
    pub family: Option<String>,
    pub ctime: f64,
    pub atime: i64,
    #[serde(rename = "minRes")]
    pub min_res: u32,
    pub format: Format,
}

/// One lifecycle window in stored (absolute) form.
///
/// `staleTime` is a denormalization: it always equals `atime + stale`
/// whenever `stale` is set, refreshed on every access and update, so that
/// the maintenance loops can range-scan an indexed column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale: Option<i64>,
    #[serde(rename = "staleTime", default, skip_serializing_if = "Option::is_none")]
    pub stale_time: Option<i64>,
}

impl PolicyWindow {
    /// Translate a client-submitted relative window into stored form:
    /// `fixed` becomes an absolute epoch, `staleTime` is denormalized.
    #[must_use]
    pub fn unpack(delta: &PolicyDelta, now: i64) -> Self {
        let mut window = PolicyWindow::default();
        if let Some(fixed) = delta.fixed {
            window.fixed = Some(now + fixed);
        }
        if let Some(stale) = delta.stale {
            window.stale = Some(stale);
            window.stale_time = Some(now + stale);
        }
        window
    }

    /// An empty window means "never".
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fixed.is_none() && self.stale.is_none()
    }

    /// Recompute the denormalized `staleTime` from a new access time.
    pub fn refresh(&mut self, atime: i64) {
        if let Some(stale) = self.stale {
            self.stale_time = Some(atime + stale);
        }
    }

    /// Whether the window has come due at `now`.
    #[must_use]
    pub fn due(&self, now: i64) -> bool {
        self.fixed.is_some_and(|t| t < now) || self.stale_time.is_some_and(|t| t < now)
    }
}

/// A compression policy: a window plus its target algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comp: Option<Compression>,
    #[serde(flatten)]
    pub window: PolicyWindow,
}

impl CompressPolicy {
    /// Translate a client-submitted compression policy, admitting only
    /// algorithms in `allowed`. An unsupported target empties the policy;
    /// the caller logs and carries on, per the protocol.
    #[must_use]
    pub fn unpack(delta: &CompressPolicyDelta, now: i64, allowed: &[Compression]) -> Option<Self> {
        let target = delta.comp.as_deref()?.parse::<Compression>().ok()?;
        if !allowed.contains(&target) {
            return None;
        }
        Some(Self { comp: Some(target), window: PolicyWindow::unpack(&delta.window, now) })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.comp.is_none() && self.window.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Both lifecycle policies of a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySet {
    #[serde(default)]
    pub delete: PolicyWindow,
    #[serde(default)]
    pub compress: CompressPolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub accesses: i64,
}

/// The authoritative description of one stored entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub uid: String,
    pub keys: AccessKeys,
    pub physical: Physical,
    #[serde(default)]
    pub policy: PolicySet,
    #[serde(default)]
    pub stats: Stats,
    #[serde(default)]
    pub meta: BTreeMap<String, Value>,
}

impl Record {
    /// Register a successful read: bump `atime` and the access counter, and
    /// refresh both denormalized stale deadlines.
    pub fn touch(&mut self, now: i64) {
        self.physical.atime = now;
        self.stats.accesses += 1;
        self.policy.delete.refresh(now);
        self.policy.compress.window.refresh(now);
    }

    /// The wire shape returned by `describe`: the record minus its keys and
    /// the internal `minRes` field.
    #[must_use]
    pub fn describe(&self) -> Value {
        self.wire_view(false, None)
    }

    /// The wire shape of one `query` result. Trusted callers keep `keys` and
    /// receive the resolved blob path; untrusted callers get neither.
    #[must_use]
    pub fn query_view(&self, resolved_path: Option<String>) -> Value {
        self.wire_view(resolved_path.is_some(), resolved_path)
    }

    fn wire_view(&self, keep_keys: bool, path: Option<String>) -> Value {
        // Serialization of a Record cannot fail; every field is a plain
        // JSON-representable value.
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(object) = value.as_object_mut() {
            if !keep_keys {
                object.remove("keys");
            }
            if let Some(physical) = object.get_mut("physical").and_then(Value::as_object_mut) {
                physical.remove("minRes");
                if let Some(path) = path {
                    physical.insert("path".to_string(), Value::String(path));
                }
            }
        }
        value
    }
}
