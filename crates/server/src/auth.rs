//! Per-request trust computation.

use hoard_proto::AccessKeys;
use hoard_records::Record;
use tracing::debug;

/// Which facets of a record this request may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustLevel {
    pub read: bool,
    pub write: bool,
}

/// Determine the permissions to expose for a record.
///
/// A client connecting from an address on the system-wide trusted list is
/// granted everything immediately. Otherwise each facet is granted iff the
/// record leaves that facet anonymous or the presented key matches exactly.
/// With no record in scope (a bare `query`), only the trusted list can
/// grant anything.
pub fn get_trust<'a>(
    record: Option<&Record>,
    keys: Option<&AccessKeys>,
    host: &str,
    trusted_hosts: impl Iterator<Item = &'a str>,
) -> TrustLevel {
    for trusted in trusted_hosts {
        if host == trusted {
            debug!(host, "request received from trusted host");
            return TrustLevel { read: true, write: true };
        }
    }
    let Some(record) = record else {
        // With no record in scope the test was for global trust only.
        return TrustLevel { read: false, write: false };
    };
    let facet = |stored: &Option<String>, presented: Option<&String>| match stored {
        None => true,
        Some(stored) => presented == Some(stored),
    };
    TrustLevel {
        read: facet(&record.keys.read, keys.and_then(|k| k.read.as_ref())),
        write: facet(&record.keys.write, keys.and_then(|k| k.write.as_ref())),
    }
}
