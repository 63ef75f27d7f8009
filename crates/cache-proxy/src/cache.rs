//! The cache: pinned local copies of recently-requested entities.
//!
//! Entities are cached per upstream server under `<root>/<host>_<port>/` as
//! a content file named by uid plus a metadata sibling. An ordered set of
//! entries, keyed by absolute expiration epoch, drives the purger. A
//! per-uid single-flight map guarantees one download per entity no matter
//! how many requests arrive while it is in flight.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use hoard_client::Client;
use hoard_config::CacheProxyConfig;
use hoard_proto::{META_CACHE_TTL, ServerAddress};
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// How many times a retrieval re-fetches after losing a race against the
/// purger before giving up.
const RETRIEVE_ATTEMPTS: usize = 3;

fn epoch() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// One cached entity, ordered by expiration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CacheEntry {
    expiration: i64,
    content: PathBuf,
    meta: PathBuf,
}

/// The cache state owned by the proxy's composition root.
pub struct Cache {
    root: PathBuf,
    meta_ext: String,
    min_cache_time: i64,
    max_cache_time: i64,
    timeout: Duration,
    entries: Mutex<BTreeSet<CacheEntry>>,
    pending: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Cache {
    pub fn new(config: &CacheProxyConfig) -> Self {
        Self {
            root: config.storage.path.clone(),
            meta_ext: config.storage.metadata_extension.clone(),
            min_cache_time: config.rules.min_cache_time,
            max_cache_time: config.rules.max_cache_time,
            timeout: Duration::from_secs_f64(config.rules.timeout),
            entries: Mutex::new(BTreeSet::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn paths(&self, server: &ServerAddress, uid: &str) -> (PathBuf, PathBuf, PathBuf) {
        let dir = self.root.join(format!("{}_{}", server.host, server.port));
        let content = dir.join(uid);
        let meta = dir.join(format!("{uid}.{}", self.meta_ext));
        (dir, content, meta)
    }

    /// Serve an entity from cache, fetching and pinning it on a miss.
    ///
    /// Returns the cached metadata and, when `want_content`, the content
    /// bytes. The presented read key must equal the key the entity was
    /// cached under.
    #[instrument(skip(self, read_key))]
    pub async fn retrieve(
        &self,
        server: &ServerAddress,
        uid: &str,
        read_key: Option<&str>,
        want_content: bool,
    ) -> Result<(Value, Option<Vec<u8>>)> {
        let (dir, content_path, meta_path) = self.paths(server, uid);
        tokio::fs::create_dir_all(&dir).await.or_raise(|| ErrorKind::Disk)?;

        for _ in 0..RETRIEVE_ATTEMPTS {
            self.ensure_cached(server, uid, read_key, &content_path, &meta_path).await?;

            let raw = match tokio::fs::read(&meta_path).await {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    // The purger got there first; fetch again.
                    continue;
                },
                Err(e) => return Err(e).or_raise(|| ErrorKind::Disk),
            };
            let meta: Value = serde_json::from_slice(&raw).or_raise(|| ErrorKind::Corrupt)?;

            let cached_key = meta.get("keys").and_then(|keys| keys.get("read")).cloned().unwrap_or(Value::Null);
            let authorized = match (&cached_key, read_key) {
                (Value::String(stored), Some(presented)) => stored == presented,
                (Value::Null, None) => true,
                _ => false,
            };
            if !authorized {
                exn::bail!(ErrorKind::Permission(uid.to_string()));
            }

            if !want_content {
                return Ok((meta, None));
            }
            match tokio::fs::read(&content_path).await {
                Ok(bytes) => return Ok((meta, Some(bytes))),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e).or_raise(|| ErrorKind::Disk),
            }
        }
        warn!(uid, "cache entry kept vanishing mid-retrieval");
        exn::bail!(ErrorKind::Disk)
    }

    /// Make sure both cache files exist, downloading at most once per uid
    /// across concurrent requests: the first requester owns the fetch and
    /// everyone else awaits the same outcome.
    async fn ensure_cached(
        &self,
        server: &ServerAddress,
        uid: &str,
        read_key: Option<&str>,
        content_path: &PathBuf,
        meta_path: &PathBuf,
    ) -> Result<()> {
        if file_pair_exists(content_path, meta_path).await? {
            return Ok(());
        }
        let flight = {
            let mut pending = self.pending.lock().await;
            pending.entry(uid.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        let guard = flight.lock().await;
        // A preceding owner may have finished (or failed) while we waited.
        let result = if file_pair_exists(content_path, meta_path).await? {
            Ok(())
        } else {
            self.download(server, uid, read_key, content_path, meta_path).await
        };
        drop(guard);
        self.pending.lock().await.remove(uid);
        result
    }

    /// Fetch one entity from the upstream server and pin it.
    ///
    /// The blob is fetched as stored (no server-side decompression); the
    /// record description is stamped with the presented read key and written
    /// beside it. The cache entry's expiration is the clamped client-
    /// requested lifetime, stored as an absolute epoch.
    #[instrument(skip(self, read_key))]
    async fn download(
        &self,
        server: &ServerAddress,
        uid: &str,
        read_key: Option<&str>,
        content_path: &PathBuf,
        meta_path: &PathBuf,
    ) -> Result<()> {
        info!(uid, host = %server.host, port = server.port, "downloading entity into the cache");
        let client = Client::new(&server.host, server.port);
        let retrieved = client.get_raw(uid, read_key, self.timeout).await.map_err(classify_upstream(uid))?;
        tokio::fs::write(content_path, &retrieved.body).await.or_raise(|| ErrorKind::Disk)?;

        let mut meta = match client.describe(uid, read_key, self.timeout).await {
            Ok(meta) => meta,
            Err(e) => {
                // Never leave a content file without its metadata sibling.
                let _ = tokio::fs::remove_file(content_path).await;
                return Err(classify_upstream(uid)(e));
            },
        };
        meta["keys"] = json!({ "read": read_key });
        tokio::fs::write(meta_path, serde_json::to_vec(&meta).or_raise(|| ErrorKind::Corrupt)?)
            .await
            .or_raise(|| ErrorKind::Disk)?;

        let requested_ttl = meta
            .get("meta")
            .and_then(|m| m.get(META_CACHE_TTL))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let expiration = epoch() + requested_ttl.clamp(self.min_cache_time, self.max_cache_time);
        let mut entries = self.entries.lock().await;
        entries.insert(CacheEntry {
            expiration,
            content: content_path.clone(),
            meta: meta_path.clone(),
        });
        Ok(())
    }

    /// Unlink every entry that has expired, in expiration order, stopping at
    /// the first entry still alive. Returns how many entries were purged.
    pub async fn purge_expired(&self) -> usize {
        let now = epoch();
        let mut entries = self.entries.lock().await;
        let mut purged = 0;
        while let Some(first) = entries.first() {
            if first.expiration > now {
                break;
            }
            let entry = entries.pop_first().expect("non-empty set");
            for path in [&entry.content, &entry.meta] {
                debug!(path = %path.display(), "unlinking expired cached file");
                if let Err(e) = tokio::fs::remove_file(path).await {
                    warn!(path = %path.display(), error = %e, "unable to unlink cached file");
                }
            }
            purged += 1;
        }
        purged
    }

    /// Startup hook: remove every leftover cached file under the root.
    pub async fn clear_pool(&self) -> Result<()> {
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e).or_raise(|| ErrorKind::Disk),
            };
            while let Some(entry) = entries.next_entry().await.or_raise(|| ErrorKind::Disk)? {
                let path = entry.path();
                if entry.file_type().await.or_raise(|| ErrorKind::Disk)?.is_dir() {
                    stack.push(path);
                } else {
                    info!(path = %path.display(), "unlinking stale cached file");
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        warn!(path = %path.display(), error = %e, "unable to unlink stale cached file");
                    }
                }
            }
        }
        Ok(())
    }

    /// Clamp a requested lifetime into the configured window.
    #[must_use]
    pub fn clamp_ttl(&self, requested: i64) -> i64 {
        requested.clamp(self.min_cache_time, self.max_cache_time)
    }
}

async fn file_pair_exists(content: &PathBuf, meta: &PathBuf) -> Result<bool> {
    let content = tokio::fs::try_exists(content).await.or_raise(|| ErrorKind::Disk)?;
    let meta = tokio::fs::try_exists(meta).await.or_raise(|| ErrorKind::Disk)?;
    Ok(content && meta)
}

/// Translate an upstream client failure into this proxy's taxonomy.
fn classify_upstream(uid: &str) -> impl Fn(hoard_client::Error) -> crate::error::Error + '_ {
    move |err| match &*err {
        hoard_client::ErrorKind::NotAuthorised => exn::Exn::from(ErrorKind::Permission(uid.to_string())),
        hoard_client::ErrorKind::NotFound => exn::Exn::from(ErrorKind::NotFound(uid.to_string())),
        _ => err.raise(ErrorKind::Upstream),
    }
}

/// Background task: purge expired entries every `interval`.
pub async fn run_purger(cache: Arc<Cache>, interval: Duration) {
    info!("cache-purging task started");
    loop {
        tokio::time::sleep(interval).await;
        cache.purge_expired().await;
    }
}
