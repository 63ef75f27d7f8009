//! The upload pool: workers that drain the queue toward storage servers,
//! with per-server flood avoidance.

use crate::spool::{QueueEntry, Spool};
use hoard_alerts::Alerter;
use hoard_client::Client;
use hoard_config::StorageProxyConfig;
use hoard_proto::{PutHeader, QueuedRecord, ServerAddress};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, error, info, instrument, warn};

/// Short pause after skipping a flooded target, so a queue holding nothing
/// but flooded entries doesn't spin.
const FLOOD_BACKOFF: Duration = Duration::from_millis(250);

/// What became of one upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Delivered upstream; the local files can go.
    Delivered,
    /// Terminally rejected (or unreadable locally); the files can go and
    /// the entity is lost to the log.
    Discarded,
    /// A transient failure; the entry goes back on the queue and the target
    /// is marked flooded.
    Requeued,
}

/// Servers currently considered overloaded, with the time their mark
/// expires. Cleaned lazily on observation.
struct FloodMap {
    timeout: Duration,
    servers: Mutex<HashMap<ServerAddress, Instant>>,
}

impl FloodMap {
    fn new(timeout: Duration) -> Self {
        Self { timeout, servers: Mutex::new(HashMap::new()) }
    }

    async fn is_flooded(&self, server: &ServerAddress) -> bool {
        let mut servers = self.servers.lock().await;
        match servers.get(server) {
            Some(expires) if *expires <= Instant::now() => {
                servers.remove(server);
                false
            },
            Some(_) => true,
            None => false,
        }
    }

    async fn mark(&self, server: &ServerAddress) {
        self.servers.lock().await.insert(server.clone(), Instant::now() + self.timeout);
    }
}

/// The storage proxy's shared state: the spool, the work queue and the
/// flood map, owned by the composition root.
pub struct StoreProxy {
    pub spool: Spool,
    pub alerts: Alerter,
    tx: UnboundedSender<QueueEntry>,
    rx: Mutex<UnboundedReceiver<QueueEntry>>,
    floods: FloodMap,
    upload_timeout: Duration,
    worker_count: usize,
}

impl StoreProxy {
    pub fn new(config: &StorageProxyConfig, alerts: Alerter) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            spool: Spool::new(&config.storage),
            alerts,
            tx,
            rx: Mutex::new(rx),
            floods: FloodMap::new(Duration::from_secs_f64(config.upload.flood_timeout)),
            upload_timeout: Duration::from_secs_f64(config.upload.timeout),
            worker_count: config.upload.threads,
        }
    }

    /// Add an entry to the in-memory work queue.
    pub fn enqueue(&self, entry: QueueEntry) {
        // The channel only closes when the proxy shuts down.
        let _ = self.tx.send(entry);
    }

    /// Startup recovery: sweep the spool and queue every surviving entry.
    pub async fn recover(&self) -> crate::error::Result<usize> {
        let entries = self.spool.populate().await?;
        let count = entries.len();
        for entry in entries {
            self.enqueue(entry);
        }
        info!(count, "recovered spooled uploads");
        Ok(count)
    }

    /// Spawn the configured number of upload workers.
    pub fn spawn_workers(self: &Arc<Self>) {
        for index in 0..self.worker_count {
            let proxy = self.clone();
            tokio::spawn(async move { proxy.run_worker(index).await });
        }
    }

    async fn run_worker(self: Arc<Self>, index: usize) {
        info!(worker = index, "upload worker started");
        loop {
            let entry = {
                let mut rx = self.rx.lock().await;
                rx.recv().await
            };
            let Some(entry) = entry else {
                break;
            };
            if self.floods.is_flooded(&entry.server).await {
                debug!(host = %entry.server.host, port = entry.server.port, "target flooded; requeueing entry");
                self.enqueue(entry);
                tokio::time::sleep(FLOOD_BACKOFF).await;
                continue;
            }
            match self.upload(&entry).await {
                Outcome::Delivered | Outcome::Discarded => self.spool.discard(&entry).await,
                Outcome::Requeued => {
                    self.floods.mark(&entry.server).await;
                    self.enqueue(entry);
                },
            }
        }
    }

    /// Attempt one delivery.
    ///
    /// Both local files are fully read (and their handles closed) before any
    /// unlink decision, which keeps the finalizers portable to filesystems
    /// that refuse to unlink open files.
    #[instrument(skip(self), fields(content = %entry.content.display()))]
    pub async fn upload(&self, entry: &QueueEntry) -> Outcome {
        let raw = match tokio::fs::read(&entry.meta).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(meta = %entry.meta.display(), error = %e, "queued metadata unreadable; discarding entry");
                return Outcome::Discarded;
            },
        };
        let record: QueuedRecord = match serde_json::from_slice(&raw) {
            Ok(record) => record,
            Err(e) => {
                error!(meta = %entry.meta.display(), error = %e, "queued metadata corrupt; discarding entry");
                return Outcome::Discarded;
            },
        };
        let data = match tokio::fs::read(&entry.content).await {
            Ok(data) => data,
            Err(e) => {
                error!(content = %entry.content.display(), error = %e, "queued content unreadable; discarding entry");
                return Outcome::Discarded;
            },
        };

        info!(uid = %record.uid, host = %entry.server.host, port = entry.server.port, "uploading entity");
        let client = Client::new(&entry.server.host, entry.server.port);
        let header = PutHeader {
            uid: Some(record.uid.clone()),
            keys: Some(record.keys),
            physical: record.physical,
            policy: record.policy,
            meta: Some(record.meta),
        };
        match client.put(&header, data, false, self.upload_timeout).await {
            Ok(_) => {
                info!(uid = %record.uid, "entity uploaded; unlinking spooled files");
                Outcome::Delivered
            },
            Err(e) if matches!(&*e, hoard_client::ErrorKind::InvalidRecord) => {
                error!(uid = %record.uid, "entity was submitted with invalid metadata and cannot be uploaded; unlinking");
                Outcome::Discarded
            },
            Err(e) => {
                warn!(uid = %record.uid, error = %e, "upload failed; entity will be requeued");
                Outcome::Requeued
            },
        }
    }
}
