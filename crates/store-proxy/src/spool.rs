//! The durable spool: on-disk staging for queued uploads.
//!
//! Each accepted upload becomes a `<uid>` content file and a `<uid>.meta`
//! descriptor under `<root>/<host>_<port>/`. The content is copied to a
//! `<uid>.part` staging name first and renamed into place only after the
//! descriptor is durable, so an entry is live iff the unsuffixed content
//! and its metadata sibling both exist; anything else is crash residue.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use hoard_config::ProxyStorageConfig;
use hoard_proto::{QueuedRecord, ServerAddress};
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// One queued upload: where it is going and which files carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub server: ServerAddress,
    pub content: PathBuf,
    pub meta: PathBuf,
}

/// The spool area owned by the proxy's composition root.
pub struct Spool {
    root: PathBuf,
    meta_ext: String,
    part_ext: String,
}

impl Spool {
    pub fn new(config: &ProxyStorageConfig) -> Self {
        Self {
            root: config.path.clone(),
            meta_ext: config.metadata_extension.clone(),
            part_ext: config.partial_extension.clone(),
        }
    }

    fn server_dir(&self, server: &ServerAddress) -> PathBuf {
        self.root.join(format!("{}_{}", server.host, server.port))
    }

    /// Persist one upload: copy the source into staging, write the
    /// descriptor, then atomically reveal the content file.
    #[instrument(skip(self, record), fields(uid = %record.uid))]
    pub async fn add_entity(
        &self,
        server: &ServerAddress,
        source: &Path,
        record: &QueuedRecord,
    ) -> Result<QueueEntry> {
        let dir = self.server_dir(server);
        tokio::fs::create_dir_all(&dir).await.or_raise(|| ErrorKind::Disk(dir.clone()))?;

        let content = dir.join(&record.uid);
        let staging = dir.join(format!("{}.{}", record.uid, self.part_ext));
        let meta = dir.join(format!("{}.{}", record.uid, self.meta_ext));

        debug!(source = %source.display(), staging = %staging.display(), "copying upload into the spool");
        tokio::fs::copy(source, &staging).await.or_raise(|| ErrorKind::Disk(staging.clone()))?;
        let descriptor = serde_json::to_vec(record).or_raise(|| ErrorKind::Corrupt(meta.clone()))?;
        tokio::fs::write(&meta, descriptor).await.or_raise(|| ErrorKind::Disk(meta.clone()))?;
        tokio::fs::rename(&staging, &content).await.or_raise(|| ErrorKind::Disk(content.clone()))?;

        Ok(QueueEntry { server: server.clone(), content, meta })
    }

    /// Remove both files of a finished entry. Failures are logged; there is
    /// nothing better to do with them.
    pub async fn discard(&self, entry: &QueueEntry) {
        for path in [&entry.content, &entry.meta] {
            debug!(path = %path.display(), "unlinking finished queue entry");
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "unable to unlink queue entry file");
            }
        }
    }

    /// Startup recovery: scan every server directory, sweep crash residue
    /// and return the surviving entries, shuffled so restarted replicas do
    /// not retry in lockstep.
    pub async fn populate(&self) -> Result<Vec<QueueEntry>> {
        let mut entries = Vec::new();
        let mut dirs = match tokio::fs::read_dir(&self.root).await {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e).or_raise(|| ErrorKind::Disk(self.root.clone())),
        };
        while let Some(dir) = dirs.next_entry().await.or_raise(|| ErrorKind::Disk(self.root.clone()))? {
            if !dir.file_type().await.or_raise(|| ErrorKind::Disk(dir.path()))?.is_dir() {
                continue;
            }
            let name = dir.file_name().to_string_lossy().into_owned();
            let Some(server) = parse_server_dir(&name) else {
                warn!(directory = %name, "spool directory does not imply a server address");
                continue;
            };
            entries.extend(self.populate_dir(&dir.path(), server).await?);
        }
        entries.shuffle(&mut rand::thread_rng());
        Ok(entries)
    }

    async fn populate_dir(&self, dir: &Path, server: ServerAddress) -> Result<Vec<QueueEntry>> {
        let mut names = Vec::new();
        let mut listing = tokio::fs::read_dir(dir).await.or_raise(|| ErrorKind::Disk(dir.to_path_buf()))?;
        while let Some(entry) = listing.next_entry().await.or_raise(|| ErrorKind::Disk(dir.to_path_buf()))? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }

        // Partial transfers died mid-copy; their bytes are worthless.
        let part_suffix = format!(".{}", self.part_ext);
        for name in names.iter().filter(|name| name.ends_with(&part_suffix)) {
            info!(file = %name, "unlinking partial entity");
            if let Err(e) = tokio::fs::remove_file(dir.join(name)).await {
                warn!(file = %name, error = %e, "unable to unlink partial file");
            }
        }

        let mut survivors = Vec::new();
        for name in names.iter().filter(|name| !name.contains('.')) {
            let content = dir.join(name);
            let meta = dir.join(format!("{}.{}", name, self.meta_ext));
            if tokio::fs::try_exists(&meta).await.or_raise(|| ErrorKind::Disk(meta.clone()))? {
                info!(file = %name, "registered spooled entity");
                survivors.push(QueueEntry { server: server.clone(), content, meta });
            } else {
                // Metadata never made it to disk; the upload cannot be
                // replayed.
                info!(file = %name, "unlinking metadata-less entity");
                if let Err(e) = tokio::fs::remove_file(&content).await {
                    warn!(file = %name, error = %e, "unable to unlink metadata-less file");
                }
            }
        }
        Ok(survivors)
    }
}

fn parse_server_dir(name: &str) -> Option<ServerAddress> {
    let (host, port) = name.rsplit_once('_')?;
    let port = port.parse().ok()?;
    (!host.is_empty()).then(|| ServerAddress { host: host.to_string(), port })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoard_proto::{AccessKeys, FormatIn, PhysicalIn};
    use std::collections::BTreeMap;

    fn spool_at(root: &Path) -> Spool {
        let config = ProxyStorageConfig { path: root.to_path_buf(), ..ProxyStorageConfig::default() };
        Spool::new(&config)
    }

    fn server() -> ServerAddress {
        ServerAddress { host: "127.0.0.1".to_string(), port: 8085 }
    }

    fn record(uid: &str) -> QueuedRecord {
        QueuedRecord {
            uid: uid.to_string(),
            keys: AccessKeys::default(),
            physical: PhysicalIn {
                family: None,
                format: FormatIn { mime: "text/plain".to_string(), comp: None },
            },
            policy: None,
            meta: BTreeMap::new(),
        }
    }

    #[test]
    fn server_dir_parsing() {
        assert_eq!(
            parse_server_dir("10.0.0.5_8085"),
            Some(ServerAddress { host: "10.0.0.5".to_string(), port: 8085 })
        );
        // Hosts may themselves contain underscores; only the last one splits.
        assert_eq!(
            parse_server_dir("my_host_9000"),
            Some(ServerAddress { host: "my_host".to_string(), port: 9000 })
        );
        assert_eq!(parse_server_dir("not-a-server-dir"), None);
        assert_eq!(parse_server_dir("host_notaport"), None);
        assert_eq!(parse_server_dir("_8085"), None);
    }

    #[tokio::test]
    async fn add_entity_leaves_a_live_pair_and_no_staging() {
        let dir = tempfile::tempdir().unwrap();
        let spool = spool_at(dir.path());
        let source = dir.path().join("source.bin");
        tokio::fs::write(&source, b"payload").await.unwrap();

        let entry = spool.add_entity(&server(), &source, &record("u1")).await.unwrap();
        assert_eq!(tokio::fs::read(&entry.content).await.unwrap(), b"payload");
        let descriptor: QueuedRecord =
            serde_json::from_slice(&tokio::fs::read(&entry.meta).await.unwrap()).unwrap();
        assert_eq!(descriptor.uid, "u1");
        assert!(!dir.path().join("127.0.0.1_8085/u1.part").exists());
        // The original source file is untouched; the caller owns it.
        assert!(source.exists());
    }

    #[tokio::test]
    async fn populate_sweeps_residue_and_keeps_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let spool = spool_at(dir.path());
        let server_dir = dir.path().join("127.0.0.1_8085");
        tokio::fs::create_dir_all(&server_dir).await.unwrap();
        // A live pair.
        tokio::fs::write(server_dir.join("alive"), b"x").await.unwrap();
        tokio::fs::write(server_dir.join("alive.meta"), b"{}").await.unwrap();
        // Crash residue: a partial copy and a content file without metadata.
        tokio::fs::write(server_dir.join("partial.part"), b"x").await.unwrap();
        tokio::fs::write(server_dir.join("orphan"), b"x").await.unwrap();
        // A directory that names no server is left alone.
        tokio::fs::create_dir_all(dir.path().join("lost+found")).await.unwrap();
        tokio::fs::write(dir.path().join("lost+found/file"), b"x").await.unwrap();

        let entries = spool.populate().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].server, server());
        assert!(entries[0].content.ends_with("alive"));
        assert!(!server_dir.join("partial.part").exists());
        assert!(!server_dir.join("orphan").exists());
        assert!(dir.path().join("lost+found/file").exists());
    }

    #[tokio::test]
    async fn populate_on_a_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let spool = spool_at(&dir.path().join("never-created"));
        assert!(spool.populate().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn discard_removes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let spool = spool_at(dir.path());
        let source = dir.path().join("src");
        tokio::fs::write(&source, b"x").await.unwrap();
        let entry = spool.add_entity(&server(), &source, &record("u1")).await.unwrap();
        spool.discard(&entry).await;
        assert!(!entry.content.exists());
        assert!(!entry.meta.exists());
        // Discarding again only logs.
        spool.discard(&entry).await;
    }
}
