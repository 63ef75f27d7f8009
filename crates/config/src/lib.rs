//! Configuration loading for the hoard services.
//!
//! Each service loads one TOML profile, overlaid with `HOARD_*` environment
//! variables (`HOARD_HTTP__PORT=8085` overrides `[http] port`). All values
//! carry defaults, so an empty file is a working development setup.
//! Configuration is immutable after startup; services take it by value at
//! their composition root.

pub mod error;

pub use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

const ENV_PREFIX: &str = "HOARD_";

/// Load a service profile from an optional TOML file plus the environment.
pub fn load<T: DeserializeOwned>(path: Option<&Path>) -> Result<T> {
    let mut figment = Figment::new();
    if let Some(path) = path {
        info!(path = %path.display(), "loading configuration file");
        figment = figment.merge(Toml::file(path));
    }
    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .or_raise(|| ErrorKind::Invalid)
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn localhost() -> String {
    "127.0.0.1".to_string()
}

/// Listen address of a service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { host: default_host(), port: 8085 }
    }
}

/// Record store location.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("/var/lib/hoard/records.db") }
    }
}

/// Blob storage layout for the storage server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the generic (null-family) backend.
    pub path: PathBuf,
    /// Bucket resolution captured into every new record, in minutes.
    pub minute_resolution: u32,
    /// Additional family roots; every family not listed routes to `path`.
    pub families: BTreeMap<String, PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/lib/hoard/blobs"),
            minute_resolution: 5,
            families: BTreeMap::new(),
        }
    }
}

/// Access control and abuse limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Space-delimited client addresses that bypass per-record keys.
    pub trusted_hosts: String,
    /// Result cap for `query`.
    pub query_size: i64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self { trusted_hosts: String::new(), query_size: 250 }
    }
}

impl SecurityConfig {
    /// The trusted-host list as individual address strings.
    pub fn trusted(&self) -> impl Iterator<Item = &str> {
        self.trusted_hosts.split_whitespace()
    }
}

/// The set of compression algorithms a deployment admits into policies.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub formats: Vec<String>,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { formats: vec!["gzip".to_string(), "bz2".to_string(), "lzma".to_string()] }
    }
}

/// One maintenance loop's schedule: an execution-window definition and the
/// inter-cycle sleep in seconds. An empty window string disables the loop.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MaintainerWindow {
    pub windows: String,
    pub sleep: u64,
}

/// Schedules for all four maintenance loops.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MaintainersConfig {
    pub deletion: MaintainerWindow,
    pub compression: MaintainerWindow,
    /// Record-to-file reconciliation.
    pub database: MaintainerWindow,
    /// File-to-record reconciliation. Dangerous; disabled unless a window is
    /// configured explicitly.
    pub filesystem: MaintainerWindow,
}

impl Default for MaintainersConfig {
    fn default() -> Self {
        Self {
            deletion: MaintainerWindow { windows: String::new(), sleep: 300 },
            compression: MaintainerWindow { windows: String::new(), sleep: 1800 },
            database: MaintainerWindow { windows: String::new(), sleep: 43200 },
            filesystem: MaintainerWindow { windows: String::new(), sleep: 43200 },
        }
    }
}

/// Alert dispatch. Delivery transport lives behind the server's `Alerter`
/// trait; these settings govern the rate limiter and the envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub enabled: bool,
    /// Seconds between dispatched alerts; storms collapse into one.
    pub cooldown: u64,
    pub subject: String,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self { enabled: false, cooldown: 300, subject: "hoard alert".to_string() }
    }
}

/// Storage server profile.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub security: SecurityConfig,
    pub compression: CompressionConfig,
    pub maintainers: MaintainersConfig,
    pub alerts: AlertsConfig,
}

/// Caching-proxy cache behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheRulesConfig {
    /// Clamp bounds for the per-entity cache lifetime, in seconds.
    pub min_cache_time: i64,
    pub max_cache_time: i64,
    /// Timeout for upstream fetches, in seconds.
    pub timeout: f64,
}

impl Default for CacheRulesConfig {
    fn default() -> Self {
        Self { min_cache_time: 300, max_cache_time: 43200, timeout: 5.0 }
    }
}

/// On-disk layout shared by both proxies.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyStorageConfig {
    pub path: PathBuf,
    /// Extension of metadata siblings (without the dot).
    pub metadata_extension: String,
    /// Extension of staged partial files (without the dot).
    pub partial_extension: String,
    /// Seconds between cache purger wake-ups.
    pub purge_interval: u64,
}

impl Default for ProxyStorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/spool/hoard"),
            metadata_extension: "meta".to_string(),
            partial_extension: "part".to_string(),
            purge_interval: 60,
        }
    }
}

/// Caching proxy profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheProxyConfig {
    pub http: HttpConfig,
    pub storage: ProxyStorageConfig,
    pub rules: CacheRulesConfig,
    pub alerts: AlertsConfig,
}

impl Default for CacheProxyConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig { host: localhost(), port: 8086 },
            storage: ProxyStorageConfig { path: PathBuf::from("/var/cache/hoard"), ..Default::default() },
            rules: CacheRulesConfig::default(),
            alerts: AlertsConfig::default(),
        }
    }
}

/// Storage-proxy upload pool behavior.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub threads: usize,
    /// Timeout for one upstream upload, in seconds.
    pub timeout: f64,
    /// Seconds a failing server stays marked as flooded.
    pub flood_timeout: f64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self { threads: 5, timeout: 120.0, flood_timeout: 2.5 }
    }
}

/// Storage (write) proxy profile.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageProxyConfig {
    pub http: HttpConfig,
    pub storage: ProxyStorageConfig,
    pub upload: UploadConfig,
    pub alerts: AlertsConfig,
}

impl Default for StorageProxyConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig { host: localhost(), port: 8087 },
            storage: ProxyStorageConfig::default(),
            upload: UploadConfig::default(),
            alerts: AlertsConfig::default(),
        }
    }
}
