//! Application state: the composition root's view of the server.

use crate::alert::Alerter;
use crate::error::ApiError;
use crate::families::FamilyRouter;
use hoard_compress::Compression;
use hoard_config::ServerConfig;
use hoard_records::RecordStore;
use tracing::{error, warn};

/// Everything a request handler or maintenance loop needs, owned in one
/// place and constructed once at startup. There is no process-global
/// mutable state; this value is shared behind an `Arc`.
pub struct AppState {
    pub config: ServerConfig,
    pub records: RecordStore,
    pub families: FamilyRouter,
    pub alerts: Alerter,
    allowed_formats: Vec<Compression>,
}

impl AppState {
    pub fn new(config: ServerConfig, records: RecordStore, families: FamilyRouter, alerts: Alerter) -> Self {
        let allowed_formats = config
            .compression
            .formats
            .iter()
            .filter_map(|name| match name.parse::<Compression>() {
                Ok(Compression::None) => None,
                Ok(format) => Some(format),
                Err(_) => {
                    warn!(format = %name, "ignoring unknown compression format in configuration");
                    None
                },
            })
            .collect();
        Self { config, records, families, alerts, allowed_formats }
    }

    /// Algorithms this deployment admits into compression policies.
    pub fn allowed_formats(&self) -> &[Compression] {
        &self.allowed_formats
    }

    /// The configured trusted-host addresses.
    pub fn trusted(&self) -> impl Iterator<Item = &str> {
        self.config.security.trusted()
    }

    /// Classify a storage failure into a response, paging the operator for
    /// the fatal classes.
    pub fn storage_failure(&self, err: hoard_storage::Error) -> ApiError {
        if matches!(&*err, hoard_storage::error::ErrorKind::NotFound(_)) {
            return ApiError::NotFound;
        }
        let summary = format!("filesystem error: {err:?}");
        error!(%err, "filesystem error");
        self.alerts.dispatch(&summary);
        ApiError::Internal
    }

    /// Classify a record-store failure into a response. Store outages are a
    /// short-term problem (503) and page the operator.
    pub fn records_failure(&self, err: hoard_records::Error) -> ApiError {
        use hoard_records::ErrorKind;
        match &*err {
            ErrorKind::Database => {
                let summary = format!("record store unavailable: {err:?}");
                error!(%err, "record store unavailable");
                self.alerts.dispatch(&summary);
                ApiError::Unavailable
            },
            ErrorKind::Duplicate(_) | ErrorKind::BadFilter(_) => ApiError::BadRequest,
            ErrorKind::Migration | ErrorKind::InvalidData(_) => self.internal("record store", &err),
        }
    }

    /// An unexpected internal failure: log with the error tree, page the
    /// operator, answer 500.
    pub fn internal(&self, context: &str, err: &dyn std::fmt::Debug) -> ApiError {
        let summary = format!("{context}: {err:?}");
        error!(context, ?err, "internal error");
        self.alerts.dispatch(&summary);
        ApiError::Internal
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hoard_records::Database;
    use hoard_storage::MemoryBackend;
    use std::sync::Arc;

    /// A fully in-memory application state for handler tests.
    pub(crate) async fn memory_state() -> AppState {
        let db = Database::connect_in_memory().await.unwrap();
        let families = FamilyRouter::new(Arc::new(MemoryBackend::new("generic")));
        AppState::new(ServerConfig::default(), RecordStore::from(&db), families, Alerter::disabled())
    }

    #[tokio::test]
    async fn unknown_configured_formats_are_ignored() {
        let db = Database::connect_in_memory().await.unwrap();
        let mut config = ServerConfig::default();
        config.compression.formats = vec!["gzip".to_string(), "snappy".to_string(), "none".to_string()];
        let state = AppState::new(
            config,
            RecordStore::from(&db),
            FamilyRouter::new(Arc::new(MemoryBackend::new("generic"))),
            Alerter::disabled(),
        );
        assert_eq!(state.allowed_formats(), [Compression::Gzip]);
    }
}
