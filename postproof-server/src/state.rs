//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use postproof_core::{
    AdapterRegistry, ContentFetcher, LifecycleManager, MaturationScheduler, MemoryRecordStore,
    RecordStore, VerificationEngine,
};

use crate::config::Config;
use crate::db::PgRecordStore;

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Submission, status and maturation
    pub lifecycle: Arc<LifecycleManager>,
    /// Sweep driver shared by the trigger endpoint and the in-process timer
    pub scheduler: Arc<MaturationScheduler>,
    /// Drift verification against the live post
    pub verifier: Arc<VerificationEngine>,
    /// Post-fetch collaborator, also used when a submission omits its snapshot
    pub fetcher: Arc<dyn ContentFetcher>,
    /// Postgres store, when configured; used by the readiness check
    pub database: Option<PgRecordStore>,
    /// Shared secret guarding the sweep trigger; `None` disables the endpoint
    pub cron_secret: Option<Arc<str>>,
}

impl AppState {
    /// Wire the engine from already constructed parts.
    pub fn new(
        config: &Config,
        registry: AdapterRegistry,
        store: Arc<dyn RecordStore>,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> Self {
        let lifecycle = Arc::new(LifecycleManager::new(
            Arc::new(registry),
            store.clone(),
            config.lifecycle_config(),
        ));
        let scheduler = Arc::new(MaturationScheduler::new(
            lifecycle.clone(),
            config.sweep_concurrency,
        ));
        let verifier = Arc::new(VerificationEngine::new(store, fetcher.clone()));

        Self {
            lifecycle,
            scheduler,
            verifier,
            fetcher,
            database: None,
            cron_secret: config.cron_secret.as_deref().map(Arc::from),
        }
    }

    /// In-memory state: memory store, mock backends per `config`.
    ///
    /// Used by tests and by deployments without `DATABASE_URL`.
    pub fn in_memory(
        config: &Config,
        fetcher: Arc<dyn ContentFetcher>,
    ) -> postproof_core::Result<Self> {
        let registry = AdapterRegistry::from_config(config.registry_config())?;
        Ok(Self::new(
            config,
            registry,
            Arc::new(MemoryRecordStore::new()),
            fetcher,
        ))
    }

    pub fn with_database(mut self, database: PgRecordStore) -> Self {
        self.database = Some(database);
        self
    }
}
