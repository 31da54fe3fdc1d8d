//! Configuration-driven entry point and run registry.

use crate::config::{CloudService, SyncSettings, LEDGER_FILE, SETTINGS_FILE};
use crate::error::{SyncError, SyncResult};
use crate::item_set::ItemSetFactory;
use crate::run::Run;
use parking_lot::RwLock;
use snipsync_protocol::ConflictResolver;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// Runs started by one process, keyed by 1-based sequential id.
#[derive(Debug, Default)]
pub struct RunRegistry {
    last_id: AtomicU64,
    runs: RwLock<BTreeMap<u64, Arc<Run>>>,
}

impl RunRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a run with the next id and registers it.
    pub fn register(&self, build: impl FnOnce(u64) -> Run) -> Arc<Run> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        let run = Arc::new(build(id));
        self.runs.write().insert(id, Arc::clone(&run));
        run
    }

    /// Looks up a run.
    pub fn get(&self, id: u64) -> SyncResult<Arc<Run>> {
        self.runs
            .read()
            .get(&id)
            .cloned()
            .ok_or(SyncError::RunNotFound(id))
    }

    /// Most recently registered run.
    pub fn latest(&self) -> Option<Arc<Run>> {
        self.runs.read().values().next_back().cloned()
    }

    /// Number of registered runs.
    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    /// Returns true if no run was registered.
    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }
}

/// Starts runs for the configured cloud service.
///
/// Without a configured service the process is skipped: nothing is ever
/// started and [`SyncProcess::start`] returns [`SyncError::Skipped`].
pub struct SyncProcess {
    settings: SyncSettings,
    factory: Arc<dyn ItemSetFactory>,
    ledger_path: PathBuf,
    resolver: Option<Arc<dyn ConflictResolver>>,
    registry: RunRegistry,
}

impl SyncProcess {
    /// Creates a process from explicit settings.
    pub fn new(
        settings: SyncSettings,
        factory: Arc<dyn ItemSetFactory>,
        ledger_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            settings,
            factory,
            ledger_path: ledger_path.into(),
            resolver: None,
            registry: RunRegistry::new(),
        }
    }

    /// Loads settings and ledger location from a data directory.
    ///
    /// Settings are read before any run exists, so a malformed `sync.json`
    /// is returned here as [`SyncError::Configuration`] instead of producing
    /// a failed run.
    pub fn from_data_dir(data_dir: &Path, factory: Arc<dyn ItemSetFactory>) -> SyncResult<Self> {
        let settings = SyncSettings::load(&data_dir.join(SETTINGS_FILE))?;
        Ok(Self::new(settings, factory, data_dir.join(LEDGER_FILE)))
    }

    /// Resolves conflicts with `resolver` instead of the configured policy.
    pub fn with_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Settings in effect.
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Configured service, if any.
    pub fn service(&self) -> Option<CloudService> {
        self.settings.service
    }

    /// Returns true when no service is configured.
    pub fn is_skipped(&self) -> bool {
        self.settings.service.is_none()
    }

    /// Ledger file used by every run.
    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    /// Creates and registers a pending run.
    pub fn create_run(&self) -> SyncResult<Arc<Run>> {
        let service = self.settings.service.ok_or(SyncError::Skipped)?;
        let config = self.settings.to_sync_config();
        Ok(self.registry.register(|id| {
            let run = Run::new(
                id,
                Arc::clone(&self.factory),
                service,
                self.ledger_path.clone(),
                config,
            );
            match &self.resolver {
                Some(resolver) => run.with_resolver(Arc::clone(resolver)),
                None => run,
            }
        }))
    }

    /// Creates a run and executes it to its terminal state.
    ///
    /// The run is returned whether it completed or failed.
    pub async fn start(&self) -> SyncResult<Arc<Run>> {
        let run = match self.create_run() {
            Err(SyncError::Skipped) => {
                info!("no cloud service configured, synchronization skipped");
                return Err(SyncError::Skipped);
            }
            other => other?,
        };
        run.execute().await?;
        Ok(run)
    }

    /// Looks up a run started by this process.
    pub fn run(&self, id: u64) -> SyncResult<Arc<Run>> {
        self.registry.get(id)
    }

    /// Most recent run.
    pub fn latest(&self) -> Option<Arc<Run>> {
        self.registry.latest()
    }

    /// Registry of started runs.
    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }
}
