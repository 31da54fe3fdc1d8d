//! One execution of the reconciliation engine.

use crate::config::{CloudService, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::item_set::ItemSetFactory;
use crate::ledger::{ChangeLedger, LedgerLock};
use crate::lifecycle::{Lifecycle, RunStatus};
use crate::reconciler::Reconciler;
use crate::report::{ProgressTracker, SyncReport};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use snipsync_protocol::{ConflictResolver, ItemId};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Cooperative stop signal shared between a run and its callers.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Creates an untriggered handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the run to stop scheduling items.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once `cancel` was called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A single reconciliation pass with its lifecycle and report.
///
/// A run is never resumed. Work left over by a failed or cancelled run is
/// re-derived from the ledger by the next one.
pub struct Run {
    id: u64,
    service: CloudService,
    factory: Arc<dyn ItemSetFactory>,
    ledger_path: PathBuf,
    config: SyncConfig,
    resolver: Option<Arc<dyn ConflictResolver>>,
    lifecycle: Mutex<Lifecycle>,
    tracker: Arc<ProgressTracker>,
    cancel: CancelHandle,
}

impl Run {
    /// Creates a pending run.
    pub fn new(
        id: u64,
        factory: Arc<dyn ItemSetFactory>,
        service: CloudService,
        ledger_path: impl Into<PathBuf>,
        config: SyncConfig,
    ) -> Self {
        Self {
            id,
            service,
            factory,
            ledger_path: ledger_path.into(),
            config,
            resolver: None,
            lifecycle: Mutex::new(Lifecycle::new()),
            tracker: Arc::new(ProgressTracker::new()),
            cancel: CancelHandle::new(),
        }
    }

    /// Resolves conflicts with `resolver` instead of the configured policy.
    pub fn with_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Run id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remote service of this run.
    pub fn service(&self) -> CloudService {
        self.service
    }

    /// Ledger file of this run.
    pub fn ledger_path(&self) -> &Path {
        &self.ledger_path
    }

    /// Executes the pass.
    ///
    /// Returns the terminal status. Only a second call is an error
    /// ([`SyncError::AlreadyStarted`]); run-fatal failures are reported
    /// through [`RunStatus::Failed`] and [`Run::error`].
    pub async fn execute(&self) -> SyncResult<RunStatus> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if lifecycle.status() != RunStatus::Pending {
                return Err(SyncError::AlreadyStarted);
            }
            lifecycle.start()?;
        }
        info!(run = self.id, service = %self.service, "synchronization started");

        let outcome = self.pass().await;

        let mut lifecycle = self.lifecycle.lock();
        match outcome {
            Ok(()) => {
                lifecycle.complete()?;
                let report = self.tracker.report();
                info!(
                    run = self.id,
                    duration = ?lifecycle.duration(),
                    processed = report.processed(),
                    changed = report.changed(),
                    errors = report.error_count,
                    cancelled = report.cancelled,
                    "synchronization completed"
                );
            }
            Err(e) => {
                error!(run = self.id, error = %e, "synchronization failed");
                lifecycle.fail(e)?;
            }
        }
        Ok(lifecycle.status())
    }

    async fn pass(&self) -> SyncResult<()> {
        let ledger_path = self.ledger_path.clone();
        let (lock, ledger) = blocking(move || {
            let lock = LedgerLock::acquire(&ledger_path)?;
            let ledger = ChangeLedger::load(ledger_path)?;
            Ok((lock, ledger))
        })
        .await?;
        let ledger = Arc::new(ledger);

        let local = self.factory.local()?;
        let remote = self.factory.remote(self.service)?;

        let mut reconciler = Reconciler::new(local, remote, Arc::clone(&ledger), self.config.clone())
            .with_tracker(Arc::clone(&self.tracker))
            .with_cancel(self.cancel.clone());
        if let Some(resolver) = &self.resolver {
            reconciler = reconciler.with_resolver(Arc::clone(resolver));
        }

        let reconciled = reconciler.reconcile().await;

        // Entries confirmed before a fatal error are kept.
        let persisted = blocking(move || {
            let result = ledger.persist();
            drop(lock);
            result
        })
        .await;

        if let Err(e) = reconciled {
            if let Err(persist_error) = &persisted {
                error!(run = self.id, error = %persist_error, "ledger persist failed");
            }
            return Err(e);
        }
        persisted
    }

    /// Requests cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Handle that cancels this run from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Current lifecycle status.
    pub fn status(&self) -> RunStatus {
        self.lifecycle.lock().status()
    }

    /// Progress in percent.
    pub fn progress_percent(&self) -> u8 {
        self.tracker.progress_percent()
    }

    /// Time the run started.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.lifecycle.lock().started_at()
    }

    /// Time the run finished.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.lifecycle.lock().finished_at()
    }

    /// Run duration, zero until finished.
    pub fn duration(&self) -> Duration {
        self.lifecycle.lock().duration()
    }

    /// Run-fatal error of a failed run.
    pub fn error(&self) -> Option<Arc<SyncError>> {
        self.lifecycle.lock().error()
    }

    /// Copy of the report as it stands.
    pub fn report(&self) -> SyncReport {
        self.tracker.report()
    }

    /// State of one item, if it was scheduled.
    pub fn item_state(&self, id: &ItemId) -> Option<Lifecycle> {
        self.tracker.item_state(id)
    }
}

impl std::fmt::Debug for Run {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Run")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("ledger_path", &self.ledger_path)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

async fn blocking<T, F>(f: F) -> SyncResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> SyncResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SyncError::TaskFailed(e.to_string()))?
}
