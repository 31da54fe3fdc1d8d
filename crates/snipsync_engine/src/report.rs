//! Per-run report and progress tracking.

use crate::error::SyncError;
use crate::lifecycle::Lifecycle;
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use snipsync_protocol::{Action, ItemId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Outcome of one run, aggregated per item.
///
/// A completed run can still carry per-item errors; `error_count == 0` means
/// a fully clean sync.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Items copied from the remote side into the local side.
    pub created_locally: BTreeSet<ItemId>,
    /// Local items overwritten with remote content.
    pub updated_locally: BTreeSet<ItemId>,
    /// Local items deleted because they were deleted remotely.
    pub deleted_locally: BTreeSet<ItemId>,
    /// Items copied from the local side into the remote side.
    pub created_remotely: BTreeSet<ItemId>,
    /// Remote items overwritten with local content.
    pub updated_remotely: BTreeSet<ItemId>,
    /// Remote items deleted because they were deleted locally.
    pub deleted_remotely: BTreeSet<ItemId>,
    /// Items processed without error, including no-ops.
    pub success_count: u64,
    /// Items that failed.
    pub error_count: u64,
    /// Error per failed item.
    #[serde(serialize_with = "serialize_errors")]
    pub errors: BTreeMap<ItemId, Arc<SyncError>>,
    /// Number of ids considered by the run.
    pub total: u64,
    /// Whether the run was stopped before every item was scheduled.
    pub cancelled: bool,
}

impl SyncReport {
    /// Returns true if no item failed.
    pub fn is_clean(&self) -> bool {
        self.error_count == 0
    }

    /// Number of items with an outcome.
    pub fn processed(&self) -> u64 {
        self.success_count + self.error_count
    }

    /// Number of items whose content or existence changed on either side.
    pub fn changed(&self) -> usize {
        self.created_locally.len()
            + self.updated_locally.len()
            + self.deleted_locally.len()
            + self.created_remotely.len()
            + self.updated_remotely.len()
            + self.deleted_remotely.len()
    }

    fn record(&mut self, id: &ItemId, applied: Action) {
        let bucket = match applied {
            Action::CreateLocal => &mut self.created_locally,
            Action::UpdateLocal => &mut self.updated_locally,
            Action::DeleteLocal => &mut self.deleted_locally,
            Action::CreateRemote => &mut self.created_remotely,
            Action::UpdateRemote => &mut self.updated_remotely,
            Action::DeleteRemote => &mut self.deleted_remotely,
            Action::NoOp | Action::ResolveConflict => return,
        };
        bucket.insert(id.clone());
    }
}

fn serialize_errors<S: Serializer>(
    errors: &BTreeMap<ItemId, Arc<SyncError>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(errors.iter().map(|(id, e)| (id.as_str(), e.to_string())))
}

/// Shared accumulator updated by item workers while a run is in progress.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    total: AtomicU64,
    processed: AtomicU64,
    report: Mutex<SyncReport>,
    items: Mutex<BTreeMap<ItemId, Lifecycle>>,
}

impl ProgressTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixes the number of ids the run will consider.
    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
        self.report.lock().total = total;
    }

    /// Number of ids the run considers.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// Number of items with an outcome so far.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    /// Progress in percent, 0 while the total is unknown or zero.
    pub fn progress_percent(&self) -> u8 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        let percent = self.processed().min(total) * 100 / total;
        u8::try_from(percent).unwrap_or(100)
    }

    /// Marks an item as in flight.
    pub fn item_started(&self, id: &ItemId) {
        let mut state = Lifecycle::new();
        if let Err(e) = state.start() {
            warn!(item = %id, error = %e, "item state transition rejected");
        }
        self.items.lock().insert(id.clone(), state);
    }

    /// Records a successful item; `applied` is the data action actually taken.
    pub fn record_success(&self, id: &ItemId, applied: Action) {
        {
            let mut report = self.report.lock();
            report.record(id, applied);
            report.success_count += 1;
        }
        self.finish_item(id, |state| state.complete());
    }

    /// Records a failed item.
    pub fn record_failure(&self, id: &ItemId, error: SyncError) {
        let error = Arc::new(error);
        {
            let mut report = self.report.lock();
            report.errors.insert(id.clone(), Arc::clone(&error));
            report.error_count += 1;
        }
        self.finish_item(id, |state| state.fail(error));
    }

    /// Flags the report as cancelled.
    pub fn mark_cancelled(&self) {
        self.report.lock().cancelled = true;
    }

    /// Copy of the report as it stands.
    pub fn report(&self) -> SyncReport {
        self.report.lock().clone()
    }

    /// State of one item, if it was scheduled.
    pub fn item_state(&self, id: &ItemId) -> Option<Lifecycle> {
        self.items.lock().get(id).cloned()
    }

    /// State of every scheduled item.
    pub fn item_states(&self) -> BTreeMap<ItemId, Lifecycle> {
        self.items.lock().clone()
    }

    fn finish_item(
        &self,
        id: &ItemId,
        transition: impl FnOnce(&mut Lifecycle) -> crate::error::SyncResult<()>,
    ) {
        {
            let mut items = self.items.lock();
            let state = items.entry(id.clone()).or_insert_with(|| {
                let mut state = Lifecycle::new();
                if let Err(e) = state.start() {
                    warn!(item = %id, error = %e, "item state transition rejected");
                }
                state
            });
            if let Err(e) = transition(state) {
                warn!(item = %id, error = %e, "item state transition rejected");
            }
        }
        self.processed.fetch_add(1, Ordering::SeqCst);
    }
}
