//! The three-way reconciler.
//!
//! One pass:
//! 1. List both item sets once and union their ids with the ledger's
//! 2. For every id, snapshot its ledger entry, then schedule it on a bounded
//!    worker pool
//! 3. A worker fingerprints the item on each side where it is listed,
//!    classifies it and applies the action through the item sets
//! 4. On success the ledger entry is written or removed; on failure it is
//!    left alone and the error is recorded in the report
//!
//! Every item set call runs on the blocking pool under the configured
//! timeout, and retryable errors are retried with backoff.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::item_set::ItemSet;
use crate::ledger::ChangeLedger;
use crate::report::ProgressTracker;
use crate::run::CancelHandle;
use serde::Serialize;
use snipsync_protocol::{
    Action, ConflictResolver, Fingerprint, Item, ItemId, LedgerEntry, Observation, Winner,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// An action computed for one item without applying it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedAction {
    /// Item id.
    pub id: ItemId,
    /// Classified action.
    pub action: Action,
}

/// Ids seen by one pass.
#[derive(Debug, Clone, Default)]
struct Listing {
    local: BTreeSet<ItemId>,
    remote: BTreeSet<ItemId>,
    all: BTreeSet<ItemId>,
}

/// Reconciles one local and one remote item set against a change ledger.
#[derive(Clone)]
pub struct Reconciler {
    local: Arc<dyn ItemSet>,
    remote: Arc<dyn ItemSet>,
    ledger: Arc<ChangeLedger>,
    resolver: Arc<dyn ConflictResolver>,
    config: SyncConfig,
    tracker: Arc<ProgressTracker>,
    cancel: CancelHandle,
}

impl Reconciler {
    /// Creates a reconciler resolving conflicts with `config.conflict_policy`.
    pub fn new(
        local: Arc<dyn ItemSet>,
        remote: Arc<dyn ItemSet>,
        ledger: Arc<ChangeLedger>,
        config: SyncConfig,
    ) -> Self {
        Self {
            local,
            remote,
            ledger,
            resolver: Arc::new(config.conflict_policy),
            config,
            tracker: Arc::new(ProgressTracker::new()),
            cancel: CancelHandle::new(),
        }
    }

    /// Replaces the conflict resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Reports progress into `tracker`.
    pub fn with_tracker(mut self, tracker: Arc<ProgressTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Stops scheduling items once `cancel` is triggered.
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Progress tracker of this reconciler.
    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    /// Classifies every id without applying anything, sorted by id.
    ///
    /// Fails on the first item set error.
    pub async fn plan(&self) -> SyncResult<Vec<PlannedAction>> {
        let listing = self.list().await?;
        let mut planned = Vec::with_capacity(listing.all.len());
        for id in &listing.all {
            let observation = self
                .observe(id, &listing, self.ledger.get(id))
                .await?;
            planned.push(PlannedAction {
                id: id.clone(),
                action: observation.classify(),
            });
        }
        Ok(planned)
    }

    /// Runs one reconciliation pass.
    ///
    /// Returns an error only when the item sets cannot be listed; per-item
    /// failures end up in the tracker's report.
    pub async fn reconcile(&self) -> SyncResult<()> {
        let listing = Arc::new(self.list().await?);
        self.tracker.set_total(listing.all.len() as u64);
        debug!(
            local = listing.local.len(),
            remote = listing.remote.len(),
            total = listing.all.len(),
            "item sets listed"
        );

        let workers = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut tasks = JoinSet::new();

        for id in listing.all.iter().cloned() {
            if self.cancel.is_cancelled() {
                break;
            }
            let permit = Arc::clone(&workers)
                .acquire_owned()
                .await
                .map_err(|e| SyncError::TaskFailed(e.to_string()))?;
            if self.cancel.is_cancelled() {
                break;
            }

            let entry = self.ledger.get(&id);
            let worker = self.clone();
            let listing = Arc::clone(&listing);
            tasks.spawn(async move {
                let _permit = permit;
                worker.process(id, &listing, entry).await;
            });
        }

        if self.cancel.is_cancelled() {
            warn!(
                scheduled = tasks.len(),
                total = listing.all.len(),
                "synchronization cancelled, waiting for items in flight"
            );
            self.tracker.mark_cancelled();
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "item worker aborted");
            }
        }
        Ok(())
    }

    async fn list(&self) -> SyncResult<Listing> {
        let local = self.call(&self.local, "list", |set| set.list_ids()).await?;
        let remote = self.call(&self.remote, "list", |set| set.list_ids()).await?;

        let mut all = self.ledger.ids();
        all.extend(local.iter().cloned());
        all.extend(remote.iter().cloned());
        Ok(Listing { local, remote, all })
    }

    async fn fingerprint(
        &self,
        set: &Arc<dyn ItemSet>,
        listed: bool,
        id: &ItemId,
    ) -> SyncResult<Option<Fingerprint>> {
        if !listed {
            return Ok(None);
        }
        let id = id.clone();
        self.call(set, "fingerprint", move |set| set.fingerprint_of(&id))
            .await
            .map(Some)
    }

    async fn observe(
        &self,
        id: &ItemId,
        listing: &Listing,
        entry: Option<LedgerEntry>,
    ) -> SyncResult<Observation> {
        let local = self
            .fingerprint(&self.local, listing.local.contains(id), id)
            .await?;
        let remote = self
            .fingerprint(&self.remote, listing.remote.contains(id), id)
            .await?;
        Ok(Observation::new(local, remote, entry))
    }

    async fn process(&self, id: ItemId, listing: &Listing, entry: Option<LedgerEntry>) {
        self.tracker.item_started(&id);
        match self.sync_item(&id, listing, entry).await {
            Ok(applied) => {
                debug!(item = %id, action = %applied, "item synchronized");
                self.tracker.record_success(&id, applied);
            }
            Err(e) => {
                error!(item = %id, error = %e, "item failed");
                self.tracker.record_failure(&id, e);
            }
        }
    }

    /// Classifies and applies one item, returning the data action taken.
    async fn sync_item(
        &self,
        id: &ItemId,
        listing: &Listing,
        entry: Option<LedgerEntry>,
    ) -> SyncResult<Action> {
        let observation = self.observe(id, listing, entry).await?;
        let action = observation.classify();
        debug!(item = %id, %action, "item classified");

        match (action, observation.local, observation.remote) {
            (Action::NoOp, Some(local), Some(remote)) => {
                self.ledger.put(id.clone(), LedgerEntry::new(local, remote));
                Ok(Action::NoOp)
            }
            (Action::NoOp, _, _) => {
                self.ledger.remove(id);
                Ok(Action::NoOp)
            }
            (Action::CreateRemote | Action::UpdateRemote, Some(local), _) => {
                self.copy(id, action, local, Direction::LocalToRemote)
                    .await
            }
            (Action::CreateLocal | Action::UpdateLocal, _, Some(remote)) => {
                self.copy(id, action, remote, Direction::RemoteToLocal)
                    .await
            }
            (Action::DeleteRemote, _, _) => {
                let target = id.clone();
                self.call(&self.remote, "delete", move |set| set.delete(&target))
                    .await?;
                self.ledger.remove(id);
                Ok(Action::DeleteRemote)
            }
            (Action::DeleteLocal, _, _) => {
                let target = id.clone();
                self.call(&self.local, "delete", move |set| set.delete(&target))
                    .await?;
                self.ledger.remove(id);
                Ok(Action::DeleteLocal)
            }
            (Action::ResolveConflict, Some(local), Some(remote)) => {
                match self.resolver.resolve(id, &local, &remote)? {
                    Winner::Local => {
                        self.copy(id, Action::UpdateRemote, local, Direction::LocalToRemote)
                            .await
                    }
                    Winner::Remote => {
                        self.copy(id, Action::UpdateLocal, remote, Direction::RemoteToLocal)
                            .await
                    }
                    Winner::Neither => {
                        debug!(item = %id, "conflict tied, refreshing ledger");
                        self.ledger.put(id.clone(), LedgerEntry::new(local, remote));
                        Ok(Action::NoOp)
                    }
                }
            }
            (action, _, _) => Err(SyncError::backend_fatal(format!(
                "{action} does not match the observed state of {id}"
            ))),
        }
    }

    /// Copies the item from one side to the other with `action`'s write,
    /// then records the source fingerprint and the re-read target one.
    async fn copy(
        &self,
        id: &ItemId,
        action: Action,
        source_fp: Fingerprint,
        direction: Direction,
    ) -> SyncResult<Action> {
        let (source, target) = match direction {
            Direction::LocalToRemote => (&self.local, &self.remote),
            Direction::RemoteToLocal => (&self.remote, &self.local),
        };

        let read_id = id.clone();
        let item: Arc<Item> = Arc::new(
            self.call(source, "read", move |set| set.read(&read_id))
                .await?,
        );

        let write_id = id.clone();
        match action {
            Action::CreateLocal | Action::CreateRemote => {
                self.call(target, "create", move |set| set.create(&write_id, &item))
                    .await?
            }
            _ => {
                self.call(target, "update", move |set| set.update(&write_id, &item))
                    .await?
            }
        }

        let written_id = id.clone();
        let target_fp = self
            .call(target, "fingerprint", move |set| set.fingerprint_of(&written_id))
            .await?;

        let entry = match direction {
            Direction::LocalToRemote => LedgerEntry::new(source_fp, target_fp),
            Direction::RemoteToLocal => LedgerEntry::new(target_fp, source_fp),
        };
        self.ledger.put(id.clone(), entry);
        Ok(action)
    }

    /// Runs one item set call on the blocking pool with timeout and retry.
    async fn call<T, F>(
        &self,
        set: &Arc<dyn ItemSet>,
        operation: &'static str,
        f: F,
    ) -> SyncResult<T>
    where
        T: Send + 'static,
        F: Fn(&dyn ItemSet) -> SyncResult<T> + Clone + Send + 'static,
    {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            let target = Arc::clone(set);
            let op = f.clone();
            let task = tokio::task::spawn_blocking(move || op(target.as_ref()));

            let result = match tokio::time::timeout(self.config.operation_timeout, task).await {
                Ok(Ok(result)) => result,
                Ok(Err(join)) => Err(SyncError::TaskFailed(join.to_string())),
                Err(_) => Err(SyncError::Timeout { operation }),
            };

            match result {
                Err(e) if may_retry(&e, operation) && attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    let delay = retry.delay_for_attempt(attempt);
                    debug!(
                        set = set.name(),
                        operation,
                        attempt,
                        ?delay,
                        error = %e,
                        "retrying item set call"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

/// A timed-out write may still be running on the blocking pool, so it is
/// not retried alongside itself.
fn may_retry(error: &SyncError, operation: &str) -> bool {
    match error {
        SyncError::Timeout { .. } => !matches!(operation, "create" | "update" | "delete"),
        other => other.is_retryable(),
    }
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    LocalToRemote,
    RemoteToLocal,
}
