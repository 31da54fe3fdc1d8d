//! Test fixtures.
//!
//! Provides item helpers, a temporary data directory and a harness that runs
//! the engine against two in-memory item sets.

use crate::faults::FaultyItemSet;
use chrono::{DateTime, TimeZone, Utc};
use snipsync_engine::{
    ChangeLedger, CloudService, DirectoryItemSet, FixedItemSetFactory, ItemSet, MemoryItemSet,
    RetryConfig, Run, SyncConfig, LEDGER_FILE,
};
use snipsync_protocol::{Fingerprint, Item, ItemId, LedgerEntry};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Reference instant all fixture times are offsets of.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .expect("valid base time")
}

/// `base_time() + secs`.
pub fn at(secs: i64) -> DateTime<Utc> {
    base_time() + chrono::Duration::seconds(secs)
}

/// An item modified `secs` after the base time.
pub fn item(content: &str, secs: i64) -> Item {
    Item::new(content, at(secs))
}

/// The fingerprint memory and directory sets give an item modified at `secs`.
pub fn fingerprint(secs: i64) -> Fingerprint {
    Fingerprint::from_timestamp(at(secs))
}

/// A ledger entry whose both fingerprints are at the given offsets.
pub fn entry(local_secs: i64, remote_secs: i64) -> LedgerEntry {
    LedgerEntry::new(fingerprint(local_secs), fingerprint(remote_secs))
}

/// A temporary data directory, removed on drop.
pub struct TestWorkspace {
    temp: TempDir,
}

impl TestWorkspace {
    /// Creates an empty workspace.
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Root of the workspace.
    pub fn data_dir(&self) -> &Path {
        self.temp.path()
    }

    /// Ledger file location.
    pub fn ledger_path(&self) -> PathBuf {
        self.temp.path().join(LEDGER_FILE)
    }

    /// Loads the ledger from disk.
    pub fn ledger(&self) -> ChangeLedger {
        ChangeLedger::load(self.ledger_path()).expect("Failed to load ledger")
    }

    /// Raw ledger bytes, empty if the file does not exist.
    pub fn ledger_bytes(&self) -> Vec<u8> {
        std::fs::read(self.ledger_path()).unwrap_or_default()
    }

    /// Writes `entries` as the ledger file.
    pub fn seed_ledger(&self, entries: impl IntoIterator<Item = (ItemId, LedgerEntry)>) {
        let ledger = ChangeLedger::load(self.ledger_path()).expect("Failed to load ledger");
        for (id, entry) in entries {
            ledger.put(id, entry);
        }
        ledger.persist().expect("Failed to persist ledger");
    }

    /// Opens a directory item set below the workspace.
    pub fn directory(&self, name: &str) -> DirectoryItemSet {
        DirectoryItemSet::open(name, self.temp.path().join(name))
            .expect("Failed to open directory item set")
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Two memory item sets, a fault-injecting view of each, and a ledger file.
///
/// ```rust,ignore
/// let harness = SyncHarness::new();
/// harness.local.insert("a", item("fn a() {}", 0));
/// let run = harness.run().await;
/// assert!(harness.remote.get("a").is_some());
/// ```
pub struct SyncHarness {
    /// Workspace holding the ledger.
    pub workspace: TestWorkspace,
    /// Local items.
    pub local: Arc<MemoryItemSet>,
    /// Remote items.
    pub remote: Arc<MemoryItemSet>,
    /// Local side as seen by the engine.
    pub local_faults: Arc<FaultyItemSet>,
    /// Remote side as seen by the engine.
    pub remote_faults: Arc<FaultyItemSet>,
    /// Engine configuration used by [`SyncHarness::run`].
    pub config: SyncConfig,
    runs: AtomicU64,
}

impl SyncHarness {
    /// Creates a harness with empty sides and no retries.
    pub fn new() -> Self {
        let local = Arc::new(MemoryItemSet::new("local"));
        let remote = Arc::new(MemoryItemSet::new("remote"));
        Self {
            workspace: TestWorkspace::new(),
            local_faults: Arc::new(FaultyItemSet::new(Arc::clone(&local) as Arc<dyn ItemSet>)),
            remote_faults: Arc::new(FaultyItemSet::new(Arc::clone(&remote) as Arc<dyn ItemSet>)),
            local,
            remote,
            config: SyncConfig::new()
                .with_workers(3)
                .with_operation_timeout(Duration::from_secs(5))
                .with_retry(RetryConfig::no_retry()),
            runs: AtomicU64::new(0),
        }
    }

    /// Replaces the engine configuration.
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Creates a pending run over the fault-injecting views.
    pub fn new_run(&self) -> Run {
        let factory = FixedItemSetFactory::new(
            Arc::clone(&self.local_faults) as Arc<dyn ItemSet>,
            Arc::clone(&self.remote_faults) as Arc<dyn ItemSet>,
        );
        let id = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        Run::new(
            id,
            Arc::new(factory),
            CloudService::Dropbox,
            self.workspace.ledger_path(),
            self.config.clone(),
        )
    }

    /// Executes one run to its terminal state.
    pub async fn run(&self) -> Run {
        let run = self.new_run();
        run.execute().await.expect("run was already started");
        run
    }

    /// Current ledger entries on disk.
    pub fn ledger(&self) -> BTreeMap<ItemId, LedgerEntry> {
        self.workspace.ledger().snapshot()
    }

    /// Number of content writes performed on both sides.
    pub fn writes(&self) -> u64 {
        self.local.write_count() + self.remote.write_count()
    }

    /// Number of content reads performed on both sides.
    pub fn reads(&self) -> u64 {
        self.local.read_count() + self.remote.read_count()
    }
}

impl Default for SyncHarness {
    fn default() -> Self {
        Self::new()
    }
}
