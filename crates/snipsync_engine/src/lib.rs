//! # snipsync engine
//!
//! Bidirectional reconciliation engine for snipsync.
//!
//! This crate provides:
//! - The `ItemSet` abstraction plus memory and directory backends
//! - The change ledger with atomic file persistence and a run lock
//! - The reconciler (three-way diff and apply on a bounded worker pool)
//! - Runs with a start/complete/fail lifecycle, progress and reports
//! - `SyncProcess`, which dispatches on the configured cloud service
//!
//! ## Architecture
//!
//! A run is a discrete, run-to-completion batch:
//! 1. Lock and load the ledger
//! 2. Build the local and remote item sets
//! 3. List both sides and classify every id against the ledger
//! 4. Apply actions item by item, updating the ledger on success
//! 5. Persist the ledger and finish the run
//!
//! ## Key Invariants
//!
//! - A ledger entry only changes after its item's action succeeded
//! - A failed item never fails the run
//! - Re-running without external changes performs no writes
//! - The ledger is the only state shared between item workers

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod directory;
mod error;
mod item_set;
mod ledger;
mod lifecycle;
mod process;
mod reconciler;
mod report;
mod run;

pub use config::{
    CloudService, RetryConfig, SyncConfig, SyncSettings, LEDGER_FILE, SETTINGS_FILE,
};
pub use directory::DirectoryItemSet;
pub use error::{SyncError, SyncResult};
pub use item_set::{FixedItemSetFactory, ItemSet, ItemSetFactory, MemoryItemSet};
pub use ledger::{ChangeLedger, LedgerLock};
pub use lifecycle::{Lifecycle, RunStatus};
pub use process::{RunRegistry, SyncProcess};
pub use reconciler::{PlannedAction, Reconciler};
pub use report::{ProgressTracker, SyncReport};
pub use run::{CancelHandle, Run};
