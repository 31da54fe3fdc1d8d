//! The change ledger: last synchronized fingerprint pair per item.
//!
//! The ledger is loaded once when a run starts and persisted once when it
//! ends. In between it lives in memory behind a mutex, which is the only
//! lock item workers contend on.
//!
//! ```text
//! <data_dir>/
//! ├─ ledger.csv        # sorted rows, see snipsync_protocol::encode_ledger
//! ├─ ledger.csv.tmp    # in-flight persist, renamed over ledger.csv
//! └─ ledger.csv.lock   # advisory lock held for the duration of a run
//! ```

use crate::error::{SyncError, SyncResult};
use fs2::FileExt;
use parking_lot::Mutex;
use snipsync_protocol::{decode_ledger, encode_ledger, ItemId, LedgerEntry};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// In-memory change ledger with optional file persistence.
#[derive(Debug)]
pub struct ChangeLedger {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<ItemId, LedgerEntry>>,
}

impl ChangeLedger {
    /// Creates a ledger that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Creates an in-memory ledger holding `entries`.
    pub fn from_entries(entries: impl IntoIterator<Item = (ItemId, LedgerEntry)>) -> Self {
        Self {
            path: None,
            entries: Mutex::new(entries.into_iter().collect()),
        }
    }

    /// Loads the ledger stored at `path`.
    ///
    /// A missing file gives an empty ledger. A file that does not decode is
    /// logged and also treated as empty; the next pass re-derives every
    /// action from presence alone. Any other I/O error is returned.
    pub fn load(path: impl Into<PathBuf>) -> SyncResult<Self> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => match decode_ledger(&text) {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "corrupt ledger, starting empty");
                        BTreeMap::new()
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ledger is not UTF-8, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(path = %path.display(), entries = entries.len(), "ledger loaded");
        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
        })
    }

    /// File the ledger persists to, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the entry for `id`.
    pub fn get(&self, id: &ItemId) -> Option<LedgerEntry> {
        self.entries.lock().get(id).cloned()
    }

    /// Records the fingerprint pair of a successfully reconciled item.
    pub fn put(&self, id: ItemId, entry: LedgerEntry) {
        self.entries.lock().insert(id, entry);
    }

    /// Drops the entry of an item that is gone on both sides.
    pub fn remove(&self, id: &ItemId) -> Option<LedgerEntry> {
        self.entries.lock().remove(id)
    }

    /// Every id with an entry.
    pub fn ids(&self) -> BTreeSet<ItemId> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of every entry.
    pub fn snapshot(&self) -> BTreeMap<ItemId, LedgerEntry> {
        self.entries.lock().clone()
    }

    /// Writes the ledger to its file atomically.
    ///
    /// 1. Encode under the lock
    /// 2. Write and sync a temporary file
    /// 3. Rename it over the ledger file
    /// 4. Sync the parent directory
    ///
    /// Does nothing for an in-memory ledger.
    pub fn persist(&self) -> SyncResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let text = encode_ledger(&self.entries.lock());
        let parent = parent_dir(path);
        fs::create_dir_all(parent)?;

        let temp_path = sibling(path, "tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(text.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, path)?;
        sync_directory(parent)?;

        debug!(path = %path.display(), bytes = text.len(), "ledger persisted");
        Ok(())
    }
}

/// Exclusive advisory lock on a ledger, released on drop.
#[derive(Debug)]
pub struct LedgerLock {
    path: PathBuf,
    _file: File,
}

impl LedgerLock {
    /// Locks the ledger stored at `ledger_path` without blocking.
    ///
    /// Fails with [`SyncError::Locked`] when another run holds the lock.
    pub fn acquire(ledger_path: &Path) -> SyncResult<Self> {
        fs::create_dir_all(parent_dir(ledger_path))?;

        let path = sibling(ledger_path, "lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(SyncError::Locked(ledger_path.to_path_buf()));
        }

        Ok(Self { path, _file: file })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

#[cfg(unix)]
fn sync_directory(dir: &Path) -> SyncResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_directory(_dir: &Path) -> SyncResult<()> {
    Ok(())
}
