//! Item set abstraction over one side of a sync.

use crate::config::CloudService;
use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use snipsync_protocol::{Fingerprint, Item, ItemId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One side (local or remote) of a synchronization.
///
/// All operations may block on disk or network I/O; the reconciler calls them
/// from a blocking thread pool under a timeout. Writes must be safe to retry:
/// creating an id that already exists or deleting one that is gone must not
/// corrupt the set, though an implementation may report an error.
pub trait ItemSet: Send + Sync {
    /// Human-readable name used in logs.
    fn name(&self) -> &str;

    /// Enumerates every item currently present.
    fn list_ids(&self) -> SyncResult<BTreeSet<ItemId>>;

    /// Returns true if the item is present.
    fn exists(&self, id: &ItemId) -> SyncResult<bool>;

    /// Returns the item's fingerprint without transferring its content.
    fn fingerprint_of(&self, id: &ItemId) -> SyncResult<Fingerprint>;

    /// Reads the item. Fails with [`SyncError::ItemUnavailable`] if it is gone.
    fn read(&self, id: &ItemId) -> SyncResult<Item>;

    /// Stores a new item.
    fn create(&self, id: &ItemId, item: &Item) -> SyncResult<()>;

    /// Replaces an existing item.
    fn update(&self, id: &ItemId, item: &Item) -> SyncResult<()>;

    /// Deletes the item.
    fn delete(&self, id: &ItemId) -> SyncResult<()>;
}

/// Builds the two item sets of a run.
///
/// Called once when a run starts; errors are run-fatal.
pub trait ItemSetFactory: Send + Sync {
    /// Builds the local item set.
    fn local(&self) -> SyncResult<Arc<dyn ItemSet>>;

    /// Builds the remote item set for the configured service.
    fn remote(&self, service: CloudService) -> SyncResult<Arc<dyn ItemSet>>;
}

/// Factory handing out item sets that were built up front.
#[derive(Clone)]
pub struct FixedItemSetFactory {
    local: Arc<dyn ItemSet>,
    remote: Arc<dyn ItemSet>,
    service: Option<CloudService>,
}

impl FixedItemSetFactory {
    /// Creates a factory serving `remote` for every service.
    pub fn new(local: Arc<dyn ItemSet>, remote: Arc<dyn ItemSet>) -> Self {
        Self {
            local,
            remote,
            service: None,
        }
    }

    /// Restricts the remote set to one service; others are unsupported.
    pub fn for_service(mut self, service: CloudService) -> Self {
        self.service = Some(service);
        self
    }
}

impl ItemSetFactory for FixedItemSetFactory {
    fn local(&self) -> SyncResult<Arc<dyn ItemSet>> {
        Ok(Arc::clone(&self.local))
    }

    fn remote(&self, service: CloudService) -> SyncResult<Arc<dyn ItemSet>> {
        match self.service {
            Some(supported) if supported != service => Err(SyncError::UnsupportedService(service)),
            _ => Ok(Arc::clone(&self.remote)),
        }
    }
}

/// An in-memory item set.
///
/// The fingerprint is the item's `modified` timestamp. Content reads and
/// writes are counted so tests can tell whether data was transferred.
#[derive(Debug)]
pub struct MemoryItemSet {
    name: String,
    items: RwLock<BTreeMap<ItemId, Item>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemoryItemSet {
    /// Creates an empty set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: RwLock::new(BTreeMap::new()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Creates a set pre-filled with `items`.
    pub fn with_items(
        name: impl Into<String>,
        items: impl IntoIterator<Item = (ItemId, Item)>,
    ) -> Self {
        let set = Self::new(name);
        set.items.write().extend(items);
        set
    }

    /// Inserts or replaces an item without counting a write.
    pub fn insert(&self, id: impl Into<ItemId>, item: Item) {
        self.items.write().insert(id.into(), item);
    }

    /// Returns a copy of an item without counting a read.
    pub fn get(&self, id: &str) -> Option<Item> {
        self.items.read().get(id).cloned()
    }

    /// Removes an item without counting a write.
    pub fn remove(&self, id: &str) -> Option<Item> {
        self.items.write().remove(id)
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns true if the set holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Copy of every item.
    pub fn snapshot(&self) -> BTreeMap<ItemId, Item> {
        self.items.read().clone()
    }

    /// Number of content reads served.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of creates, updates and deletes served.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn unavailable(id: &ItemId) -> SyncError {
        SyncError::ItemUnavailable(id.clone())
    }
}

impl ItemSet for MemoryItemSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_ids(&self) -> SyncResult<BTreeSet<ItemId>> {
        Ok(self.items.read().keys().cloned().collect())
    }

    fn exists(&self, id: &ItemId) -> SyncResult<bool> {
        Ok(self.items.read().contains_key(id))
    }

    fn fingerprint_of(&self, id: &ItemId) -> SyncResult<Fingerprint> {
        self.items
            .read()
            .get(id)
            .map(|item| Fingerprint::from_timestamp(item.modified))
            .ok_or_else(|| Self::unavailable(id))
    }

    fn read(&self, id: &ItemId) -> SyncResult<Item> {
        let item = self
            .items
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Self::unavailable(id))?;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(item)
    }

    fn create(&self, id: &ItemId, item: &Item) -> SyncResult<()> {
        self.items.write().insert(id.clone(), item.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn update(&self, id: &ItemId, item: &Item) -> SyncResult<()> {
        let mut items = self.items.write();
        let slot = items.get_mut(id).ok_or_else(|| Self::unavailable(id))?;
        *slot = item.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, id: &ItemId) -> SyncResult<()> {
        self.items.write().remove(id);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
