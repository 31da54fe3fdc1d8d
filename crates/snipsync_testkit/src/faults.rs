//! Fault injection for item sets.
//!
//! [`FaultyItemSet`] wraps another item set and fails or delays selected
//! operations, optionally only for one item and only a limited number of
//! times. Every call is logged so tests can assert on the traffic.

use parking_lot::Mutex;
use snipsync_engine::{ItemSet, SyncError, SyncResult};
use snipsync_protocol::{Fingerprint, Item, ItemId};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Item set operations that faults can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `list_ids`
    List,
    /// `exists`
    Exists,
    /// `fingerprint_of`
    Fingerprint,
    /// `read`
    Read,
    /// `create`
    Create,
    /// `update`
    Update,
    /// `delete`
    Delete,
}

impl Operation {
    /// Returns true for create, update and delete.
    pub fn is_write(&self) -> bool {
        matches!(self, Operation::Create | Operation::Update | Operation::Delete)
    }
}

/// What an injected fault does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Fail with a retryable backend error.
    Transient,
    /// Fail with a non-retryable backend error.
    Fatal,
    /// Sleep before forwarding the call.
    Delay(Duration),
}

#[derive(Debug, Clone)]
struct Fault {
    operation: Operation,
    id: Option<ItemId>,
    kind: FaultKind,
    remaining: Option<u32>,
}

impl Fault {
    fn matches(&self, operation: Operation, id: Option<&ItemId>) -> bool {
        self.operation == operation
            && self.remaining != Some(0)
            && match (&self.id, id) {
                (None, _) => true,
                (Some(target), Some(id)) => target == id,
                (Some(_), None) => false,
            }
    }
}

/// Item set wrapper that injects faults.
pub struct FaultyItemSet {
    inner: Arc<dyn ItemSet>,
    faults: Mutex<Vec<Fault>>,
    calls: Mutex<Vec<(Operation, Option<ItemId>)>>,
}

impl FaultyItemSet {
    /// Wraps `inner` without any faults.
    pub fn new(inner: Arc<dyn ItemSet>) -> Self {
        Self {
            inner,
            faults: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always fails `operation` on `id` with a fatal error.
    pub fn fail_always(&self, operation: Operation, id: impl Into<ItemId>) -> &Self {
        self.push(operation, Some(id.into()), FaultKind::Fatal, None)
    }

    /// Fails `operation` on `id` with a transient error `times` times.
    pub fn fail_times(&self, operation: Operation, id: impl Into<ItemId>, times: u32) -> &Self {
        self.push(operation, Some(id.into()), FaultKind::Transient, Some(times))
    }

    /// Fails listing with a fatal error.
    pub fn fail_listing(&self) -> &Self {
        self.push(Operation::List, None, FaultKind::Fatal, None)
    }

    /// Delays every `operation` by `delay`.
    pub fn delay(&self, operation: Operation, delay: Duration) -> &Self {
        self.push(operation, None, FaultKind::Delay(delay), None)
    }

    /// Removes every fault.
    pub fn heal(&self) {
        self.faults.lock().clear();
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<(Operation, Option<ItemId>)> {
        self.calls.lock().clone()
    }

    /// Number of calls of `operation`.
    pub fn call_count(&self, operation: Operation) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(op, _)| *op == operation)
            .count()
    }

    /// Number of create, update and delete calls.
    pub fn write_calls(&self) -> usize {
        self.calls.lock().iter().filter(|(op, _)| op.is_write()).count()
    }

    fn push(
        &self,
        operation: Operation,
        id: Option<ItemId>,
        kind: FaultKind,
        remaining: Option<u32>,
    ) -> &Self {
        self.faults.lock().push(Fault {
            operation,
            id,
            kind,
            remaining,
        });
        self
    }

    fn intercept(&self, operation: Operation, id: Option<&ItemId>) -> SyncResult<()> {
        self.calls.lock().push((operation, id.cloned()));

        let triggered = {
            let mut faults = self.faults.lock();
            faults
                .iter_mut()
                .find(|fault| fault.matches(operation, id))
                .map(|fault| {
                    if let Some(remaining) = fault.remaining.as_mut() {
                        *remaining -= 1;
                    }
                    fault.kind
                })
        };

        let target = id.map_or_else(|| "<all>".to_string(), ToString::to_string);
        match triggered {
            None => Ok(()),
            Some(FaultKind::Delay(delay)) => {
                std::thread::sleep(delay);
                Ok(())
            }
            Some(FaultKind::Transient) => Err(SyncError::backend_retryable(format!(
                "injected transient {operation:?} failure for {target}"
            ))),
            Some(FaultKind::Fatal) => Err(SyncError::backend_fatal(format!(
                "injected {operation:?} failure for {target}"
            ))),
        }
    }
}

impl ItemSet for FaultyItemSet {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn list_ids(&self) -> SyncResult<BTreeSet<ItemId>> {
        self.intercept(Operation::List, None)?;
        self.inner.list_ids()
    }

    fn exists(&self, id: &ItemId) -> SyncResult<bool> {
        self.intercept(Operation::Exists, Some(id))?;
        self.inner.exists(id)
    }

    fn fingerprint_of(&self, id: &ItemId) -> SyncResult<Fingerprint> {
        self.intercept(Operation::Fingerprint, Some(id))?;
        self.inner.fingerprint_of(id)
    }

    fn read(&self, id: &ItemId) -> SyncResult<Item> {
        self.intercept(Operation::Read, Some(id))?;
        self.inner.read(id)
    }

    fn create(&self, id: &ItemId, item: &Item) -> SyncResult<()> {
        self.intercept(Operation::Create, Some(id))?;
        self.inner.create(id, item)
    }

    fn update(&self, id: &ItemId, item: &Item) -> SyncResult<()> {
        self.intercept(Operation::Update, Some(id))?;
        self.inner.update(id, item)
    }

    fn delete(&self, id: &ItemId) -> SyncResult<()> {
        self.intercept(Operation::Delete, Some(id))?;
        self.inner.delete(id)
    }
}
