//! Three-way classification of a single item.

use crate::fingerprint::Fingerprint;
use crate::ledger::LedgerEntry;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the reconciler does with one item during a pass.
///
/// Actions are transient: they are derived from an [`Observation`] and never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Copy a new local item to the remote side.
    CreateRemote,
    /// Copy a new remote item to the local side.
    CreateLocal,
    /// Overwrite the remote copy with the changed local one.
    UpdateRemote,
    /// Overwrite the local copy with the changed remote one.
    UpdateLocal,
    /// The item was deleted locally; delete the remote copy.
    DeleteRemote,
    /// The item was deleted remotely; delete the local copy.
    DeleteLocal,
    /// Both sides hold diverging content; ask the conflict resolver.
    ResolveConflict,
    /// Nothing to transfer. The ledger is still brought in line with the
    /// observed state (refreshed, or dropped when neither side has the item).
    NoOp,
}

impl Action {
    /// Returns true if applying the action writes to or deletes from a side.
    pub fn moves_data(&self) -> bool {
        !matches!(self, Action::NoOp | Action::ResolveConflict)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::CreateRemote => "create-remote",
            Action::CreateLocal => "create-local",
            Action::UpdateRemote => "update-remote",
            Action::UpdateLocal => "update-local",
            Action::DeleteRemote => "delete-remote",
            Action::DeleteLocal => "delete-local",
            Action::ResolveConflict => "resolve-conflict",
            Action::NoOp => "no-op",
        };
        f.write_str(name)
    }
}

/// Everything known about one item id at classification time.
///
/// `local`/`remote` hold the current fingerprint of each side where the item
/// exists; `ledger` is the snapshot of the entry taken before the item was
/// scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Observation {
    /// Current local fingerprint, if the item exists locally.
    pub local: Option<Fingerprint>,
    /// Current remote fingerprint, if the item exists remotely.
    pub remote: Option<Fingerprint>,
    /// Last synchronized fingerprint pair, if any.
    pub ledger: Option<LedgerEntry>,
}

impl Observation {
    /// Creates an observation.
    pub fn new(
        local: Option<Fingerprint>,
        remote: Option<Fingerprint>,
        ledger: Option<LedgerEntry>,
    ) -> Self {
        Self {
            local,
            remote,
            ledger,
        }
    }

    /// Classifies the item.
    ///
    /// | local | remote | ledger | action |
    /// |---|---|---|---|
    /// | - | - | any | `NoOp` (drops a stale entry) |
    /// | x | - | - | `CreateRemote` |
    /// | - | x | - | `CreateLocal` |
    /// | - | x | x | `DeleteRemote` |
    /// | x | - | x | `DeleteLocal` |
    /// | x | x | - | `ResolveConflict` |
    /// | x | x | x | by fingerprint comparison |
    pub fn classify(&self) -> Action {
        match (&self.local, &self.remote, &self.ledger) {
            (None, None, _) => Action::NoOp,
            (Some(_), None, None) => Action::CreateRemote,
            (None, Some(_), None) => Action::CreateLocal,
            (None, Some(_), Some(_)) => Action::DeleteRemote,
            (Some(_), None, Some(_)) => Action::DeleteLocal,
            (Some(_), Some(_), None) => Action::ResolveConflict,
            (Some(local), Some(remote), Some(entry)) => {
                let local_changed = *local != entry.local;
                let remote_changed = *remote != entry.remote;
                match (local_changed, remote_changed) {
                    (false, false) => Action::NoOp,
                    (true, false) => Action::UpdateRemote,
                    (false, true) => Action::UpdateLocal,
                    (true, true) => Action::ResolveConflict,
                }
            }
        }
    }
}
