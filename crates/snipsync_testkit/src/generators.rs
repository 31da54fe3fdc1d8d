//! Property-based test generators using proptest.
//!
//! A [`Scenario`] is a random three-way starting state: what each side holds
//! and what the ledger remembers. Ids come from a small pool so that local,
//! remote and ledger overlap often.

use crate::fixtures::{entry, item, SyncHarness};
use proptest::prelude::*;
use snipsync_protocol::{ItemId, LedgerEntry};
use std::collections::BTreeMap;

/// Starting state of one id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemScenario {
    /// Local modification offset, `None` when absent locally.
    pub local: Option<i64>,
    /// Remote modification offset, `None` when absent remotely.
    pub remote: Option<i64>,
    /// Ledger offsets `(local, remote)`, `None` when unknown to the ledger.
    pub ledger: Option<(i64, i64)>,
}

/// Random three-way starting state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    /// Per-id state.
    pub items: BTreeMap<ItemId, ItemScenario>,
}

impl Scenario {
    /// Loads the scenario into a harness: both sides and the ledger file.
    pub fn install(&self, harness: &SyncHarness) {
        let mut ledger: Vec<(ItemId, LedgerEntry)> = Vec::new();
        for (id, state) in &self.items {
            if let Some(secs) = state.local {
                harness
                    .local
                    .insert(id.clone(), item(&format!("{id} local @{secs}"), secs));
            }
            if let Some(secs) = state.remote {
                harness
                    .remote
                    .insert(id.clone(), item(&format!("{id} remote @{secs}"), secs));
            }
            if let Some((local, remote)) = state.ledger {
                ledger.push((id.clone(), entry(local, remote)));
            }
        }
        harness.workspace.seed_ledger(ledger);
    }
}

/// Strategy for item ids from a pool of `pool` names.
pub fn item_id_strategy(pool: usize) -> impl Strategy<Value = ItemId> {
    (0..pool.max(1)).prop_map(|n| ItemId::new(format!("snippet-{n}")))
}

/// Strategy for the state of one id. Offsets are small so that equal
/// timestamps (ties) and unchanged fingerprints are common.
pub fn item_scenario_strategy() -> impl Strategy<Value = ItemScenario> {
    let offset = 0i64..4;
    (
        prop::option::of(offset.clone()),
        prop::option::of(offset.clone()),
        prop::option::of((offset.clone(), offset)),
    )
        .prop_map(|(local, remote, ledger)| ItemScenario {
            local,
            remote,
            ledger,
        })
}

/// Strategy for a whole scenario with up to `max_items` ids.
pub fn scenario_strategy(max_items: usize) -> impl Strategy<Value = Scenario> {
    prop::collection::btree_map(item_id_strategy(max_items * 2), item_scenario_strategy(), 0..=max_items)
        .prop_map(|items| Scenario { items })
}
