//! End-to-end reconciliation tests over in-memory and directory item sets.

use proptest::prelude::*;
use snipsync_engine::{
    CloudService, FixedItemSetFactory, ItemSet, RetryConfig, Run, RunStatus, SyncConfig,
    SyncError,
};
use snipsync_protocol::{ItemId, LedgerEntry};
use snipsync_testkit::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn id(name: &str) -> ItemId {
    ItemId::from(name)
}

// ============================================================================
// Propagation
// ============================================================================

#[tokio::test]
async fn new_local_item_is_created_remotely() {
    let harness = SyncHarness::new();
    harness.local.insert("new", item("fn new() {}", 7));

    let run = harness.run().await;

    assert_eq!(run.status(), RunStatus::Completed);
    assert_eq!(harness.remote.get("new"), Some(item("fn new() {}", 7)));
    assert_eq!(
        harness.ledger().get(&id("new")),
        Some(&LedgerEntry::new(fingerprint(7), fingerprint(7)))
    );
    let report = run.report();
    assert!(report.created_remotely.contains("new"));
    assert_eq!(report.success_count, 1);
    assert!(report.is_clean());
}

#[tokio::test]
async fn new_remote_item_is_created_locally() {
    let harness = SyncHarness::new();
    harness.remote.insert("shared", item("from the cloud", 3));

    let run = harness.run().await;

    assert_eq!(harness.local.get("shared"), Some(item("from the cloud", 3)));
    assert!(run.report().created_locally.contains("shared"));
    assert_eq!(harness.ledger().get(&id("shared")), Some(&entry(3, 3)));
}

#[tokio::test]
async fn local_deletion_propagates() {
    let harness = SyncHarness::new();
    harness.local.insert("doomed", item("x", 0));
    harness.remote.insert("doomed", item("x", 0));
    harness.workspace.seed_ledger([(id("doomed"), entry(0, 0))]);

    harness.local.remove("doomed");
    let run = harness.run().await;

    assert!(harness.remote.get("doomed").is_none());
    assert!(harness.ledger().is_empty());
    assert!(run.report().deleted_remotely.contains("doomed"));
}

#[tokio::test]
async fn local_edit_updates_remote() {
    let harness = SyncHarness::new();
    harness.local.insert("edited", item("v2", 30));
    harness.remote.insert("edited", item("v1", 0));
    harness.workspace.seed_ledger([(id("edited"), entry(0, 0))]);

    let run = harness.run().await;

    assert_eq!(harness.remote.get("edited").unwrap().content, b"v2");
    assert_eq!(harness.ledger().get(&id("edited")), Some(&entry(30, 30)));
    assert!(run.report().updated_remotely.contains("edited"));
}

// ============================================================================
// Conflicts
// ============================================================================

#[tokio::test]
async fn concurrent_creation_newer_local_wins() {
    let harness = SyncHarness::new();
    harness.local.insert("both", item("local version", 10));
    harness.remote.insert("both", item("remote version", 0));

    let run = harness.run().await;

    assert_eq!(harness.remote.get("both").unwrap().content, b"local version");
    assert_eq!(harness.local.get("both").unwrap().content, b"local version");
    assert_eq!(harness.ledger().get(&id("both")), Some(&entry(10, 10)));
    assert!(run.report().updated_remotely.contains("both"));
}

#[tokio::test]
async fn tie_refreshes_ledger_without_transfer() {
    let harness = SyncHarness::new();
    harness.local.insert("tie", item("left", 5));
    harness.remote.insert("tie", item("right", 5));

    let run = harness.run().await;

    assert_eq!(harness.reads(), 0);
    assert_eq!(harness.writes(), 0);
    assert_eq!(harness.local.get("tie").unwrap().content, b"left");
    assert_eq!(harness.remote.get("tie").unwrap().content, b"right");
    assert_eq!(harness.ledger().get(&id("tie")), Some(&entry(5, 5)));

    let report = run.report();
    assert_eq!(report.changed(), 0);
    assert_eq!(report.success_count, 1);

    // Not re-flagged on the next run.
    let again = harness.run().await;
    assert_eq!(again.report().changed(), 0);
    assert_eq!(harness.writes(), 0);
}

#[tokio::test]
async fn both_sides_edited_to_same_instant_is_a_tie() {
    let harness = SyncHarness::new();
    harness.local.insert("s", item("a", 9));
    harness.remote.insert("s", item("b", 9));
    harness.workspace.seed_ledger([(id("s"), entry(0, 0))]);

    harness.run().await;

    assert_eq!(harness.writes(), 0);
    assert_eq!(harness.ledger().get(&id("s")), Some(&entry(9, 9)));
}

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn second_run_is_a_no_op() {
    let harness = SyncHarness::new();
    harness.local.insert("a", item("a", 1));
    harness.local.insert("b", item("b", 2));
    harness.remote.insert("c", item("c", 3));
    harness.remote.insert("b", item("b remote", 8));

    let first = harness.run().await;
    assert!(first.report().is_clean());
    let ledger_after_first = harness.workspace.ledger_bytes();
    let writes = harness.writes();
    let reads = harness.reads();

    let second = harness.run().await;
    let report = second.report();
    assert_eq!(report.changed(), 0);
    assert_eq!(report.success_count, report.total);
    assert_eq!(report.total, 3);
    assert_eq!(harness.writes(), writes);
    assert_eq!(harness.reads(), reads);
    assert_eq!(harness.workspace.ledger_bytes(), ledger_after_first);
}

// ============================================================================
// Failures
// ============================================================================

fn five_edited_items(harness: &SyncHarness) {
    let mut seed = Vec::new();
    for n in 1..=5 {
        let name = format!("item-{n}");
        harness.local.insert(name.as_str(), item(&format!("{name} v2"), 5));
        harness.remote.insert(name.as_str(), item(&format!("{name} v1"), 0));
        seed.push((ItemId::new(name), entry(0, 0)));
    }
    harness.workspace.seed_ledger(seed);
}

#[tokio::test]
async fn failed_item_does_not_stop_the_run() {
    let harness = SyncHarness::new();
    five_edited_items(&harness);
    harness
        .remote_faults
        .fail_always(Operation::Update, "item-3");

    let run = harness.run().await;

    assert_eq!(run.status(), RunStatus::Completed);
    let report = run.report();
    assert_eq!(report.error_count, 1);
    assert_eq!(report.success_count, 4);
    assert!(report.errors.contains_key("item-3"));
    assert_eq!(
        run.item_state(&id("item-3")).unwrap().status(),
        RunStatus::Failed
    );

    let ledger = harness.ledger();
    assert_eq!(ledger.get(&id("item-3")), Some(&entry(0, 0)));
    for n in [1, 2, 4, 5] {
        assert_eq!(ledger.get(&ItemId::new(format!("item-{n}"))), Some(&entry(5, 5)));
    }
}

#[tokio::test]
async fn failed_item_succeeds_on_the_next_run() {
    let harness = SyncHarness::new();
    five_edited_items(&harness);
    harness
        .remote_faults
        .fail_always(Operation::Update, "item-3");
    harness.run().await;

    harness.remote_faults.heal();
    let run = harness.run().await;

    let report = run.report();
    assert!(report.is_clean());
    assert_eq!(report.updated_remotely.len(), 1);
    assert!(report.updated_remotely.contains("item-3"));
    assert_eq!(harness.remote.get("item-3").unwrap().content, b"item-3 v2");
    assert_eq!(harness.ledger().get(&id("item-3")), Some(&entry(5, 5)));
}

#[tokio::test]
async fn transient_errors_are_retried() {
    let harness = SyncHarness::new().with_config(
        SyncConfig::new().with_retry(
            RetryConfig::new(3)
                .with_initial_delay(Duration::from_millis(1))
                .without_jitter(),
        ),
    );
    harness.local.insert("flaky", item("x", 0));
    harness
        .remote_faults
        .fail_times(Operation::Create, "flaky", 2);

    let run = harness.run().await;

    assert!(run.report().is_clean());
    assert_eq!(harness.remote_faults.call_count(Operation::Create), 3);
    assert!(harness.remote.get("flaky").is_some());
}

#[tokio::test]
async fn retry_budget_is_bounded() {
    let harness = SyncHarness::new().with_config(
        SyncConfig::new().with_retry(
            RetryConfig::new(2)
                .with_initial_delay(Duration::from_millis(1))
                .without_jitter(),
        ),
    );
    harness.local.insert("flaky", item("x", 0));
    harness
        .remote_faults
        .fail_times(Operation::Create, "flaky", 5);

    let run = harness.run().await;

    assert_eq!(run.report().error_count, 1);
    assert_eq!(harness.remote_faults.call_count(Operation::Create), 2);
    assert!(harness.ledger().is_empty());
}

#[tokio::test]
async fn slow_item_times_out_without_failing_the_run() {
    let harness = SyncHarness::new().with_config(
        SyncConfig::new()
            .with_operation_timeout(Duration::from_millis(50))
            .with_retry(RetryConfig::no_retry()),
    );
    harness.remote.insert("slow", item("x", 0));
    harness.local.insert("fast", item("y", 0));
    harness
        .remote_faults
        .delay(Operation::Read, Duration::from_millis(400));

    let run = harness.run().await;

    assert_eq!(run.status(), RunStatus::Completed);
    let report = run.report();
    assert!(matches!(
        report.errors.get("slow").map(|e| e.as_ref()),
        Some(SyncError::Timeout { operation: "read" })
    ));
    assert!(report.created_remotely.contains("fast"));
}

#[tokio::test]
async fn listing_failure_fails_the_run() {
    let harness = SyncHarness::new();
    harness.local.insert("a", item("a", 0));
    harness.remote_faults.fail_listing();

    let run = harness.run().await;

    assert_eq!(run.status(), RunStatus::Failed);
    assert!(matches!(
        run.error().as_deref(),
        Some(SyncError::Backend { .. })
    ));
    assert!(run.finished_at().is_some());
    assert!(harness.remote.is_empty());
}

#[tokio::test]
async fn ledger_that_cannot_be_persisted_fails_the_run() {
    let harness = SyncHarness::new();
    harness.local.insert("a", item("a", 0));
    let ledger_path = harness.workspace.ledger_path();
    let mut temp = ledger_path.clone().into_os_string();
    temp.push(".tmp");
    std::fs::create_dir_all(&temp).unwrap();

    let run = harness.run().await;

    assert_eq!(run.status(), RunStatus::Failed);
    assert!(matches!(run.error().as_deref(), Some(SyncError::Io(_))));
    assert!(run.finished_at().is_some());
    assert!(!ledger_path.exists());
}

#[tokio::test]
async fn listing_failure_is_reported_over_a_persist_failure() {
    let harness = SyncHarness::new();
    harness.remote_faults.fail_listing();
    let mut temp = harness.workspace.ledger_path().into_os_string();
    temp.push(".tmp");
    std::fs::create_dir_all(&temp).unwrap();

    let run = harness.run().await;

    assert_eq!(run.status(), RunStatus::Failed);
    assert!(matches!(
        run.error().as_deref(),
        Some(SyncError::Backend { .. })
    ));
}

#[tokio::test]
async fn timed_out_write_is_not_retried() {
    let harness = SyncHarness::new().with_config(
        SyncConfig::new()
            .with_operation_timeout(Duration::from_millis(50))
            .with_retry(
                RetryConfig::new(3)
                    .with_initial_delay(Duration::from_millis(1))
                    .without_jitter(),
            ),
    );
    harness.local.insert("slow", item("x", 0));
    harness
        .remote_faults
        .delay(Operation::Create, Duration::from_millis(200));

    let run = harness.run().await;

    let report = run.report();
    assert!(matches!(
        report.errors.get("slow").map(|e| e.as_ref()),
        Some(SyncError::Timeout { operation: "create" })
    ));
    assert_eq!(harness.remote_faults.call_count(Operation::Create), 1);
    assert!(harness.ledger().is_empty());
}

#[tokio::test]
async fn corrupt_ledger_degrades_to_presence() {
    let harness = SyncHarness::new();
    harness.local.insert("a", item("same", 0));
    harness.remote.insert("a", item("same", 0));
    std::fs::write(harness.workspace.ledger_path(), "not a ledger\n").unwrap();

    let run = harness.run().await;

    assert_eq!(run.status(), RunStatus::Completed);
    assert_eq!(harness.writes(), 0);
    assert_eq!(harness.ledger().get(&id("a")), Some(&entry(0, 0)));
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn cancel_mid_run_keeps_finished_items_and_skips_the_rest() {
    let harness = SyncHarness::new().with_config(
        SyncConfig::new()
            .with_workers(1)
            .with_retry(RetryConfig::no_retry()),
    );
    for name in ["a", "b", "c", "d"] {
        harness.local.insert(name, item(name, 0));
    }
    harness
        .remote_faults
        .delay(Operation::Create, Duration::from_millis(150));

    let run = harness.new_run();
    let cancel = run.cancel_handle();
    let remote = Arc::clone(&harness.remote);
    let watcher = tokio::spawn(async move {
        while remote.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
    });

    assert_eq!(run.execute().await.unwrap(), RunStatus::Completed);
    watcher.abort();

    let report = run.report();
    assert!(report.cancelled);
    assert_eq!(report.total, 4);
    assert!(report.processed() >= 1 && report.processed() < 4);

    let ledger = harness.ledger();
    assert_eq!(ledger.get(&id("a")), Some(&entry(0, 0)));
    for finished in harness.remote.snapshot().keys() {
        assert!(ledger.contains_key(finished));
    }
    assert!(harness.remote.get("d").is_none());
    assert!(!ledger.contains_key(&id("d")));
    assert_eq!(ledger.len() as u64, report.processed());
}

// ============================================================================
// Directory item sets
// ============================================================================

#[tokio::test]
async fn directories_converge() {
    let workspace = TestWorkspace::new();
    let local = workspace.directory("local");
    let remote = workspace.directory("remote");
    local.create(&id("a.rs"), &item("fn a() {}", 1)).unwrap();
    remote.create(&id("b.py"), &item("def b(): pass", 2)).unwrap();

    let factory = Arc::new(FixedItemSetFactory::new(
        Arc::new(local.clone()) as Arc<dyn ItemSet>,
        Arc::new(remote.clone()) as Arc<dyn ItemSet>,
    ));
    let new_run = |n| {
        Run::new(
            n,
            Arc::clone(&factory) as Arc<dyn snipsync_engine::ItemSetFactory>,
            CloudService::GoogleDrive,
            workspace.ledger_path(),
            SyncConfig::new(),
        )
    };

    let first = new_run(1);
    assert_eq!(first.execute().await.unwrap(), RunStatus::Completed);
    assert!(first.report().is_clean());
    assert_eq!(local.list_ids().unwrap(), remote.list_ids().unwrap());
    assert_eq!(remote.read(&id("a.rs")).unwrap(), item("fn a() {}", 1));
    let ledger = workspace.ledger_bytes();

    let second = new_run(2);
    second.execute().await.unwrap();
    assert_eq!(second.report().changed(), 0);
    assert_eq!(workspace.ledger_bytes(), ledger);
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn one_run_converges_and_the_next_is_idle(scenario in scenario_strategy(6)) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let harness = SyncHarness::new();
            scenario.install(&harness);

            let first = harness.run().await;
            prop_assert_eq!(first.status(), RunStatus::Completed);
            prop_assert!(first.report().is_clean());

            let local = harness.local.snapshot();
            let remote = harness.remote.snapshot();
            let ledger = harness.ledger();
            prop_assert!(local.keys().eq(remote.keys()));
            prop_assert!(ledger.keys().eq(local.keys()));
            for (id, entry) in &ledger {
                prop_assert_eq!(&entry.local, &fingerprint_of(&local[id]));
                prop_assert_eq!(&entry.remote, &fingerprint_of(&remote[id]));
            }

            let ledger_bytes = harness.workspace.ledger_bytes();
            let writes = harness.writes();
            let second = harness.run().await;
            prop_assert_eq!(second.report().changed(), 0);
            prop_assert_eq!(harness.writes(), writes);
            prop_assert_eq!(harness.workspace.ledger_bytes(), ledger_bytes);
            Ok(())
        })?;
    }
}

fn fingerprint_of(item: &snipsync_protocol::Item) -> snipsync_protocol::Fingerprint {
    snipsync_protocol::Fingerprint::from_timestamp(item.modified)
}
