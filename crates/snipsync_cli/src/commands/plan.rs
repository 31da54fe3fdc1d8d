//! Plan command implementation.

use super::mounted::MountedFolderFactory;
use snipsync_engine::{
    ChangeLedger, ItemSetFactory, PlannedAction, Reconciler, SyncSettings, LEDGER_FILE,
    SETTINGS_FILE,
};
use snipsync_protocol::Action;
use std::path::Path;
use std::sync::Arc;

/// Runs the plan command.
///
/// Classifies every item against the ledger on disk without writing to
/// either side or to the ledger.
pub async fn run(
    data_dir: &Path,
    local_dir: &Path,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = SyncSettings::load(&data_dir.join(SETTINGS_FILE))?;
    let Some(service) = settings.service else {
        println!("synchronization skipped: no cloud service configured");
        return Ok(());
    };

    let factory = MountedFolderFactory::new(local_dir, settings.remote_dir.clone());
    let ledger = Arc::new(ChangeLedger::load(data_dir.join(LEDGER_FILE))?);
    let reconciler = Reconciler::new(
        factory.local()?,
        factory.remote(service)?,
        ledger,
        settings.to_sync_config(),
    );
    let plan = reconciler.plan().await?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        _ => {
            print_text_output(&plan);
        }
    }
    Ok(())
}

fn print_text_output(plan: &[PlannedAction]) {
    let pending: Vec<&PlannedAction> = plan.iter().filter(|p| p.action != Action::NoOp).collect();
    if pending.is_empty() {
        println!("Everything is in sync ({} items)", plan.len());
        return;
    }

    println!("{:<18} ITEM", "ACTION");
    for planned in &pending {
        println!("{:<18} {}", planned.action.to_string(), planned.id);
    }
    println!();
    println!(
        "{} of {} items need synchronization",
        pending.len(),
        plan.len()
    );
}
