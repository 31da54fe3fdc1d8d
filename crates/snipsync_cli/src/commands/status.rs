//! Status command implementation.

use serde::Serialize;
use snipsync_engine::{ChangeLedger, SyncSettings, LEDGER_FILE, SETTINGS_FILE};
use snipsync_protocol::{ItemId, LedgerEntry};
use std::collections::BTreeMap;
use std::path::Path;

/// Settings and ledger summary.
#[derive(Debug, Serialize)]
pub struct StatusResult {
    /// Effective settings.
    pub settings: SyncSettings,
    /// Ledger file path.
    pub ledger_path: String,
    /// Number of ledger entries.
    pub entry_count: usize,
    /// Ledger entries by item id.
    pub entries: BTreeMap<ItemId, LedgerEntry>,
}

/// Runs the status command.
pub fn run(data_dir: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let settings = SyncSettings::load(&data_dir.join(SETTINGS_FILE))?;
    let ledger_path = data_dir.join(LEDGER_FILE);
    let entries = ChangeLedger::load(&ledger_path)?.snapshot();

    let result = StatusResult {
        settings,
        ledger_path: ledger_path.display().to_string(),
        entry_count: entries.len(),
        entries,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }
    Ok(())
}

fn print_text_output(result: &StatusResult) {
    let settings = &result.settings;
    match settings.service {
        Some(service) => println!("Cloud service:   {service}"),
        None => println!("Cloud service:   none (synchronization disabled)"),
    }
    if let Some(dir) = &settings.remote_dir {
        println!("Remote folder:   {}", dir.display());
    }
    println!("Conflict policy: {}", settings.conflict_policy);
    println!("Ledger:          {}", result.ledger_path);
    println!("Entries:         {}", result.entry_count);

    if result.entries.is_empty() {
        return;
    }
    println!();
    println!("{:<32} {:<22} REMOTE", "ITEM", "LOCAL");
    for (id, entry) in &result.entries {
        println!("{:<32} {:<22} {}", id.as_str(), entry.local.as_str(), entry.remote);
    }
}
