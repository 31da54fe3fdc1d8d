//! Sync command implementation.

use super::mounted::MountedFolderFactory;
use serde::Serialize;
use snipsync_engine::{
    Run, RunStatus, SyncError, SyncProcess, SyncReport, SyncSettings, LEDGER_FILE, SETTINGS_FILE,
};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Result of one sync command.
#[derive(Debug, Serialize)]
pub struct SyncOutput {
    /// Run id.
    pub run: u64,
    /// Terminal status.
    pub status: RunStatus,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    /// Final progress percentage.
    pub progress: u8,
    /// Run-fatal error, if the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-item report.
    pub report: SyncReport,
}

impl SyncOutput {
    fn from_run(run: &Run) -> Self {
        Self {
            run: run.id(),
            status: run.status(),
            duration_ms: u64::try_from(run.duration().as_millis()).unwrap_or(u64::MAX),
            progress: run.progress_percent(),
            error: run.error().map(|e| e.to_string()),
            report: run.report(),
        }
    }
}

/// Runs the sync command.
pub async fn run(
    data_dir: &Path,
    local_dir: &Path,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let process = open_process(data_dir, local_dir)?;

    let run = match process.create_run() {
        Err(SyncError::Skipped) => {
            println!("synchronization skipped: no cloud service configured");
            return Ok(());
        }
        other => other?,
    };

    let cancel = run.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing items in flight");
            cancel.cancel();
        }
    });
    let status = run.execute().await;
    interrupt.abort();
    status?;

    let output = SyncOutput::from_run(&run);
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            print_text_output(&output);
        }
    }

    match run.error() {
        Some(e) => Err(format!("synchronization failed: {e}").into()),
        None => Ok(()),
    }
}

pub(crate) fn open_process(
    data_dir: &Path,
    local_dir: &Path,
) -> Result<SyncProcess, Box<dyn std::error::Error>> {
    let settings = SyncSettings::load(&data_dir.join(SETTINGS_FILE))?;
    let factory = MountedFolderFactory::new(local_dir, settings.remote_dir.clone());
    Ok(SyncProcess::new(
        settings,
        Arc::new(factory),
        data_dir.join(LEDGER_FILE),
    ))
}

fn print_text_output(output: &SyncOutput) {
    let report = &output.report;
    println!(
        "Synchronization #{} {} in {} ms",
        output.run, output.status, output.duration_ms
    );
    if let Some(error) = &output.error {
        println!("  error: {error}");
        return;
    }
    if report.cancelled {
        println!("  cancelled after {} of {} items", report.processed(), report.total);
    }
    println!("  items:            {}", report.total);
    println!("  created locally:  {}", report.created_locally.len());
    println!("  updated locally:  {}", report.updated_locally.len());
    println!("  deleted locally:  {}", report.deleted_locally.len());
    println!("  created remotely: {}", report.created_remotely.len());
    println!("  updated remotely: {}", report.updated_remotely.len());
    println!("  deleted remotely: {}", report.deleted_remotely.len());
    println!("  succeeded:        {}", report.success_count);
    println!("  failed:           {}", report.error_count);
    for (id, error) in &report.errors {
        println!("    {id}: {error}");
    }
}
