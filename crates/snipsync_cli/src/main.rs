//! snipsync CLI
//!
//! Command-line synchronization of a snippet folder with a cloud service.
//!
//! # Commands
//!
//! - `configure` - Select the cloud service and tune the engine
//! - `sync` - Run one synchronization pass
//! - `plan` - Show what a pass would do without changing anything
//! - `status` - Display settings and the change ledger

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Snippet synchronization tools.
#[derive(Parser)]
#[command(name = "snipsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Data directory holding sync.json and the ledger
    #[arg(global = true, short, long, default_value = ".snipsync")]
    data_dir: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Select the cloud service and tune the engine
    Configure {
        /// Cloud service (dropbox, google-drive, none)
        #[arg(short, long)]
        service: Option<String>,

        /// Folder kept in sync by the service's desktop client
        #[arg(short, long)]
        remote_dir: Option<PathBuf>,

        /// Number of items processed concurrently
        #[arg(short, long)]
        workers: Option<usize>,

        /// Timeout per item operation, in seconds
        #[arg(short, long)]
        timeout_secs: Option<u64>,

        /// Conflict policy (latest-modified, local-wins, remote-wins)
        #[arg(short, long)]
        policy: Option<String>,
    },

    /// Run one synchronization pass
    Sync {
        /// Local snippet folder (default: <data-dir>/snippets)
        #[arg(short, long)]
        local: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the actions a pass would take
    Plan {
        /// Local snippet folder (default: <data-dir>/snippets)
        #[arg(short, long)]
        local: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Display settings and ledger contents
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let data_dir = cli.data_dir;
    match cli.command {
        Commands::Configure {
            service,
            remote_dir,
            workers,
            timeout_secs,
            policy,
        } => {
            let changes = commands::configure::Changes {
                service,
                remote_dir,
                workers,
                timeout_secs,
                policy,
            };
            commands::configure::run(&data_dir, changes)?;
        }
        Commands::Sync { local, format } => {
            let local = local.unwrap_or_else(|| commands::default_local_dir(&data_dir));
            commands::sync::run(&data_dir, &local, &format).await?;
        }
        Commands::Plan { local, format } => {
            let local = local.unwrap_or_else(|| commands::default_local_dir(&data_dir));
            commands::plan::run(&data_dir, &local, &format).await?;
        }
        Commands::Status { format } => {
            commands::status::run(&data_dir, &format)?;
        }
        Commands::Version => {
            println!("snipsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("ledger format: {}", snipsync_protocol::LEDGER_HEADER);
        }
    }

    Ok(())
}
