//! Configure command implementation.

use snipsync_engine::{CloudService, SyncSettings, SETTINGS_FILE};
use snipsync_protocol::ConflictPolicy;
use std::path::{Path, PathBuf};
use tracing::info;

/// Settings overrides given on the command line.
#[derive(Debug, Default)]
pub struct Changes {
    /// Service name, `none` to disable sync.
    pub service: Option<String>,
    /// Remote folder.
    pub remote_dir: Option<PathBuf>,
    /// Worker pool size.
    pub workers: Option<usize>,
    /// Per-operation timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Conflict policy name.
    pub policy: Option<String>,
}

/// Runs the configure command.
pub fn run(data_dir: &Path, changes: Changes) -> Result<(), Box<dyn std::error::Error>> {
    let path = data_dir.join(SETTINGS_FILE);
    let mut settings = SyncSettings::load(&path)?;
    apply(&mut settings, changes)?;
    settings.save(&path)?;
    info!("Settings written to {:?}", path);

    match settings.service {
        Some(service) => println!("Cloud service: {service}"),
        None => println!("Cloud service: none (synchronization disabled)"),
    }
    if let Some(dir) = &settings.remote_dir {
        println!("Remote folder: {}", dir.display());
    }
    println!("Conflict policy: {}", settings.conflict_policy);
    Ok(())
}

fn apply(settings: &mut SyncSettings, changes: Changes) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(name) = changes.service {
        settings.service = parse_service(&name)?;
    }
    if let Some(dir) = changes.remote_dir {
        settings.remote_dir = Some(dir);
    }
    if let Some(workers) = changes.workers {
        if workers == 0 {
            return Err("workers must be at least 1".into());
        }
        settings.workers = Some(workers);
    }
    if let Some(secs) = changes.timeout_secs {
        settings.operation_timeout_secs = Some(secs);
    }
    if let Some(policy) = changes.policy {
        settings.conflict_policy = policy.parse::<ConflictPolicy>()?;
    }
    Ok(())
}

fn parse_service(name: &str) -> Result<Option<CloudService>, Box<dyn std::error::Error>> {
    match name {
        "none" => Ok(None),
        other => Ok(Some(other.parse::<CloudService>()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn service_names() {
        assert_eq!(parse_service("none").unwrap(), None);
        assert_eq!(
            parse_service("dropbox").unwrap(),
            Some(CloudService::Dropbox)
        );
        assert!(parse_service("ftp").is_err());
    }

    #[test]
    fn changes_merge_into_existing_settings() {
        let temp = tempdir().unwrap();
        run(
            temp.path(),
            Changes {
                service: Some("google-drive".into()),
                remote_dir: Some(PathBuf::from("/mnt/drive")),
                ..Changes::default()
            },
        )
        .unwrap();
        run(
            temp.path(),
            Changes {
                policy: Some("remote-wins".into()),
                workers: Some(2),
                ..Changes::default()
            },
        )
        .unwrap();

        let settings = SyncSettings::load(&temp.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(settings.service, Some(CloudService::GoogleDrive));
        assert_eq!(settings.remote_dir, Some(PathBuf::from("/mnt/drive")));
        assert_eq!(settings.workers, Some(2));
        assert_eq!(settings.conflict_policy, ConflictPolicy::RemoteWins);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut settings = SyncSettings::default();
        let zero_workers = Changes {
            workers: Some(0),
            ..Changes::default()
        };
        assert!(apply(&mut settings, zero_workers).is_err());

        let bad_policy = Changes {
            policy: Some("newest".into()),
            ..Changes::default()
        };
        assert!(apply(&mut settings, bad_policy).is_err());
    }
}
