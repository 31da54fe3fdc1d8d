//! Configuration for the sync engine.
//!
//! [`SyncConfig`] tunes one run (worker pool, timeouts, retries, conflict
//! policy). [`SyncSettings`] is the user-facing settings file that selects
//! the cloud service and overrides the tuning defaults.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use snipsync_protocol::ConflictPolicy;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Name of the settings file inside the data directory.
pub const SETTINGS_FILE: &str = "sync.json";

/// Name of the ledger file inside the data directory.
pub const LEDGER_FILE: &str = "ledger.csv";

/// Cloud services a remote item set can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloudService {
    /// Dropbox.
    Dropbox,
    /// Google Drive.
    GoogleDrive,
}

impl CloudService {
    /// Returns the configuration name of the service.
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudService::Dropbox => "dropbox",
            CloudService::GoogleDrive => "google-drive",
        }
    }
}

impl fmt::Display for CloudService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloudService {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dropbox" => Ok(CloudService::Dropbox),
            "google-drive" => Ok(CloudService::GoogleDrive),
            other => Err(SyncError::Configuration(format!(
                "unknown cloud service: {other}"
            ))),
        }
    }
}

/// Configuration for one reconciliation run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Number of items processed concurrently.
    pub workers: usize,
    /// Timeout applied to every single item set operation.
    pub operation_timeout: Duration,
    /// Retry configuration for retryable item set errors.
    pub retry: RetryConfig,
    /// Policy used when both sides changed the same item.
    pub conflict_policy: ConflictPolicy,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            workers: 4,
            operation_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            conflict_policy: ConflictPolicy::default(),
        }
    }

    /// Sets the worker pool size (at least one).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the per-operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the conflict policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior of a single item set operation.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (1 means no retry).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a retry configuration with the given attempt budget.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Disables jitter.
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Delay to wait before `attempt` (0-indexed; the first attempt never waits).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = (self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            Duration::from_secs_f64(secs + secs * 0.25 * jitter_fraction())
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Pseudo-random fraction in `[0, 1)` taken from the clock's sub-second part.
fn jitter_fraction() -> f64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

/// Persisted user settings (`sync.json`).
///
/// A missing file yields the default settings, in which no cloud service is
/// configured and synchronization is skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    /// Active cloud service, `None` when sync is disabled.
    pub service: Option<CloudService>,
    /// Folder the provider's desktop client keeps in sync.
    pub remote_dir: Option<PathBuf>,
    /// Worker pool size override.
    pub workers: Option<usize>,
    /// Per-operation timeout override, in seconds.
    pub operation_timeout_secs: Option<u64>,
    /// Retry attempt budget override.
    pub max_attempts: Option<u32>,
    /// Conflict policy.
    pub conflict_policy: ConflictPolicy,
}

impl SyncSettings {
    /// Loads settings from `path`; a missing file gives the defaults.
    pub fn load(path: &Path) -> SyncResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                SyncError::Configuration(format!("invalid settings file {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes settings to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> SyncResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Returns true if a cloud service is configured.
    pub fn is_service_configured(&self) -> bool {
        self.service.is_some()
    }

    /// Builds the engine configuration from the overrides.
    pub fn to_sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig::new().with_conflict_policy(self.conflict_policy);
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(secs) = self.operation_timeout_secs {
            config = config.with_operation_timeout(Duration::from_secs(secs));
        }
        if let Some(attempts) = self.max_attempts {
            config = config.with_retry(RetryConfig::new(attempts));
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_workers(0)
            .with_operation_timeout(Duration::from_secs(5))
            .with_retry(RetryConfig::no_retry())
            .with_conflict_policy(ConflictPolicy::RemoteWins);

        assert_eq!(config.workers, 1);
        assert_eq!(config.operation_timeout, Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.conflict_policy, ConflictPolicy::RemoteWins);
    }

    #[test]
    fn retry_delay_grows_and_is_capped() {
        let config = RetryConfig::new(6)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(300))
            .without_jitter();

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(5), Duration::from_millis(300));
    }

    #[test]
    fn retry_jitter_stays_within_quarter() {
        let config = RetryConfig::new(3).with_initial_delay(Duration::from_millis(100));
        let delay = config.delay_for_attempt(1);
        assert!(delay >= Duration::from_millis(100));
        assert!(delay <= Duration::from_millis(125));
    }

    #[test]
    fn cloud_service_names() {
        assert_eq!("dropbox".parse::<CloudService>().unwrap(), CloudService::Dropbox);
        assert_eq!(
            "google-drive".parse::<CloudService>().unwrap(),
            CloudService::GoogleDrive
        );
        assert!("onedrive".parse::<CloudService>().is_err());
    }

    #[test]
    fn missing_settings_file_means_skip() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SyncSettings::load(&dir.path().join(SETTINGS_FILE)).unwrap();
        assert!(!settings.is_service_configured());
    }

    #[test]
    fn settings_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);
        let settings = SyncSettings {
            service: Some(CloudService::GoogleDrive),
            remote_dir: Some(PathBuf::from("/mnt/drive/snippets")),
            workers: Some(8),
            operation_timeout_secs: Some(12),
            max_attempts: Some(1),
            conflict_policy: ConflictPolicy::LocalWins,
        };
        settings.save(&path).unwrap();

        let loaded = SyncSettings::load(&path).unwrap();
        assert_eq!(loaded, settings);

        let config = loaded.to_sync_config();
        assert_eq!(config.workers, 8);
        assert_eq!(config.operation_timeout, Duration::from_secs(12));
        assert_eq!(config.retry.max_attempts, 1);
        assert_eq!(config.conflict_policy, ConflictPolicy::LocalWins);
    }

    #[test]
    fn settings_parse_service_names() {
        let settings: SyncSettings =
            serde_json::from_str(r#"{ "service": "dropbox", "conflict_policy": "remote-wins" }"#)
                .unwrap();
        assert_eq!(settings.service, Some(CloudService::Dropbox));
        assert_eq!(settings.conflict_policy, ConflictPolicy::RemoteWins);
    }

    #[test]
    fn malformed_settings_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "{ service = dropbox }").unwrap();
        assert!(matches!(
            SyncSettings::load(&path),
            Err(SyncError::Configuration(_))
        ));
    }
}
