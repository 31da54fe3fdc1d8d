//! Start/complete/fail state machine shared by runs and items.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle status of a run or of a single item within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    /// Created, not started yet.
    Pending,
    /// Started, not finished yet.
    InProgress,
    /// Finished (possibly with per-item errors).
    Completed,
    /// Aborted by a run-fatal error.
    Failed,
}

impl RunStatus {
    /// Returns true for the terminal states.
    pub fn is_done(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Pending => "pending",
            RunStatus::InProgress => "in-progress",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Status plus timing of one run or item.
///
/// Transitions are `Pending -> InProgress -> {Completed, Failed}`; anything
/// else is rejected with a typed error and leaves the state untouched.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    status: RunStatus,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    error: Option<Arc<SyncError>>,
}

impl Lifecycle {
    /// Creates a pending lifecycle.
    pub fn new() -> Self {
        Self {
            status: RunStatus::Pending,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Current status.
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Time of the `start` transition.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Time of the terminal transition.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Error recorded by `fail`.
    pub fn error(&self) -> Option<Arc<SyncError>> {
        self.error.clone()
    }

    /// Time between start and finish, zero until finished.
    pub fn duration(&self) -> Duration {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => (end - start).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        }
    }

    /// `Pending -> InProgress`.
    pub fn start(&mut self) -> SyncResult<()> {
        match self.status {
            RunStatus::Pending => {
                self.status = RunStatus::InProgress;
                self.started_at = Some(Utc::now());
                Ok(())
            }
            RunStatus::InProgress => Err(SyncError::AlreadyStarted),
            RunStatus::Completed | RunStatus::Failed => Err(SyncError::AlreadyFinished),
        }
    }

    /// `InProgress -> Completed`.
    pub fn complete(&mut self) -> SyncResult<()> {
        self.finish(RunStatus::Completed)
    }

    /// `InProgress -> Failed`, keeping the cause.
    pub fn fail(&mut self, error: impl Into<Arc<SyncError>>) -> SyncResult<()> {
        self.finish(RunStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    fn finish(&mut self, status: RunStatus) -> SyncResult<()> {
        match self.status {
            RunStatus::InProgress => {
                self.status = status;
                self.finished_at = Some(Utc::now());
                Ok(())
            }
            RunStatus::Pending => Err(SyncError::NotStarted),
            RunStatus::Completed | RunStatus::Failed => Err(SyncError::AlreadyFinished),
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path() {
        let mut lc = Lifecycle::new();
        assert_eq!(lc.status(), RunStatus::Pending);
        assert!(lc.started_at().is_none());

        lc.start().unwrap();
        assert_eq!(lc.status(), RunStatus::InProgress);
        assert!(lc.started_at().is_some());
        assert_eq!(lc.duration(), Duration::ZERO);

        lc.complete().unwrap();
        assert_eq!(lc.status(), RunStatus::Completed);
        assert!(lc.status().is_done());
        assert!(lc.finished_at() >= lc.started_at());
        assert!(lc.error().is_none());
    }

    #[test]
    fn fail_keeps_error() {
        let mut lc = Lifecycle::new();
        lc.start().unwrap();
        lc.fail(SyncError::AuthenticationFailed("token expired".into()))
            .unwrap();
        assert_eq!(lc.status(), RunStatus::Failed);
        assert!(matches!(
            lc.error().as_deref(),
            Some(SyncError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let mut lc = Lifecycle::new();
        assert!(matches!(lc.complete(), Err(SyncError::NotStarted)));
        assert!(matches!(lc.fail(SyncError::Cancelled), Err(SyncError::NotStarted)));

        lc.start().unwrap();
        assert!(matches!(lc.start(), Err(SyncError::AlreadyStarted)));

        lc.complete().unwrap();
        assert!(matches!(lc.start(), Err(SyncError::AlreadyFinished)));
        assert!(matches!(lc.complete(), Err(SyncError::AlreadyFinished)));
        assert!(matches!(
            lc.fail(SyncError::Cancelled),
            Err(SyncError::AlreadyFinished)
        ));
        assert_eq!(lc.status(), RunStatus::Completed);
        assert!(lc.error().is_none());
    }

    #[test]
    fn status_names() {
        assert_eq!(RunStatus::InProgress.to_string(), "in-progress");
        assert!(!RunStatus::Pending.is_done());
        assert!(RunStatus::Failed.is_done());
    }
}
