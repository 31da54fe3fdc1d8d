//! Error types for the sync engine.

use crate::config::CloudService;
use snipsync_protocol::{ItemId, ProtocolError};
use std::path::PathBuf;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The item disappeared from its side after it was listed.
    #[error("item {0} is no longer available")]
    ItemUnavailable(ItemId),

    /// Storage backend error.
    #[error("backend error: {message}")]
    Backend {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// An item set operation did not finish in time.
    #[error("{operation} timed out")]
    Timeout {
        /// The item set operation that timed out.
        operation: &'static str,
    },

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,

    /// The run (or item) was already started.
    #[error("synchronization already started")]
    AlreadyStarted,

    /// The run (or item) already reached a terminal state.
    #[error("synchronization already finished")]
    AlreadyFinished,

    /// A terminal transition was requested before start.
    #[error("synchronization not started")]
    NotStarted,

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Authentication with the remote backend failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// No item set implementation exists for the configured service.
    #[error("cloud service {0} is not supported by this installation")]
    UnsupportedService(CloudService),

    /// No cloud service is configured, so synchronization is skipped.
    #[error("synchronization skipped: no cloud service configured")]
    Skipped,

    /// No run with the given id was executed.
    #[error("synchronization {0} does not exist")]
    RunNotFound(u64),

    /// Another run holds the ledger lock.
    #[error("ledger {0:?} is locked by another synchronization")]
    Locked(PathBuf),

    /// A background task panicked or was aborted.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fingerprint or ledger format error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Settings file error.
    #[error("settings error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    /// Creates a retryable backend error.
    pub fn backend_retryable(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable backend error.
    pub fn backend_fatal(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Backend { retryable, .. } => *retryable,
            SyncError::Timeout { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::backend_retryable("connection reset").is_retryable());
        assert!(!SyncError::backend_fatal("quota exceeded").is_retryable());
        assert!(SyncError::Timeout { operation: "read" }.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::ItemUnavailable(ItemId::from("x")).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::Timeout {
            operation: "fingerprint",
        };
        assert_eq!(err.to_string(), "fingerprint timed out");

        let err = SyncError::UnsupportedService(CloudService::GoogleDrive);
        assert!(err.to_string().contains("google-drive"));

        let err = SyncError::RunNotFound(7);
        assert!(err.to_string().contains('7'));
    }
}
