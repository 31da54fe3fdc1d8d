//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while interpreting fingerprints or ledger text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A fingerprint could not be interpreted as a timestamp.
    #[error("invalid fingerprint {fingerprint:?}: {reason}")]
    InvalidFingerprint {
        /// The offending fingerprint.
        fingerprint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The ledger text is malformed.
    #[error("corrupt ledger at line {line}: {reason}")]
    CorruptLedger {
        /// 1-based line number.
        line: usize,
        /// What was wrong with the line.
        reason: String,
    },

    /// The ledger was written by an unknown format version.
    #[error("unsupported ledger header: {0:?}")]
    UnsupportedLedger(String),
}

impl ProtocolError {
    /// Creates a corrupt-ledger error.
    pub fn corrupt(line: usize, reason: impl Into<String>) -> Self {
        Self::CorruptLedger {
            line,
            reason: reason.into(),
        }
    }
}
