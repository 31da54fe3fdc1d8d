//! Change fingerprints (ETags).

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, FixedOffset, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque, change-sensitive token assigned to an item by one side.
///
/// Equal fingerprints mean unchanged content. Timestamp-based backends
/// produce RFC 3339 strings, which [`Fingerprint::timestamp`] can parse for
/// recency-based conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Creates a fingerprint from an opaque tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Creates a fingerprint from a modification time (whole seconds, UTC).
    pub fn from_timestamp(modified: DateTime<Utc>) -> Self {
        Self(
            modified
                .trunc_subsecs(0)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        )
    }

    /// Returns the raw tag.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the fingerprint as an RFC 3339 timestamp.
    pub fn timestamp(&self) -> ProtocolResult<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.0).map_err(|e| ProtocolError::InvalidFingerprint {
            fingerprint: self.0.clone(),
            reason: e.to_string(),
        })
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Fingerprint {
    fn from(tag: &str) -> Self {
        Self(tag.to_owned())
    }
}

impl From<String> for Fingerprint {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}
