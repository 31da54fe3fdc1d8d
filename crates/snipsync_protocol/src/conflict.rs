//! Conflict resolution.

use crate::error::ProtocolResult;
use crate::fingerprint::Fingerprint;
use crate::item::ItemId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The side whose content survives a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Winner {
    /// Keep the local version and copy it to the remote side.
    Local,
    /// Keep the remote version and copy it to the local side.
    Remote,
    /// No winner; nothing is transferred.
    Neither,
}

/// Decides which side wins when both changed the same item.
///
/// Implementations only compare the fingerprints they are given and must not
/// perform I/O.
pub trait ConflictResolver: Send + Sync {
    /// Picks a winner between the local and remote fingerprint of `id`.
    fn resolve(
        &self,
        id: &ItemId,
        local: &Fingerprint,
        remote: &Fingerprint,
    ) -> ProtocolResult<Winner>;
}

/// Built-in conflict policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// The more recently modified side wins; equal timestamps tie.
    #[default]
    #[serde(rename = "latest-modified")]
    LatestModifiedWins,
    /// The local side always wins.
    LocalWins,
    /// The remote side always wins.
    RemoteWins,
}

impl ConflictPolicy {
    /// Returns the configuration name of the policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::LatestModifiedWins => "latest-modified",
            ConflictPolicy::LocalWins => "local-wins",
            ConflictPolicy::RemoteWins => "remote-wins",
        }
    }
}

impl ConflictResolver for ConflictPolicy {
    fn resolve(
        &self,
        _id: &ItemId,
        local: &Fingerprint,
        remote: &Fingerprint,
    ) -> ProtocolResult<Winner> {
        if local == remote {
            return Ok(Winner::Neither);
        }

        let winner = match self {
            ConflictPolicy::LocalWins => Winner::Local,
            ConflictPolicy::RemoteWins => Winner::Remote,
            ConflictPolicy::LatestModifiedWins => {
                let local_time = local.timestamp()?;
                let remote_time = remote.timestamp()?;
                match local_time.cmp(&remote_time) {
                    std::cmp::Ordering::Greater => Winner::Local,
                    std::cmp::Ordering::Less => Winner::Remote,
                    std::cmp::Ordering::Equal => Winner::Neither,
                }
            }
        };
        Ok(winner)
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest-modified" => Ok(ConflictPolicy::LatestModifiedWins),
            "local-wins" => Ok(ConflictPolicy::LocalWins),
            "remote-wins" => Ok(ConflictPolicy::RemoteWins),
            other => Err(format!("unknown conflict policy: {other}")),
        }
    }
}
