//! Items and their identifiers.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Stable identifier of an item, unique within one item set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Creates an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the identifier, returning the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An opaque payload copied between the two sides of a sync.
///
/// The content is never interpreted. `modified` is the item's own
/// last-modified time, truncated to whole seconds; backends that derive
/// their fingerprint from a timestamp carry it over on write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Raw content.
    pub content: Vec<u8>,
    /// Last modification time (UTC, whole seconds).
    pub modified: DateTime<Utc>,
}

impl Item {
    /// Creates an item, truncating `modified` to whole seconds.
    pub fn new(content: impl Into<Vec<u8>>, modified: DateTime<Utc>) -> Self {
        Self {
            content: content.into(),
            modified: modified.trunc_subsecs(0),
        }
    }

    /// Returns the content length in bytes.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Returns true if the content is empty.
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
