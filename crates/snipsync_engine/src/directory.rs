//! Directory-backed item set.
//!
//! Layout:
//!
//! ```text
//! <root>/
//! ├─ <item id>              # one file per item, content only
//! └─ .<item id>.tmp         # in-flight write, renamed into place
//! ```
//!
//! The fingerprint is the file's modification time, read from metadata only.
//! Writes carry the item's own `modified` time over to the file, so the
//! fingerprint of a copied item matches the one it was copied from.

use crate::error::{SyncError, SyncResult};
use crate::item_set::ItemSet;
use chrono::{DateTime, Utc};
use snipsync_protocol::{Fingerprint, Item, ItemId};
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

const TEMP_SUFFIX: &str = ".tmp";

/// Item set storing one file per item in a directory.
#[derive(Debug, Clone)]
pub struct DirectoryItemSet {
    name: String,
    root: PathBuf,
}

impl DirectoryItemSet {
    /// Opens `root`, creating it if missing.
    pub fn open(name: impl Into<String>, root: impl Into<PathBuf>) -> SyncResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        if !root.is_dir() {
            return Err(SyncError::Configuration(format!(
                "not a directory: {}",
                root.display()
            )));
        }
        Ok(Self {
            name: name.into(),
            root,
        })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn item_path(&self, id: &ItemId) -> SyncResult<PathBuf> {
        let name = id.as_str();
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && !name.contains(['/', '\\', '\0']);
        if !valid {
            return Err(SyncError::backend_fatal(format!(
                "item id {name:?} cannot be used as a file name"
            )));
        }
        Ok(self.root.join(name))
    }

    fn temp_path(&self, id: &ItemId) -> PathBuf {
        self.root.join(format!(".{}{TEMP_SUFFIX}", id.as_str()))
    }

    fn modified_of(path: &Path, id: &ItemId) -> SyncResult<DateTime<Utc>> {
        let metadata = fs::metadata(path).map_err(|e| not_found_as_unavailable(e, id))?;
        Ok(DateTime::<Utc>::from(metadata.modified()?))
    }

    fn write_item(&self, id: &ItemId, item: &Item) -> SyncResult<()> {
        let path = self.item_path(id)?;
        let temp = self.temp_path(id);

        let result = (|| -> SyncResult<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp)?;
            file.write_all(&item.content)?;
            file.set_modified(SystemTime::from(item.modified))?;
            file.sync_all()?;
            drop(file);
            fs::rename(&temp, &path)?;
            Ok(())
        })();

        if result.is_err() {
            let _ = fs::remove_file(&temp);
        }
        result
    }
}

fn not_found_as_unavailable(error: io::Error, id: &ItemId) -> SyncError {
    if error.kind() == io::ErrorKind::NotFound {
        SyncError::ItemUnavailable(id.clone())
    } else {
        SyncError::Io(error)
    }
}

impl ItemSet for DirectoryItemSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_ids(&self) -> SyncResult<BTreeSet<ItemId>> {
        let mut ids = BTreeSet::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            ids.insert(ItemId::new(name));
        }
        Ok(ids)
    }

    fn exists(&self, id: &ItemId) -> SyncResult<bool> {
        Ok(self.item_path(id)?.is_file())
    }

    fn fingerprint_of(&self, id: &ItemId) -> SyncResult<Fingerprint> {
        let path = self.item_path(id)?;
        Ok(Fingerprint::from_timestamp(Self::modified_of(&path, id)?))
    }

    fn read(&self, id: &ItemId) -> SyncResult<Item> {
        let path = self.item_path(id)?;
        let content = fs::read(&path).map_err(|e| not_found_as_unavailable(e, id))?;
        let modified = Self::modified_of(&path, id)?;
        Ok(Item::new(content, modified))
    }

    fn create(&self, id: &ItemId, item: &Item) -> SyncResult<()> {
        self.write_item(id, item)
    }

    fn update(&self, id: &ItemId, item: &Item) -> SyncResult<()> {
        if !self.item_path(id)?.is_file() {
            return Err(SyncError::ItemUnavailable(id.clone()));
        }
        self.write_item(id, item)
    }

    fn delete(&self, id: &ItemId) -> SyncResult<()> {
        match fs::remove_file(self.item_path(id)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
