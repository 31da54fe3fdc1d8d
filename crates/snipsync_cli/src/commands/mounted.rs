//! Item sets backed by the cloud provider's desktop-synced folder.

use snipsync_engine::{
    CloudService, DirectoryItemSet, ItemSet, ItemSetFactory, SyncError, SyncResult,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Builds the local snippet folder and the folder a provider client mirrors.
///
/// The remote folder must already exist. An unmounted folder would otherwise
/// look like a remote side where every item was deleted.
#[derive(Debug, Clone)]
pub struct MountedFolderFactory {
    local_dir: PathBuf,
    remote_dir: Option<PathBuf>,
}

impl MountedFolderFactory {
    /// Creates a factory.
    pub fn new(local_dir: impl Into<PathBuf>, remote_dir: Option<PathBuf>) -> Self {
        Self {
            local_dir: local_dir.into(),
            remote_dir,
        }
    }
}

impl ItemSetFactory for MountedFolderFactory {
    fn local(&self) -> SyncResult<Arc<dyn ItemSet>> {
        Ok(Arc::new(DirectoryItemSet::open("local", &self.local_dir)?))
    }

    fn remote(&self, service: CloudService) -> SyncResult<Arc<dyn ItemSet>> {
        let dir = self.remote_dir.as_ref().ok_or_else(|| {
            SyncError::Configuration(format!("no remote_dir configured for {service}"))
        })?;
        if !dir.is_dir() {
            return Err(SyncError::Configuration(format!(
                "{service} folder {} is not available",
                dir.display()
            )));
        }
        Ok(Arc::new(DirectoryItemSet::open(service.as_str(), dir)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn local_folder_is_created() {
        let temp = tempdir().unwrap();
        let factory = MountedFolderFactory::new(temp.path().join("snippets"), None);
        assert_eq!(factory.local().unwrap().name(), "local");
        assert!(temp.path().join("snippets").is_dir());
    }

    #[test]
    fn remote_requires_configured_folder() {
        let temp = tempdir().unwrap();
        let factory = MountedFolderFactory::new(temp.path().join("snippets"), None);
        assert!(matches!(
            factory.remote(CloudService::Dropbox),
            Err(SyncError::Configuration(_))
        ));
    }

    #[test]
    fn remote_requires_existing_folder() {
        let temp = tempdir().unwrap();
        let missing = temp.path().join("Dropbox").join("snippets");
        let factory = MountedFolderFactory::new(temp.path().join("snippets"), Some(missing));
        assert!(matches!(
            factory.remote(CloudService::Dropbox),
            Err(SyncError::Configuration(_))
        ));
    }

    #[test]
    fn remote_is_named_after_service() {
        let temp = tempdir().unwrap();
        let factory = MountedFolderFactory::new(
            temp.path().join("snippets"),
            Some(temp.path().to_path_buf()),
        );
        let remote = factory.remote(CloudService::GoogleDrive).unwrap();
        assert_eq!(remote.name(), "google-drive");
    }
}
