// src/external/storage.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use super::{ExternalError, StorageSource};
use crate::fs::{relative_key, FileSystem, RealFileSystem};

/// Object storage laid out on a local directory tree.
///
/// Bucket `b` maps to `<root>/b`; object keys are `/`-separated paths
/// relative to the bucket directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_fs(root, Arc::new(RealFileSystem))
    }

    pub fn with_fs(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            fs,
        }
    }
}

#[async_trait]
impl StorageSource for LocalStorage {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, ExternalError> {
        let bucket_dir = self.root.join(bucket);
        if !self.fs.is_dir(&bucket_dir) {
            return Err(ExternalError::Storage(format!(
                "bucket '{bucket}' not found under {:?}",
                self.root
            )));
        }

        // Only descend where the prefix can still match.
        let descend = |dir: &Path| {
            let key = relative_key(dir, &bucket_dir);
            key.starts_with(prefix) || prefix.starts_with(&key)
        };
        let files = self
            .fs
            .walk_files(&bucket_dir, &descend)
            .map_err(|e| ExternalError::Storage(format!("{e:#}")))?;

        let mut keys: Vec<String> = files
            .iter()
            .map(|path| relative_key(path, &bucket_dir))
            .filter(|key| key.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;

    fn storage() -> LocalStorage {
        let fs = MockFileSystem::new();
        fs.add_file("data/udacity-dend/log-data/2018/11/b.json", "{}");
        fs.add_file("data/udacity-dend/log-data/2018/11/a.json", "{}");
        fs.add_file("data/udacity-dend/song-data/A/A/x.json", "{}");
        LocalStorage::with_fs("data", Arc::new(fs))
    }

    #[tokio::test]
    async fn lists_objects_under_prefix() {
        let keys = storage()
            .list_objects("udacity-dend", "log-data/2018")
            .await
            .unwrap();
        assert_eq!(
            keys,
            vec!["log-data/2018/11/a.json", "log-data/2018/11/b.json"]
        );
    }

    #[tokio::test]
    async fn empty_prefix_lists_whole_bucket() {
        let keys = storage().list_objects("udacity-dend", "").await.unwrap();
        assert_eq!(keys.len(), 3);
    }

    #[tokio::test]
    async fn missing_bucket_is_a_storage_error() {
        let err = storage().list_objects("nope", "").await.unwrap_err();
        assert!(matches!(err, ExternalError::Storage(_)));
    }

    #[tokio::test]
    async fn unmatched_prefix_yields_no_objects() {
        let keys = storage()
            .list_objects("udacity-dend", "log-data/2019")
            .await
            .unwrap();
        assert!(keys.is_empty());
    }
}
