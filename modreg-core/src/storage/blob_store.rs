use crate::error::{RegistryError, Result};
use bytes::Bytes;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// BlobStore handles durable byte-for-byte storage of a single module
/// version's content, addressed by (module id, version number).
///
/// Blobs are written once and never updated or deleted; the Metadata Store's
/// monotonic version numbers guarantee a key is never reused.
#[derive(Debug)]
pub struct BlobStore {
    base_path: PathBuf,
}

impl BlobStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// Get the base path for the store
    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }

    /// Store the content for a module version.
    ///
    /// Writes go to a temporary file first, then rename for atomicity: a
    /// failed write leaves no partial blob at the final path, only a version
    /// number with no backing content until the upload is retried.
    pub async fn write(&self, id: &str, version: u32, data: Bytes) -> Result<()> {
        let blob_path = self.blob_path(id, version);
        // Not with_extension: module ids may contain dots
        let temp_path = self.base_path.join(format!("{}_{}.tmp", id, version));

        let result: std::io::Result<()> = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp_path, &blob_path).await
        }
        .await;

        result.map_err(|source| RegistryError::BlobWrite {
            id: id.to_string(),
            version,
            source,
        })?;

        tracing::debug!("Stored blob for module {} version {}", id, version);
        Ok(())
    }

    /// Retrieve the exact bytes stored for a module version.
    pub async fn read(&self, id: &str, version: u32) -> Result<Bytes> {
        let blob_path = self.blob_path(id, version);

        let data = fs::read(&blob_path)
            .await
            .map_err(|source| RegistryError::BlobRead {
                id: id.to_string(),
                version,
                source,
            })?;
        Ok(Bytes::from(data))
    }

    /// Check if a blob exists
    pub fn exists(&self, id: &str, version: u32) -> bool {
        self.blob_path(id, version).exists()
    }

    // One file per (module id, version), no framing or checksum.
    fn blob_path(&self, id: &str, version: u32) -> PathBuf {
        self.base_path.join(format!("{}_{}", id, version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blob_store_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(temp_dir.path().to_path_buf());

        let data = Bytes::from("someblobdata");
        store.write("proxy", 1, data.clone()).await.unwrap();

        let retrieved = store.read("proxy", 1).await.unwrap();
        assert_eq!(retrieved, data);
        assert!(store.exists("proxy", 1));
    }

    #[tokio::test]
    async fn test_blob_store_overwrite_keeps_latest_bytes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(temp_dir.path().to_path_buf());

        store.write("proxy", 1, Bytes::from("first")).await.unwrap();
        store.write("proxy", 2, Bytes::from("second")).await.unwrap();

        assert_eq!(store.read("proxy", 1).await.unwrap(), "first");
        assert_eq!(store.read("proxy", 2).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_blob_store_missing_version() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(temp_dir.path().to_path_buf());

        let err = store.read("proxy", 7).await.unwrap_err();
        match err {
            RegistryError::BlobRead { id, version, .. } => {
                assert_eq!(id, "proxy");
                assert_eq!(version, 7);
            }
            other => panic!("expected BlobRead, got {:?}", other),
        }
        assert!(!store.exists("proxy", 7));
    }

    #[tokio::test]
    async fn test_blob_store_failed_write_leaves_no_partial_blob() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("does-not-exist");
        let store = BlobStore::new(missing);

        let err = store.write("proxy", 1, Bytes::from("data")).await.unwrap_err();
        assert!(matches!(err, RegistryError::BlobWrite { .. }));
        assert!(!store.exists("proxy", 1));
    }
}
