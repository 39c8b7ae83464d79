//! Audit archive of exported source records
//! Uses the Apache Arrow object_store crate

use crate::models::SourceRecord;
use object_store::{ObjectStore, local::LocalFileSystem, memory::InMemory, path::Path as StoragePath};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to prepare archive directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archived document is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Metadata returned after a record is archived
#[derive(Debug, Clone)]
pub struct ArchiveReceipt {
    pub key: String,
    pub etag: Option<String>,
    pub size: usize,
}

/// Stores every exported record under `exports/<contract>/<token_id>.json`
#[derive(Clone)]
pub struct ExportArchive {
    store: Arc<dyn ObjectStore>,
}

impl ExportArchive {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemory::new()))
    }

    /// Archive rooted at a local directory, created if missing
    pub fn local(root: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(root.as_ref())?;
        Ok(Self::new(Arc::new(LocalFileSystem::new_with_prefix(root)?)))
    }

    /// Object path for a token; each segment is escaped on its own
    pub fn path_for(contract: &str, token_id: &str) -> StoragePath {
        let file = format!("{}.json", token_id);
        StoragePath::from_iter(["exports", contract, file.as_str()])
    }

    pub async fn archive(&self, record: &SourceRecord) -> Result<ArchiveReceipt> {
        let path = Self::path_for(&record.source_contract, &record.source_token_id);
        let data = serde_json::to_vec_pretty(record)?;
        let size = data.len();

        let put_result = self.store.put(&path, data.into()).await?;

        tracing::debug!(key = %path, size, "Archived export");

        Ok(ArchiveReceipt {
            key: path.to_string(),
            etag: put_result.e_tag,
            size,
        })
    }

    pub async fn load(&self, contract: &str, token_id: &str) -> Result<Option<SourceRecord>> {
        let path = Self::path_for(contract, token_id);

        match self.store.get(&path).await {
            Ok(result) => {
                let bytes = result.bytes().await?;
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::source_record;
    use tempfile::TempDir;

    #[test]
    fn test_path_layout() {
        assert_eq!(
            ExportArchive::path_for("sei1contract", "42").to_string(),
            "exports/sei1contract/42.json"
        );
        // separators inside a token id stay inside one segment
        let nested = ExportArchive::path_for("sei1c", "a/b");
        assert_eq!(nested.parts().count(), 3);
    }

    #[tokio::test]
    async fn test_archive_and_load_in_memory() {
        let archive = ExportArchive::in_memory();
        let record = source_record("sei1c", "3");

        let receipt = archive.archive(&record).await.unwrap();
        assert_eq!(receipt.key, "exports/sei1c/3.json");
        assert!(receipt.size > 0);

        let loaded = archive.load("sei1c", "3").await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(loaded.verify_hash());
        assert!(archive.load("sei1c", "4").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_archive_writes_files() {
        let temp_dir = TempDir::new().unwrap();
        let archive = ExportArchive::local(temp_dir.path().join("archive")).unwrap();

        archive.archive(&source_record("sei1c", "9")).await.unwrap();

        let file = temp_dir.path().join("archive/exports/sei1c/9.json");
        assert!(file.exists());
    }
}
