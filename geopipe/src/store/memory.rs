//! An in-process blob store, for tests and dry runs.

use std::{collections::BTreeMap, sync::Mutex};

use super::BlobNotFound;
use crate::common::*;

/// Keeps blobs in memory. Cloning shares the same underlying blobs.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    blobs: Arc<Mutex<BTreeMap<BlobName, Bytes>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all stored blobs, in sorted order.
    pub fn blob_names(&self) -> Vec<BlobName> {
        self.lock().keys().cloned().collect()
    }

    /// Look at a blob without going through the async interface.
    pub fn get(&self, blob: &BlobName) -> Option<Bytes> {
        self.lock().get(blob).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<BlobName, Bytes>> {
        // A poisoned lock only means another test thread panicked mid-insert;
        // the map itself is still consistent.
        self.blobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn upload(&self, blob: &BlobName, data: Bytes) -> Result<()> {
        trace!("storing {} bytes in memory as {}", data.len(), blob);
        self.lock().insert(blob.clone(), data);
        Ok(())
    }

    async fn download(&self, blob: &BlobName) -> Result<Bytes> {
        self.get(blob)
            .ok_or_else(|| Error::new(BlobNotFound(blob.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::is_blob_not_found;

    #[tokio::test]
    async fn uploads_overwrite_existing_blobs() {
        let store = MemoryStore::new();
        let blob = BlobName::new("bucket", "a.csv").unwrap();
        store.upload(&blob, Bytes::from_static(b"first")).await.unwrap();
        store.upload(&blob, Bytes::from_static(b"second")).await.unwrap();
        assert_eq!(store.blob_names(), vec![blob.clone()]);
        assert_eq!(store.download(&blob).await.unwrap(), "second");
    }

    #[tokio::test]
    async fn missing_blobs_are_reported_as_not_found() {
        let store = MemoryStore::new();
        let blob = BlobName::new("bucket", "missing.csv").unwrap();
        let err = store.download(&blob).await.unwrap_err();
        assert!(is_blob_not_found(&err));
    }
}
