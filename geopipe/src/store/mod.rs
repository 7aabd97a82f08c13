//! Durable object stores, where pipeline stages leave blobs for each other.

use std::{error, fmt};

use crate::common::*;

mod gcs;
mod memory;

pub use self::gcs::GcsStore;
pub use self::memory::MemoryStore;

/// A key-value store of named blobs.
///
/// Uploading to an existing name replaces the old contents.
#[async_trait]
pub trait BlobStore: fmt::Debug + Send + Sync {
    /// Store `data` as `blob`, overwriting anything already there.
    async fn upload(&self, blob: &BlobName, data: Bytes) -> Result<()>;

    /// Fetch the entire contents of `blob`.
    ///
    /// If the blob does not exist, the returned error can be downcast to
    /// [`BlobNotFound`].
    async fn download(&self, blob: &BlobName) -> Result<Bytes>;
}

/// The requested blob does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobNotFound(pub BlobName);

impl fmt::Display for BlobNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob {} does not exist", self.0)
    }
}

impl error::Error for BlobNotFound {}

/// Returns `true` if `err` was caused by a missing blob.
pub fn is_blob_not_found(err: &Error) -> bool {
    err.chain().any(|cause| cause.is::<BlobNotFound>())
}
