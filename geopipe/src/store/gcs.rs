//! Google Cloud Storage as a [`BlobStore`].

use std::{path::Path, time::Duration};

use super::BlobNotFound;
use crate::clouds::gcloud::{
    storage::{download_object, upload_object},
    Authenticator, Client, ClientError, DEFAULT_STORAGE_ENDPOINT,
};
use crate::common::*;

/// A blob store backed by Google Cloud Storage.
#[derive(Clone, Debug)]
pub struct GcsStore {
    client: Client,
}

impl GcsStore {
    /// Connect to the real Google Cloud Storage, authenticating with the
    /// service account key at `credentials` or application default
    /// credentials.
    pub async fn new(credentials: Option<&Path>, timeout: Option<Duration>) -> Result<Self> {
        let endpoint = DEFAULT_STORAGE_ENDPOINT
            .parse::<Url>()
            .context("could not parse storage endpoint")?;
        let authenticator = Authenticator::new(credentials).await?;
        Self::with_endpoint(endpoint, authenticator, timeout)
    }

    /// Talk to a storage API at `endpoint`, such as a local emulator.
    pub fn with_endpoint(
        endpoint: Url,
        authenticator: Authenticator,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        debug!("using Google Cloud Storage at {}", endpoint);
        let client = Client::new(endpoint, authenticator, timeout)?;
        Ok(GcsStore { client })
    }
}

#[async_trait]
impl BlobStore for GcsStore {
    async fn upload(&self, blob: &BlobName, data: Bytes) -> Result<()> {
        let len = data.len();
        let object = upload_object(&self.client, blob, data).await?;
        match object.size()? {
            Some(size) if size != len as u64 => Err(format_err!(
                "uploaded {} bytes to {}, but Cloud Storage reports {}",
                len,
                blob,
                size,
            )),
            _ => {
                debug!(
                    "uploaded {} bytes to {} (generation {})",
                    len,
                    blob,
                    object.generation.as_deref().unwrap_or("unknown"),
                );
                Ok(())
            }
        }
    }

    async fn download(&self, blob: &BlobName) -> Result<Bytes> {
        match download_object(&self.client, blob).await {
            Ok(data) => {
                debug!("downloaded {} bytes from {}", data.len(), blob);
                Ok(data)
            }
            Err(ClientError::NotFound { .. }) => {
                Err(Error::new(BlobNotFound(blob.clone())))
            }
            Err(err) => {
                Err(Error::new(err).context(format!("could not download {}", blob)))
            }
        }
    }
}
