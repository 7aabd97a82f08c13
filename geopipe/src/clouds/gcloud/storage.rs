//! Uploading and downloading whole objects in Google Cloud Storage.
//!
//! Docs: https://cloud.google.com/storage/docs/json_api/v1/objects

use serde_derive::{Deserialize, Serialize};

use super::{percent_encode, Client, ClientError};
use crate::common::*;

/// Query for a simple media upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadQuery<'a> {
    /// The type of the upload we're performing.
    upload_type: &'static str,
    /// The name of the object we're creating or replacing.
    name: &'a str,
}

/// Query for downloading object data.
#[derive(Debug, Serialize)]
struct DownloadQuery {
    /// `media` returns the object's bytes instead of its metadata.
    alt: &'static str,
}

/// Information about an individual object, as returned by an upload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageObject {
    /// The bucket of this object.
    pub bucket: String,
    /// The name of this object.
    pub name: String,
    /// The size of this object in bytes. The API sends this as a string.
    #[serde(default)]
    pub size: Option<String>,
    /// Which generation of this object we wrote.
    #[serde(default)]
    pub generation: Option<String>,
}

impl StorageObject {
    /// Parse the `size` field, if present.
    pub fn size(&self) -> Result<Option<u64>> {
        self.size
            .as_deref()
            .map(|s| s.parse::<u64>().context("could not parse object size"))
            .transpose()
    }
}

/// Upload `data` as the object `blob`, replacing any existing object.
///
/// This is a single-request media upload, so `data` must fit in memory.
#[instrument(level = "debug", skip(client, data), fields(blob = %blob, len = data.len()))]
pub async fn upload_object(
    client: &Client,
    blob: &BlobName,
    data: Bytes,
) -> Result<StorageObject> {
    let path = format!("upload/storage/v1/b/{}/o", percent_encode(blob.bucket()));
    let url = client.url(
        &path,
        UploadQuery {
            upload_type: "media",
            name: blob.name(),
        },
    )?;
    client
        .post_bytes::<StorageObject>(&url, &mime::APPLICATION_OCTET_STREAM, data)
        .await
        .map_err(|err| Error::new(err).context(format!("could not upload {}", blob)))
}

/// Download the entire contents of `blob`.
///
/// Returns [`ClientError::NotFound`] if the object or bucket doesn't exist.
#[instrument(level = "debug", skip(client), fields(blob = %blob))]
pub async fn download_object(client: &Client, blob: &BlobName) -> Result<Bytes, ClientError> {
    let path = format!(
        "storage/v1/b/{}/o/{}",
        percent_encode(blob.bucket()),
        percent_encode(blob.name()),
    );
    let url = client.url(&path, DownloadQuery { alt: "media" })?;
    client.get_bytes(&url).await
}

#[test]
fn storage_object_parses_upload_response() {
    let json = r#"{
        "kind": "storage#object",
        "bucket": "pipeline-data",
        "name": "addresses_2021-10-22.csv",
        "size": "21",
        "generation": "1634900000000000"
    }"#;
    let object = serde_json::from_str::<StorageObject>(json).unwrap();
    assert_eq!(object.bucket, "pipeline-data");
    assert_eq!(object.size().unwrap(), Some(21));
}
