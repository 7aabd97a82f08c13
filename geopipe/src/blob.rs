//! Names of blobs in an object store.

use percent_encoding::percent_decode_str;
use std::{fmt, str::FromStr};

use crate::common::*;

/// A blob in an object store, identified by bucket and object name.
///
/// Blobs are overwritten (not versioned) when uploaded again under the same
/// name.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BlobName {
    bucket: String,
    name: String,
}

impl BlobName {
    /// Create a new blob name. Neither part may be empty.
    pub fn new<B, N>(bucket: B, name: N) -> Result<Self>
    where
        B: Into<String>,
        N: Into<String>,
    {
        let bucket = bucket.into();
        let name = name.into();
        if bucket.is_empty() {
            return Err(format_err!("bucket name for {:?} may not be empty", name));
        }
        if name.is_empty() || name.ends_with('/') {
            return Err(format_err!(
                "blob name {:?} in bucket {} must name an object",
                name,
                bucket
            ));
        }
        Ok(Self { bucket, name })
    }

    /// The bucket containing this blob.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The object name of this blob, which typically looks like a path without
    /// the leading slash.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The last path component of the object name.
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

impl fmt::Display for BlobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gs://{}/{}", self.bucket, self.name)
    }
}

impl FromStr for BlobName {
    type Err = Error;

    /// Split a `gs://` URL into a bucket and an object name.
    fn from_str(s: &str) -> Result<Self> {
        let url = s
            .parse::<Url>()
            .with_context(|| format!("could not parse blob URL {:?}", s))?;
        if url.scheme() != "gs" {
            return Err(format_err!("expected a gs:// URL, found {}", url));
        }
        let bucket = url
            .host_str()
            .ok_or_else(|| format_err!("could not get bucket from {}", url))?;
        let object = percent_decode_str(url.path().trim_start_matches('/'))
            .decode_utf8()
            .with_context(|| format!("could not decode object name in {}", url))?;
        Self::new(bucket, object)
    }
}

#[test]
fn parses_and_displays_gs_urls() {
    let blob = "gs://pipeline-data/addresses_2021-10-22.csv"
        .parse::<BlobName>()
        .unwrap();
    assert_eq!(blob.bucket(), "pipeline-data");
    assert_eq!(blob.name(), "addresses_2021-10-22.csv");
    assert_eq!(
        blob.to_string(),
        "gs://pipeline-data/addresses_2021-10-22.csv"
    );
}

#[test]
fn nested_names_keep_their_directories() {
    let blob = "gs://b/daily/out.csv".parse::<BlobName>().unwrap();
    assert_eq!(blob.name(), "daily/out.csv");
    assert_eq!(blob.file_name(), "out.csv");
}

#[test]
fn escaped_object_names_are_decoded() {
    let blob = "gs://b/a%20b.csv".parse::<BlobName>().unwrap();
    assert_eq!(blob.name(), "a b.csv");
    let blob = "gs://b/daily%2Fout.csv".parse::<BlobName>().unwrap();
    assert_eq!(blob.name(), "daily/out.csv");
}

#[test]
fn rejects_non_object_names() {
    assert!("s3://bucket/file.csv".parse::<BlobName>().is_err());
    assert!("gs://bucket/".parse::<BlobName>().is_err());
    assert!("gs://bucket/dir/".parse::<BlobName>().is_err());
    assert!(BlobName::new("", "file.csv").is_err());
}
