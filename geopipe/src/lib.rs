//! A small library for running a daily address-geocoding pipeline.
//!
//! The pipeline has three stages, which communicate only through named blobs
//! in an object store:
//!
//! 1. Download the raw address list over HTTP and store it.
//! 2. Send the stored address list to the Census batch geocoder and store the
//!    response.
//! 3. Load the geocoded results into a database table, replacing whatever was
//!    there.
//!
//! The interesting building blocks are the three operations in [`ops`], the
//! [`BlobStore`] and [`Database`] traits, and the [`Stage`] trait which the
//! CLI uses as a scheduler adapter.

#![warn(rust_2018_idioms, unused_extern_crates, clippy::all)]

pub mod blob;
pub mod clouds;
pub mod config;
pub mod database;
pub mod delimited;
pub mod http;
pub mod ops;
pub mod stages;
pub mod store;
pub mod temporary;
pub(crate) mod tls;
pub mod url_with_hidden_password;

/// Standard error type for this library.
pub use anyhow::Error;

/// Standard result type for this library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub use blob::BlobName;
pub use config::{Configuration, PipelineConfig};
pub use database::{Database, MemoryDatabase, PostgresDatabase, TableName};
pub use delimited::{ColumnNames, ParsedTable};
pub use http::{FetchRequest, Fetcher, StatusPolicy};
pub use stages::{Pipeline, Stage};
pub use store::{BlobStore, GcsStore, MemoryStore};
pub use temporary::TemporaryFiles;

/// Definitions included by all the files in this crate.
///
/// This is the dialect of Rust we use for the pipeline: `anyhow` for errors,
/// `tracing` for structured logging and `tokio` underneath.
#[allow(unused_imports)]
pub(crate) mod common {
    pub(crate) use anyhow::{format_err, Context as _};
    pub(crate) use async_trait::async_trait;
    pub(crate) use bytes::Bytes;
    pub(crate) use futures::{FutureExt, SinkExt};
    pub(crate) use std::sync::Arc;
    pub(crate) use tracing::{
        debug, debug_span, error, info, instrument, trace, warn, Instrument,
    };
    pub(crate) use url::Url;

    pub(crate) use crate::{
        blob::BlobName,
        database::{Database, TableName},
        store::BlobStore,
        url_with_hidden_password::UrlWithHiddenPassword,
        Error, Result,
    };
}
