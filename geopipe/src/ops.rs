//! The three building blocks of the pipeline: HTTP to store, store to local
//! file, and store to table.
//!
//! None of these retry. Any error is returned to the caller unchanged apart
//! from added context.

use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};
use tokio::{fs, task::spawn_blocking};

use crate::common::*;
use crate::delimited::{parse_delimited, ParseOptions};
use crate::http::{FetchRequest, Fetcher};
use crate::temporary::TemporaryFiles;

/// Perform `request`, buffer the response body in a local temporary file, and
/// upload it to `dest`, replacing anything already there.
///
/// Returns the number of bytes stored. Whether non-2xx responses are stored or
/// rejected depends on the [`Fetcher`]'s status policy.
#[instrument(
    level = "info",
    name = "http_to_store",
    skip_all,
    fields(url = %request.url(), dest = %dest)
)]
pub async fn http_to_store(
    fetcher: &Fetcher,
    request: &FetchRequest,
    store: &dyn BlobStore,
    dest: &BlobName,
    temporaries: &TemporaryFiles,
) -> Result<u64> {
    let fetched = fetcher.fetch(request).await?;

    // Keep a local copy while we upload, so we're uploading exactly what we
    // saved.
    let mut local_file = temporaries.create(".download")?;
    let local_path = local_file.path().to_owned();
    info!(
        "saving {} response to {}",
        fetched.status,
        local_path.display()
    );
    let body = fetched.body;
    let local_file = spawn_blocking(move || -> io::Result<_> {
        local_file.write_all(&body)?;
        local_file.flush()?;
        Ok(local_file)
    })
    .await
    .context("could not join file writer")?
    .with_context(|| format!("could not write {}", local_path.display()))?;
    let data = Bytes::from(
        fs::read(&local_path)
            .await
            .with_context(|| format!("could not read {}", local_path.display()))?,
    );
    drop(local_file);

    info!("uploading {} bytes to {}", data.len(), dest);
    let len = data.len() as u64;
    store.upload(dest, data).await?;
    metrics::counter!("geopipe.store.bytes_uploaded").increment(len);
    Ok(len)
}

/// Download `blob` into a local file and return the path used.
///
/// If `local_path` is `None`, we allocate a fresh temporary file, which is left
/// in place for the caller.
#[instrument(level = "info", name = "store_to_local_file", skip(store, temporaries))]
pub async fn store_to_local_file(
    store: &dyn BlobStore,
    blob: &BlobName,
    local_path: Option<&Path>,
    temporaries: &TemporaryFiles,
) -> Result<PathBuf> {
    let data = store.download(blob).await?;
    let path = match local_path {
        Some(path) => path.to_owned(),
        None => temporaries.create_kept(&local_suffix(blob))?,
    };
    info!("saving {} to local file {}", blob, path.display());
    fs::write(&path, &data)
        .await
        .with_context(|| format!("could not write {}", path.display()))?;
    Ok(path)
}

/// Download `blob`, parse it as delimited text and replace `table_name` in
/// `db` with the result.
///
/// Returns the number of rows loaded. If writing fails, what happens to the
/// existing table depends on `db`.
#[instrument(
    level = "info",
    name = "store_to_table",
    skip(store, db, opt, temporaries),
    fields(table = %table_name)
)]
pub async fn store_to_table(
    store: &dyn BlobStore,
    blob: &BlobName,
    db: &dyn Database,
    table_name: &TableName,
    opt: &ParseOptions,
    temporaries: &TemporaryFiles,
) -> Result<u64> {
    let local_path = store_to_local_file(store, blob, None, temporaries).await?;

    info!("reading data from file {}", local_path.display());
    let data = fs::read(&local_path)
        .await
        .with_context(|| format!("could not read {}", local_path.display()))?;
    let table = parse_delimited(&data, opt)
        .with_context(|| format!("could not parse {}", blob))?;

    info!("writing {} rows to table {}", table.rows.len(), table_name);
    let rows = db.replace_table(table_name, &table).await?;
    metrics::counter!("geopipe.table.rows_loaded").increment(rows);

    // The download is only ours while we're using it.
    if let Err(err) = fs::remove_file(&local_path).await {
        warn!("could not remove {}: {}", local_path.display(), err);
    }
    Ok(rows)
}

/// A file suffix for local copies of `blob`, so `.csv` files stay `.csv`.
fn local_suffix(blob: &BlobName) -> String {
    match blob.file_name().rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 8 => format!(".{}", ext),
        _ => String::new(),
    }
}

#[test]
fn local_suffix_keeps_short_extensions() {
    let blob = |name: &str| BlobName::new("b", name).unwrap();
    assert_eq!(local_suffix(&blob("addresses_2021-10-22.csv")), ".csv");
    assert_eq!(local_suffix(&blob("dir.v2/README")), "");
    assert_eq!(local_suffix(&blob("odd.")), "");
}
