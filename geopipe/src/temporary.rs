//! Local temporary files.

use std::path::PathBuf;
use tempfile::{Builder, NamedTempFile};

use crate::common::*;

/// Where we put local temporary files.
#[derive(Clone, Debug, Default)]
pub struct TemporaryFiles {
    /// The directory to use, or `None` for the system temporary directory.
    dir: Option<PathBuf>,
}

impl TemporaryFiles {
    /// Create temporary files in `dir`, or in the system temporary directory.
    pub fn new(dir: Option<PathBuf>) -> Self {
        TemporaryFiles { dir }
    }

    /// Create a new, uniquely named temporary file. It will be deleted when
    /// dropped unless the caller keeps it.
    pub fn create(&self, suffix: &str) -> Result<NamedTempFile> {
        let mut builder = Builder::new();
        builder.prefix("geopipe-").suffix(suffix);
        match &self.dir {
            Some(dir) => builder.tempfile_in(dir).with_context(|| {
                format!("could not create temporary file in {}", dir.display())
            }),
            None => builder
                .tempfile()
                .context("could not create temporary file"),
        }
    }

    /// Allocate a fresh, empty temporary file that will not be deleted, and
    /// return its path.
    pub fn create_kept(&self, suffix: &str) -> Result<PathBuf> {
        let file = self.create(suffix)?;
        let (_file, path) = file
            .keep()
            .context("could not keep temporary file")?;
        Ok(path)
    }
}

#[test]
fn kept_files_outlive_their_handles() {
    let dir = tempfile::tempdir().unwrap();
    let temps = TemporaryFiles::new(Some(dir.path().to_owned()));
    let path = temps.create_kept(".csv").unwrap();
    assert!(path.exists());
    assert!(path.starts_with(dir.path()));
    assert!(path.to_string_lossy().ends_with(".csv"));
}

#[test]
fn unkept_files_are_removed_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let temps = TemporaryFiles::new(Some(dir.path().to_owned()));
    let file = temps.create(".bin").unwrap();
    let path = file.path().to_owned();
    assert!(path.exists());
    drop(file);
    assert!(!path.exists());
}
