//! Tests which run the `geopipe` binary.

use cli_test_dir::*;
use std::{fs, path::PathBuf, process::Command};

mod config;
mod stage;

/// Environment variables which would otherwise leak into our tests.
const AMBIENT_VARS: &[&str] = &[
    "PIPELINE_DATA_BUCKET",
    "GOOGLE_APPLICATION_CREDENTIALS",
    "DATABASE_URL",
    "RUST_LOG",
];

/// A `geopipe` command using a private config directory inside `testdir`.
pub(crate) fn geopipe_cmd(testdir: &TestDir) -> Command {
    let mut cmd = testdir.cmd();
    cmd.env("GEOPIPE_CONFIG_DIR", config_dir(testdir));
    for var in AMBIENT_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// Our private config directory.
pub(crate) fn config_dir(testdir: &TestDir) -> PathBuf {
    testdir.path("config")
}

/// Write `contents` as our config file.
pub(crate) fn write_config(testdir: &TestDir, contents: &str) {
    let dir = config_dir(testdir);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("geopipe.toml"), contents).unwrap();
}
