//! The `config` subcommand.

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use geopipe::config::{Configuration, Key};

/// Configuration-editing arguments.
#[derive(Debug, Args)]
pub(crate) struct Opt {
    /// The command to perform on the configuration.
    #[command(subcommand)]
    command: Command,
}

/// A command that we can perform on the configuration.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Set a configuration key.
    Set {
        /// The key to set [values: bucket, credentials, database_url, table,
        /// source_url, geocoder_url, storage_endpoint, temporary_dir,
        /// http_timeout_secs, accept_error_responses].
        key: Key,

        /// The new value.
        value: String,
    },

    /// Remove a configuration key.
    #[command(name = "rm")]
    Remove {
        /// The key to remove.
        key: Key,
    },

    /// Show the current configuration, hiding passwords.
    Show,
}

/// View or edit our config file.
pub(crate) async fn run(opt: Opt) -> Result<()> {
    let mut config = tokio::task::spawn_blocking(Configuration::try_default)
        .await
        .context("could not load configuration")??;
    match opt.command {
        Command::Set { key, value } => config.set(key, &value)?,
        Command::Remove { key } => config.remove(key),
        Command::Show => {
            println!("# {}", config.path().display());
            for (key, value) in config.describe()? {
                match value {
                    Some(value) => println!("{} = {}", key, value),
                    None => println!("# {} is not set", key),
                }
            }
            return Ok(());
        }
    }
    tokio::task::spawn_blocking(move || config.write())
        .await
        .context("could not write configuration")?
}
