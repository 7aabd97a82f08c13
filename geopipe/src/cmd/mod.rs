//! Command parsing.

use anyhow::{Context as _, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use geopipe::{
    clouds::gcloud::Authenticator,
    config::{ConfigOverrides, Configuration},
    url_with_hidden_password::UrlWithHiddenPassword,
    BlobStore, Database, GcsStore, PipelineConfig, PostgresDatabase,
};
use std::{path::PathBuf, sync::Arc};
use tracing::debug;

use crate::logging::LogFormat;

pub(crate) mod config;
pub(crate) mod pipeline;
pub(crate) mod stage;

/// Command-line options, parsed using `clap`.
#[derive(Debug, Parser)]
#[command(
    name = "geopipe",
    version,
    about = "Download addresses, geocode them, and load the results into PostgreSQL."
)]
pub(crate) struct Opt {
    /// Log format: flat, pretty or json. Use RUST_LOG to pick what gets
    /// logged.
    #[arg(long = "log-format", default_value = "flat", global = true)]
    pub(crate) log_format: LogFormat,

    /// The command to run.
    #[command(subcommand)]
    pub(crate) cmd: Command,
}

/// The command to run.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Run all three stages in order.
    Pipeline {
        #[command(flatten)]
        command: pipeline::Opt,
    },

    /// Run a single stage, for use by a scheduler.
    #[command(after_help = r#"STAGES:
    extract_raw_addresses
    extract_geocoded_addresses
    load_address_data
"#)]
    Stage {
        #[command(flatten)]
        command: stage::Opt,
    },

    /// View or update configuration.
    Config {
        #[command(flatten)]
        command: config::Opt,
    },
}

pub(crate) async fn run(opt: Opt) -> Result<()> {
    match opt.cmd {
        Command::Pipeline { command } => pipeline::run(command).await,
        Command::Stage { command } => stage::run(command).await,
        Command::Config { command } => config::run(command).await,
    }
}

/// Options shared by every command that runs stages.
#[derive(Debug, Args)]
pub(crate) struct RunOpt {
    /// The run date used to name blobs [default: today].
    #[arg(long = "date")]
    date: Option<NaiveDate>,

    /// The Cloud Storage bucket where stages leave data.
    #[arg(long = "bucket", env = "PIPELINE_DATA_BUCKET")]
    bucket: Option<String>,

    /// A Google Cloud service account key file.
    #[arg(long = "credentials", env = "GOOGLE_APPLICATION_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// The PostgreSQL database to load results into.
    #[arg(long = "database-url", env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<UrlWithHiddenPassword>,

    /// The table to replace with geocoded results.
    #[arg(long = "table")]
    table: Option<String>,

    /// Store HTTP responses even when their status is an error.
    #[arg(long = "accept-error-responses")]
    accept_error_responses: bool,
}

impl RunOpt {
    /// The run date.
    pub(crate) fn date(&self) -> NaiveDate {
        self.date.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Combine our flags and environment variables with the config file.
    pub(crate) async fn pipeline_config(&self) -> Result<PipelineConfig> {
        let config = tokio::task::spawn_blocking(Configuration::try_default)
            .await
            .context("could not load configuration")??;
        let overrides = ConfigOverrides {
            bucket: self.bucket.clone(),
            credentials: self.credentials.clone(),
            database_url: self.database_url.clone(),
            table: self.table.clone(),
            accept_error_responses: self.accept_error_responses.then_some(true),
        };
        let resolved = PipelineConfig::resolve(&config, overrides)?;
        debug!("resolved configuration: {:?}", resolved);
        Ok(resolved)
    }
}

/// Connect to the configured blob store.
pub(crate) async fn blob_store(config: &PipelineConfig) -> Result<Arc<dyn BlobStore>> {
    let store = match &config.storage_endpoint {
        // Emulators usually don't check tokens, so only authenticate if asked.
        Some(endpoint) => {
            let authenticator = match &config.credentials {
                Some(path) => Authenticator::new(Some(path.as_path())).await?,
                None => Authenticator::Anonymous,
            };
            GcsStore::with_endpoint(endpoint.clone(), authenticator, config.http_timeout)?
        }
        None => GcsStore::new(config.credentials.as_deref(), config.http_timeout).await?,
    };
    Ok(Arc::new(store))
}

/// The configured destination database.
pub(crate) fn database(config: &PipelineConfig) -> Result<Arc<dyn Database>> {
    let url = config.require_database_url()?.clone();
    Ok(Arc::new(PostgresDatabase::new(url)?))
}
