//! The `pipeline` subcommand.

use anyhow::Result;
use clap::Args;
use geopipe::Pipeline;
use tracing::info;

use super::{blob_store, database, RunOpt};

/// Pipeline arguments.
#[derive(Debug, Args)]
pub(crate) struct Opt {
    #[command(flatten)]
    run: RunOpt,
}

/// Run every stage for one date.
pub(crate) async fn run(opt: Opt) -> Result<()> {
    let config = opt.run.pipeline_config().await?;
    let date = opt.run.date();
    let store = blob_store(&config).await?;
    let db = database(&config)?;

    let pipeline = Pipeline::new(&config, date, store, db)?;
    pipeline.run().await?;
    info!("pipeline for {} finished", date);
    Ok(())
}
