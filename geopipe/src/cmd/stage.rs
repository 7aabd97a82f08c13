//! The `stage` subcommand.

use anyhow::{Context as _, Result};
use clap::Args;
use geopipe::stages::{build_stage, StageContext, StageName};
use tracing::info;

use super::{blob_store, database, RunOpt};

/// Single-stage arguments.
#[derive(Debug, Args)]
pub(crate) struct Opt {
    /// The stage to run.
    stage: StageName,

    #[command(flatten)]
    run: RunOpt,
}

/// Run one stage.
pub(crate) async fn run(opt: Opt) -> Result<()> {
    let config = opt.run.pipeline_config().await?;
    let date = opt.run.date();
    let store = blob_store(&config).await?;
    let db = if opt.stage.needs_database() {
        Some(database(&config)?)
    } else {
        None
    };

    let ctx = StageContext::new(&config, date, store)?;
    let stage = build_stage(opt.stage, &config, ctx, db)?;
    stage
        .run()
        .await
        .with_context(|| format!("stage {} failed", stage.name()))?;
    info!("stage {} for {} finished", stage.name(), date);
    Ok(())
}
