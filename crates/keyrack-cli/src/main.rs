//! `keyrack`: the key cabinet service.

mod app;
mod cli;
mod telemetry;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing();

    let config = cli.load_config()?;
    for warning in config.warnings() {
        warn!("{warning}");
    }

    if cli.check {
        app::check(&config);
        return Ok(());
    }
    app::run(config).await
}
