mod bootstrap_helpers;
mod startup;
mod terminal_presenter;

use anyhow::Result;
use clap::Parser;
use kiln_cli::Cli;

use crate::bootstrap_helpers::init_tracing;
use crate::startup::{build_services, run_session};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_filter.as_deref());
    let services = build_services(&cli)?;
    let session = run_session(&cli, services).await?;
    println!(
        "controller={} model={}",
        session.controller().unwrap_or_default(),
        session.model().unwrap_or_default()
    );
    Ok(())
}
