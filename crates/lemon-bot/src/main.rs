mod bootstrap_helpers;
mod cli_args;
mod startup;

use anyhow::Result;
use clap::Parser;
use lemon_slack_runtime::run_slack_runtime;

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::Cli;
use crate::startup::build_runtime_config;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = build_runtime_config(&cli)?;
    run_slack_runtime(config).await
}
