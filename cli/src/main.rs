use anyhow::Context;
use bettergraph::cli::Cli;
use bettergraph::config::CliConfig;
use bettergraph::{commands, error, logger};
use clap::Parser;

#[tokio::main]
async fn main() {
    // .env must be applied before clap reads the AZURE_* fallbacks
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        log::debug!("Command failed: {e:?}");
        error::report(&e);
        std::process::exit(error::exit_code(&e));
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::load(cli.config.as_deref())?;
    logger::setup_logger(config.logging(), cli.verbose).context("Failed to set up logging")?;

    commands::execute(cli.command, &config).await
}
