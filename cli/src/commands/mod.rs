//! `bgraph` subcommands. Each one takes its parsed arguments and the loaded
//! configuration and returns when its output has been written.

pub mod accounts;
pub mod logout;
pub mod token;

use crate::cli::Commands;
use crate::config::CliConfig;
use tokio_util::sync::CancellationToken;

pub async fn execute(command: Commands, config: &CliConfig) -> anyhow::Result<()> {
    match command {
        Commands::Token(args) => token::execute(args, config, cancel_on_ctrl_c()).await,
        Commands::Accounts(args) => accounts::execute(args, config).await,
        Commands::Logout(args) => logout::execute(args, config).await,
    }
}

/// Token cancelled by the first Ctrl-C, so a pending sign-in ends as cancelled.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Interrupted, cancelling sign-in");
            trigger.cancel();
        }
    });
    cancel
}
