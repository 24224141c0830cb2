//! Command-line surface of `bgraph`.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use graph_auth::auth::ConnectOptions;
use zeroize::Zeroizing;

#[derive(Parser, Debug)]
#[command(name = "bgraph")]
#[command(author, version, about = "Acquire and cache Microsoft Graph access tokens", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to ./bettergraph.toml)
    #[arg(long, global = true, env = "BETTERGRAPH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect and print a bearer token for Microsoft Graph
    Token(TokenArgs),
    /// List accounts in the persistent token cache
    Accounts(AccountsArgs),
    /// Remove cached accounts and tokens
    Logout(LogoutArgs),
}

/// Connection flags, each backed by the matching `AZURE_*` variable.
#[derive(Args, Debug, Default)]
pub struct ConnectArgs {
    /// Sign in interactively as this user
    #[arg(long, short = 'u')]
    pub username: Option<String>,

    /// Sign in interactively without a username hint
    #[arg(long, short = 'i')]
    pub interactive: bool,

    /// Directory (tenant) id or domain
    #[arg(long, env = "AZURE_TENANT_ID")]
    pub tenant_id: Option<String>,

    /// Application (client) id
    #[arg(long, env = "AZURE_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Client secret for the client credentials flow
    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    /// Scopes to request, space separated
    #[arg(long, env = "AZURE_SCOPES", value_delimiter = ' ', num_args = 1..)]
    pub scopes: Vec<String>,

    /// Use this access token as is
    #[arg(long, env = "AZURE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Use environment, managed identity or Azure CLI credentials
    #[arg(long, env = "AZURE_USE_DEFAULT_CREDENTIALS")]
    pub use_default_credentials: bool,

    /// Do not use the OS login broker
    #[arg(long)]
    pub no_broker: bool,
}

impl ConnectArgs {
    pub fn into_options(self) -> ConnectOptions {
        ConnectOptions {
            username: self.username,
            interactive: self.interactive,
            tenant_id: self.tenant_id,
            client_id: self.client_id,
            client_secret: self.client_secret.map(Zeroizing::new),
            scopes: self
                .scopes
                .into_iter()
                .filter(|s| !s.trim().is_empty())
                .collect(),
            token: self.token.map(Zeroizing::new),
            use_default_credentials: self.use_default_credentials,
            no_broker: self.no_broker,
        }
    }
}

#[derive(Args, Debug)]
pub struct TokenArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    /// Write the token to this file (mode 0600) instead of stdout
    #[arg(long, short = 'o')]
    pub output_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AccountsArgs {
    /// Application (client) id the accounts were cached for
    #[arg(long, env = "AZURE_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Print the accounts as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct LogoutArgs {
    /// Application (client) id the accounts were cached for
    #[arg(long, env = "AZURE_CLIENT_ID")]
    pub client_id: Option<String>,
}
