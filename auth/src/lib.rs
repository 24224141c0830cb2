//! # BetterGraph Auth Library
//!
//! Token acquisition and request authentication for Microsoft Graph command-line
//! tooling. Tokens are reused from memory and from a persistent per-user cache
//! when possible, with interactive or credential-based sign-in as the fallback.
//!
//! ## Modules
//!
//! - [`auth`] - Providers, token acquisition, caching and the connection session
//! - [`common`] - Error types shared by every module
//! - [`utils`] - Environment variable helpers
//!
//! ## Example
//!
//! ```no_run
//! use graph_auth::auth::{ConnectOptions, GraphSession, RequestInformation};
//! use reqwest::Method;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> graph_auth::common::AuthResult<()> {
//! let session = GraphSession::default();
//! session.connect(&ConnectOptions::from_env()).await?;
//!
//! let mut request = RequestInformation::parse(Method::GET, "https://graph.microsoft.com/v1.0/me")?;
//! session.authenticate_request(&mut request, &CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod common;
pub mod utils;
