//! # BetterGraph CLI
//!
//! `bgraph` acquires Microsoft Graph access tokens through the
//! [`graph_auth`] library and manages its persistent token cache.
//!
//! - `bgraph token` connects with the given flags and prints a bearer token
//! - `bgraph accounts` lists cached accounts
//! - `bgraph logout` removes them

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logger;
