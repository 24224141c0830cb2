//! # Utilities
//!
//! Environment variable access shared by the credential resolver and the
//! environment credential.
//!
//! ```no_run
//! use graph_auth::utils::env::{EnvUtils, AZURE_TENANT_ID};
//!
//! if let Some(tenant) = EnvUtils::get_optional_var(AZURE_TENANT_ID) {
//!     println!("Using tenant {tenant}");
//! }
//! ```

pub mod env;

pub use env::{EnvUtils, EnvVarError};
