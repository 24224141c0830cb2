//! Environment variable utilities for safe and validated access.
//!
//! Values are trimmed and blank values count as missing, so `AZURE_TENANT_ID=" "`
//! behaves exactly like an unset variable.

use thiserror::Error;

pub const AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";
pub const AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const AZURE_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
pub const AZURE_SCOPES: &str = "AZURE_SCOPES";
pub const AZURE_TOKEN: &str = "AZURE_TOKEN";
pub const AZURE_USE_DEFAULT_CREDENTIALS: &str = "AZURE_USE_DEFAULT_CREDENTIALS";
/// Managed identity endpoint injected by App Service, Functions and Container Apps.
pub const IDENTITY_ENDPOINT: &str = "IDENTITY_ENDPOINT";
pub const IDENTITY_HEADER: &str = "IDENTITY_HEADER";

/// Errors that can occur when accessing environment variables.
#[derive(Debug, Error)]
pub enum EnvVarError {
    /// Environment variable is not set
    #[error(
        "Environment variable '{name}' not found. Please set this variable in your .env file or environment."
    )]
    NotFound { name: String },

    /// Environment variable contains invalid UTF-8 characters
    #[error(
        "Environment variable '{name}' contains invalid UTF-8 characters. Please check the value."
    )]
    InvalidUtf8 { name: String },

    /// Environment variable is set but contains only whitespace or is empty
    #[error("Environment variable '{name}' is empty. Please provide a valid value.")]
    Empty { name: String },
}

/// Utility functions for safe environment variable handling.
///
/// # Examples
///
/// ```no_run
/// use graph_auth::utils::EnvUtils;
///
/// let scopes = EnvUtils::get_list_var("AZURE_SCOPES").unwrap_or_default();
/// let use_default = EnvUtils::is_truthy("AZURE_USE_DEFAULT_CREDENTIALS");
/// ```
pub struct EnvUtils;

impl EnvUtils {
    /// Gets an environment variable, trimmed and validated to be non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`EnvVarError`] if:
    /// - The variable is not set ([`EnvVarError::NotFound`])
    /// - The variable is empty or contains only whitespace ([`EnvVarError::Empty`])
    /// - The variable contains invalid UTF-8 ([`EnvVarError::InvalidUtf8`])
    pub fn get_validated_var(name: &str) -> Result<String, EnvVarError> {
        match std::env::var(name) {
            Ok(value) => {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    Err(EnvVarError::Empty {
                        name: name.to_string(),
                    })
                } else {
                    Ok(trimmed.to_string())
                }
            }
            Err(std::env::VarError::NotPresent) => Err(EnvVarError::NotFound {
                name: name.to_string(),
            }),
            Err(std::env::VarError::NotUnicode(_)) => Err(EnvVarError::InvalidUtf8 {
                name: name.to_string(),
            }),
        }
    }

    /// Gets an optional environment variable; missing, blank and invalid values are `None`.
    pub fn get_optional_var(name: &str) -> Option<String> {
        Self::get_validated_var(name).ok()
    }

    /// Splits a whitespace-separated variable such as `AZURE_SCOPES` into its items.
    pub fn get_list_var(name: &str) -> Option<Vec<String>> {
        Self::get_optional_var(name).map(|value| {
            value
                .split_whitespace()
                .map(str::to_string)
                .collect()
        })
    }

    /// `true` only when the variable equals `true`, ignoring case.
    pub fn is_truthy(name: &str) -> bool {
        Self::get_optional_var(name).is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }
}
