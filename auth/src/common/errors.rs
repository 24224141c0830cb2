use thiserror::Error;

/// Why an acquisition ended without a token and without an authentication failure.
///
/// Callers use this to tell "the user walked away" apart from "the
/// credentials are wrong", which need different guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationReason {
    /// The interactive flow exceeded its fixed time bound.
    TimedOut { after_secs: u64 },
    /// The caller's cancellation token fired.
    CallerCancelled,
    /// The user declined the login prompt or let the device code expire.
    UserDeclined,
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancellationReason::TimedOut { after_secs } => {
                write!(f, "interactive login timed out after {after_secs}s")
            }
            CancellationReason::CallerCancelled => write!(f, "operation was cancelled"),
            CancellationReason::UserDeclined => write!(f, "login was declined by the user"),
        }
    }
}

/// Errors produced by the token core.
///
/// Every variant maps to exactly one [`AuthErrorKind`] so the command-line
/// layer can print actionable guidance without matching on message text.
///
/// # Error Categories
///
/// - [`AuthError::Configuration`] - bad setup, raised synchronously before any I/O
/// - [`AuthError::InteractionRequired`] - silent acquisition needs a user; handled
///   internally by falling back to interactive login
/// - [`AuthError::Cancelled`] - timeout or cancellation, never an auth failure
/// - [`AuthError::AuthenticationFailed`] - rejected credentials or consent
/// - [`AuthError::Network`] - the identity service could not be reached
/// - [`AuthError::NotConnected`] - a token was requested before connecting
/// - [`AuthError::Cache`] - the persistent token store could not be read or written
///
/// # Examples
///
/// ```no_run
/// use graph_auth::common::{AuthError, AuthErrorKind};
///
/// fn report(err: &AuthError) {
///     eprintln!("error: {err}");
///     if err.kind() != AuthErrorKind::InteractionRequired {
///         eprintln!("hint: {}", err.guidance());
///     }
/// }
/// ```
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Interaction required: {0}")]
    InteractionRequired(String),

    #[error("Authentication cancelled: {0}")]
    Cancelled(CancellationReason),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Network error talking to the identity service: {0}")]
    Network(String),

    #[error("No authentication provider configured")]
    NotConnected,

    #[error("Token cache error: {0}")]
    Cache(String),
}

/// Field-less discriminant of [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    Configuration,
    InteractionRequired,
    Cancelled,
    AuthenticationFailed,
    Network,
    NotConnected,
    Cache,
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::Configuration(_) => AuthErrorKind::Configuration,
            AuthError::InteractionRequired(_) => AuthErrorKind::InteractionRequired,
            AuthError::Cancelled(_) => AuthErrorKind::Cancelled,
            AuthError::AuthenticationFailed(_) => AuthErrorKind::AuthenticationFailed,
            AuthError::Network(_) => AuthErrorKind::Network,
            AuthError::NotConnected => AuthErrorKind::NotConnected,
            AuthError::Cache(_) => AuthErrorKind::Cache,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, AuthError::Cancelled(_))
    }

    /// Operator-facing hint for this error.
    pub fn guidance(&self) -> &'static str {
        match self {
            AuthError::Configuration(_) => {
                "Check the connection parameters: scopes are required, and client credentials need tenant id, client id and client secret."
            }
            AuthError::InteractionRequired(_) => {
                "Sign in interactively by connecting with --username."
            }
            AuthError::Cancelled(CancellationReason::TimedOut { .. }) => {
                "Your login timed out. Run the command again and complete the sign-in prompt within two minutes."
            }
            AuthError::Cancelled(CancellationReason::UserDeclined) => {
                "Your login was cancelled. Run the command again to retry."
            }
            AuthError::Cancelled(CancellationReason::CallerCancelled) => {
                "The operation was cancelled before a token was obtained."
            }
            AuthError::AuthenticationFailed(msg)
                if msg.contains("invalid_client") || msg.contains("client secret") =>
            {
                "Check your client secret and client id."
            }
            AuthError::AuthenticationFailed(_) => {
                "Check that the account has access to the tenant and that consent was granted."
            }
            AuthError::Network(_) => {
                "Check your network connection to login.microsoftonline.com."
            }
            AuthError::NotConnected => {
                "Connect first: pass --username, --token, --use-default-credentials or client credential flags."
            }
            AuthError::Cache(_) => {
                "The token cache could not be used. Remove it with `bgraph logout` and sign in again."
            }
        }
    }

    pub(crate) fn network(err: reqwest::Error) -> Self {
        AuthError::Network(err.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(err: std::io::Error) -> Self {
        AuthError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        AuthError::Cache(format!("invalid cache contents: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(
            AuthError::Configuration("x".into()).kind(),
            AuthErrorKind::Configuration
        );
        assert_eq!(AuthError::NotConnected.kind(), AuthErrorKind::NotConnected);
        assert_eq!(
            AuthError::Cancelled(CancellationReason::CallerCancelled).kind(),
            AuthErrorKind::Cancelled
        );
    }

    #[test]
    fn test_cancellation_is_not_authentication_failure() {
        let err = AuthError::Cancelled(CancellationReason::TimedOut { after_secs: 120 });
        assert!(err.is_cancellation());
        assert_ne!(err.kind(), AuthErrorKind::AuthenticationFailed);
        assert!(err.to_string().contains("120s"));
    }

    #[test]
    fn test_guidance_points_at_client_secret() {
        let err = AuthError::AuthenticationFailed("invalid_client: bad secret".into());
        assert!(err.guidance().contains("client secret"));
    }

    #[test]
    fn test_not_connected_guidance_mentions_connect() {
        assert!(AuthError::NotConnected.guidance().starts_with("Connect first"));
    }
}
