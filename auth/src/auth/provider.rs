use super::request::RequestInformation;
use crate::common::{AuthError, AuthResult};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use tokio_util::sync::CancellationToken;

/// Scheme prefix of the `Authorization` header value.
pub const AUTHENTICATION_SCHEME: &str = "Bearer";

/// The request-time authentication contract.
///
/// The HTTP pipeline calls [`authenticate_request`] once before dispatching each
/// request. Implementations decide whether the request should carry
/// credentials at all and, if so, set the `Authorization` header.
///
/// # Examples
///
/// ```no_run
/// use graph_auth::auth::provider::{AuthenticationProvider, set_bearer_token};
/// use graph_auth::auth::request::RequestInformation;
/// use graph_auth::common::AuthResult;
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
///
/// struct FixedProvider;
///
/// #[async_trait]
/// impl AuthenticationProvider for FixedProvider {
///     async fn authenticate_request(
///         &self,
///         request: &mut RequestInformation,
///         _cancel: &CancellationToken,
///     ) -> AuthResult<()> {
///         set_bearer_token(request, "example_token")
///     }
///
///     fn name(&self) -> &'static str {
///         "fixed"
///     }
/// }
/// ```
///
/// [`authenticate_request`]: AuthenticationProvider::authenticate_request
#[async_trait]
pub trait AuthenticationProvider: Send + Sync {
    /// Attaches credentials to `request` when appropriate.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the request has no target URI, and
    /// any acquisition error the provider hits while obtaining a token.
    async fn authenticate_request(
        &self,
        request: &mut RequestInformation,
        cancel: &CancellationToken,
    ) -> AuthResult<()>;

    /// Short provider name used in log output.
    fn name(&self) -> &'static str;
}

/// Sets `Authorization: Bearer <token>` on `request`, replacing any previous value.
pub fn set_bearer_token(request: &mut RequestInformation, token: &str) -> AuthResult<()> {
    let mut value = HeaderValue::from_str(&format!("{AUTHENTICATION_SCHEME} {token}"))
        .map_err(|_| {
            AuthError::Configuration("Token contains characters not allowed in a header".to_string())
        })?;
    value.set_sensitive(true);
    request.set_header(AUTHORIZATION, value);
    Ok(())
}

/// Returns the request's host, failing when the request has no target.
pub(crate) fn require_host(request: &RequestInformation) -> AuthResult<&str> {
    if request.uri().is_none() {
        return Err(AuthError::Configuration(
            "request must have a target URI".to_string(),
        ));
    }
    Ok(request.host().unwrap_or_default())
}

/// Case-insensitive host comparison used to scope credentials.
pub(crate) fn is_allowed_host(host: &str, allowed: &str) -> bool {
    host.eq_ignore_ascii_case(allowed)
}
