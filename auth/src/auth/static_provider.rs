use super::provider::{AuthenticationProvider, require_host, set_bearer_token};
use super::request::RequestInformation;
use crate::common::{AuthError, AuthResult};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

/// Attaches a pre-obtained token to every request.
///
/// There is no expiry tracking and no refresh: whoever supplied the token is
/// responsible for it still being valid.
pub struct StaticTokenProvider {
    token: Zeroizing<String>,
}

impl StaticTokenProvider {
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] for a blank token.
    pub fn new(token: impl Into<String>) -> AuthResult<Self> {
        let token = Zeroizing::new(token.into().trim().to_string());
        if token.is_empty() {
            return Err(AuthError::Configuration("Token must not be empty".to_string()));
        }
        Ok(Self { token })
    }
}

#[async_trait]
impl AuthenticationProvider for StaticTokenProvider {
    async fn authenticate_request(
        &self,
        request: &mut RequestInformation,
        _cancel: &CancellationToken,
    ) -> AuthResult<()> {
        require_host(request)?;
        set_bearer_token(request, &self.token)
    }

    fn name(&self) -> &'static str {
        "static"
    }
}

/// Attaches nothing. Used before any connection is configured, so unauthenticated
/// calls fail at the remote service rather than in the client.
#[derive(Clone, Copy, Debug, Default)]
pub struct AnonymousProvider;

#[async_trait]
impl AuthenticationProvider for AnonymousProvider {
    async fn authenticate_request(
        &self,
        request: &mut RequestInformation,
        _cancel: &CancellationToken,
    ) -> AuthResult<()> {
        require_host(request)?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "anonymous"
    }
}
