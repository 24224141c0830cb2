use super::provider::AuthenticationProvider;
use super::request::RequestInformation;
use super::resolver::{ConnectOptions, GraphAuthProvider, ProviderSettings};
use super::static_provider::AnonymousProvider;
use super::token_extract::extract_bearer_token;
use crate::common::{AuthError, AuthResult};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Connection context shared by every command that talks to Graph.
///
/// `connect` configures a provider once and every later request goes through
/// it until `disconnect`. Before connecting, requests go out anonymously.
///
/// ```no_run
/// use graph_auth::auth::{ConnectOptions, GraphSession, ProviderSettings};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn demo() -> graph_auth::common::AuthResult<()> {
/// let session = GraphSession::new(ProviderSettings::default());
/// session.connect(&ConnectOptions {
///     username: Some("admin@contoso.com".to_string()),
///     scopes: vec!["User.Read".to_string()],
///     ..Default::default()
/// }).await?;
/// let token = session.get_token(&CancellationToken::new()).await?;
/// # Ok(())
/// # }
/// ```
pub struct GraphSession {
    settings: ProviderSettings,
    provider: RwLock<Option<Arc<GraphAuthProvider>>>,
    anonymous: Arc<GraphAuthProvider>,
}

impl GraphSession {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            settings,
            provider: RwLock::new(None),
            anonymous: Arc::new(GraphAuthProvider::Anonymous(AnonymousProvider)),
        }
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Resolves `options` and replaces the current provider.
    ///
    /// # Errors
    ///
    /// [`AuthError::Configuration`] when the options select no valid mode. The
    /// previous provider stays in place in that case.
    pub async fn connect(&self, options: &ConnectOptions) -> AuthResult<()> {
        let mode = options.resolve()?;
        log::info!("Connecting to Microsoft Graph using {}", mode.name());
        let provider = GraphAuthProvider::from_mode(mode, &self.settings)?;
        self.connect_with(provider).await;
        Ok(())
    }

    pub async fn connect_with(&self, provider: GraphAuthProvider) {
        *self.provider.write().await = Some(Arc::new(provider));
    }

    /// Drops the current provider. Returns whether one was configured.
    pub async fn disconnect(&self) -> bool {
        let previous = self.provider.write().await.take();
        if previous.is_some() {
            log::info!("Disconnected from Microsoft Graph");
        }
        previous.is_some()
    }

    pub async fn is_connected(&self) -> bool {
        self.provider.read().await.is_some()
    }

    /// The configured provider, or the anonymous one when not connected.
    pub async fn provider(&self) -> Arc<GraphAuthProvider> {
        match self.provider.read().await.as_ref() {
            Some(provider) => Arc::clone(provider),
            None => Arc::clone(&self.anonymous),
        }
    }

    pub async fn authenticate_request(
        &self,
        request: &mut RequestInformation,
        cancel: &CancellationToken,
    ) -> AuthResult<()> {
        self.provider()
            .await
            .authenticate_request(request, cancel)
            .await
    }

    /// Current bearer token the connected provider attaches for the configured Graph host.
    ///
    /// # Errors
    ///
    /// [`AuthError::NotConnected`] before `connect`; acquisition errors otherwise.
    pub async fn get_token(&self, cancel: &CancellationToken) -> AuthResult<String> {
        let provider = self
            .provider
            .read()
            .await
            .clone()
            .ok_or(AuthError::NotConnected)?;

        extract_bearer_token(provider.as_ref(), &self.settings.graph_host, cancel)
            .await?
            .ok_or_else(|| {
                AuthError::AuthenticationFailed(
                    "Failed to retrieve token: the provider attached no bearer token".to_string(),
                )
            })
    }
}

impl Default for GraphSession {
    fn default() -> Self {
        Self::new(ProviderSettings::default())
    }
}
