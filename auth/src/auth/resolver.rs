//! Picks the connection mode from raw connect parameters and builds the provider for it.

use super::credentials::{
    ClientSecretCredential, CredentialAuthenticationProvider, DefaultCredentialChain,
};
use super::entra_client::{DeviceCodeCallback, EntraClientConfig, EntraPublicClient};
use super::persistent_cache::FileTokenCacheStore;
use super::provider::AuthenticationProvider;
use super::request::RequestInformation;
use super::static_provider::{AnonymousProvider, StaticTokenProvider};
use super::interactive_provider::InteractiveAuthenticationProvider;
use super::token_acquirer::{AcquirerSettings, TokenAcquirer};
use super::types::{
    DEFAULT_AUTHORITY_HOST, DEFAULT_CLIENT_ID, DEFAULT_INTERACTIVE_TIMEOUT, GRAPH_HOST,
    InteractiveOptions, non_blank,
};
use crate::common::{AuthError, AuthResult};
use crate::utils::env::{
    AZURE_CLIENT_ID, AZURE_CLIENT_SECRET, AZURE_SCOPES, AZURE_TENANT_ID, AZURE_TOKEN,
    AZURE_USE_DEFAULT_CREDENTIALS, EnvUtils,
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

/// Everything a connect step may be given. Several fields are mutually exclusive;
/// [`ConnectOptions::resolve`] decides which ones win.
#[derive(Clone, Default)]
pub struct ConnectOptions {
    pub username: Option<String>,
    /// Sign in interactively even without a username.
    pub interactive: bool,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<Zeroizing<String>>,
    pub scopes: Vec<String>,
    pub token: Option<Zeroizing<String>>,
    pub use_default_credentials: bool,
    /// Disable the OS-native login broker.
    pub no_broker: bool,
}

impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("username", &self.username)
            .field("interactive", &self.interactive)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("scopes", &self.scopes)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("use_default_credentials", &self.use_default_credentials)
            .field("no_broker", &self.no_broker)
            .finish()
    }
}

impl ConnectOptions {
    /// Options taken from the `AZURE_*` environment variables.
    pub fn from_env() -> Self {
        Self {
            tenant_id: EnvUtils::get_optional_var(AZURE_TENANT_ID),
            client_id: EnvUtils::get_optional_var(AZURE_CLIENT_ID),
            client_secret: EnvUtils::get_optional_var(AZURE_CLIENT_SECRET).map(Zeroizing::new),
            scopes: EnvUtils::get_list_var(AZURE_SCOPES).unwrap_or_default(),
            token: EnvUtils::get_optional_var(AZURE_TOKEN).map(Zeroizing::new),
            use_default_credentials: EnvUtils::is_truthy(AZURE_USE_DEFAULT_CREDENTIALS),
            ..Self::default()
        }
    }

    /// Selects the connection mode.
    ///
    /// Precedence: static token, interactive (a username or the explicit flag),
    /// default credentials, client credentials.
    ///
    /// # Errors
    ///
    /// [`AuthError::Configuration`] when interactive login has no scopes, when the
    /// client credential triple is incomplete, or when nothing selects a mode.
    pub fn resolve(&self) -> AuthResult<ConnectionMode> {
        let tenant_id = non_blank(self.tenant_id.clone());
        let client_id = non_blank(self.client_id.clone());
        let username = non_blank(self.username.clone());

        if let Some(token) = self.token.as_ref().filter(|t| !t.trim().is_empty()) {
            return Ok(ConnectionMode::StaticToken(token.clone()));
        }

        if username.is_some() || self.interactive {
            let options = InteractiveOptions::new(self.scopes.clone())?
                .with_tenant_id(tenant_id)
                .with_client_id(client_id)
                .with_username(username)
                .with_broker(!self.no_broker && cfg!(windows));
            return Ok(ConnectionMode::Interactive(options));
        }

        if self.use_default_credentials {
            return Ok(ConnectionMode::DefaultCredentials {
                tenant_id,
                scopes: self.scopes.clone(),
            });
        }

        let client_secret = self
            .client_secret
            .as_ref()
            .filter(|s| !s.trim().is_empty());
        match (tenant_id, client_id, client_secret) {
            (Some(tenant_id), Some(client_id), Some(secret)) => {
                Ok(ConnectionMode::ClientCredentials {
                    tenant_id,
                    client_id,
                    client_secret: secret.clone(),
                    scopes: self.scopes.clone(),
                })
            }
            (_, _, Some(_)) => Err(AuthError::Configuration(
                "Not all parameters for client credentials are specified: tenant id and client id are required with a client secret".to_string(),
            )),
            _ => Err(AuthError::Configuration(
                "Invalid parameter set: pass a username, a token, default credentials or client credentials".to_string(),
            )),
        }
    }
}

/// The authentication strategy selected at connect time.
pub enum ConnectionMode {
    StaticToken(Zeroizing<String>),
    Interactive(InteractiveOptions),
    DefaultCredentials {
        tenant_id: Option<String>,
        scopes: Vec<String>,
    },
    ClientCredentials {
        tenant_id: String,
        client_id: String,
        client_secret: Zeroizing<String>,
        scopes: Vec<String>,
    },
}

impl ConnectionMode {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionMode::StaticToken(_) => "static token",
            ConnectionMode::Interactive(_) => "interactive",
            ConnectionMode::DefaultCredentials { .. } => "default credentials",
            ConnectionMode::ClientCredentials { .. } => "client credentials",
        }
    }
}

impl std::fmt::Debug for ConnectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Process-level settings every provider is built with.
#[derive(Clone)]
pub struct ProviderSettings {
    pub graph_host: String,
    pub authority_host: String,
    /// Persistent token store location; `None` uses the per-user cache directory.
    pub cache_path: Option<PathBuf>,
    pub interactive_timeout: Duration,
    pub device_code_callback: Option<DeviceCodeCallback>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            graph_host: GRAPH_HOST.to_string(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            cache_path: None,
            interactive_timeout: DEFAULT_INTERACTIVE_TIMEOUT,
            device_code_callback: None,
        }
    }
}

impl ProviderSettings {
    fn store(&self) -> FileTokenCacheStore {
        match &self.cache_path {
            Some(path) => FileTokenCacheStore::new(path.clone()),
            None => FileTokenCacheStore::default_location(),
        }
    }

    /// Public client application backed by the persistent store.
    pub fn public_client(
        &self,
        client_id: Option<String>,
        tenant_id: Option<String>,
    ) -> EntraPublicClient {
        let config = EntraClientConfig {
            client_id: non_blank(client_id).unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            tenant_id: non_blank(tenant_id),
            authority_host: self.authority_host.clone(),
        };
        let client = EntraPublicClient::new(config, Arc::new(self.store()));
        match &self.device_code_callback {
            Some(callback) => client.with_device_code_callback(Arc::clone(callback)),
            None => client,
        }
    }

    /// Token acquirer for cache maintenance (listing or removing accounts).
    pub fn acquirer(&self, client_id: Option<String>) -> TokenAcquirer {
        TokenAcquirer::new(
            Arc::new(self.public_client(client_id, None)),
            AcquirerSettings {
                interactive_timeout: self.interactive_timeout,
                use_broker: false,
            },
        )
    }
}

/// The closed set of providers a session can hold.
pub enum GraphAuthProvider {
    Interactive(InteractiveAuthenticationProvider),
    Static(StaticTokenProvider),
    Credential(CredentialAuthenticationProvider),
    Anonymous(AnonymousProvider),
}

impl GraphAuthProvider {
    /// Builds the provider for `mode`. Performs no I/O.
    pub fn from_mode(mode: ConnectionMode, settings: &ProviderSettings) -> AuthResult<Self> {
        let provider = match mode {
            ConnectionMode::StaticToken(token) => {
                GraphAuthProvider::Static(StaticTokenProvider::new(token.as_str())?)
            }
            ConnectionMode::Interactive(options) => {
                let client = settings
                    .public_client(Some(options.client_id.clone()), options.tenant_id.clone());
                let acquirer_settings = AcquirerSettings {
                    interactive_timeout: settings.interactive_timeout,
                    use_broker: options.use_broker,
                };
                GraphAuthProvider::Interactive(
                    InteractiveAuthenticationProvider::new(
                        options,
                        Arc::new(client),
                        acquirer_settings,
                    )
                    .with_graph_host(settings.graph_host.clone()),
                )
            }
            ConnectionMode::DefaultCredentials { tenant_id, scopes } => {
                GraphAuthProvider::Credential(
                    CredentialAuthenticationProvider::new(
                        Arc::new(DefaultCredentialChain::new(tenant_id)),
                        scopes,
                    )
                    .with_graph_host(settings.graph_host.clone()),
                )
            }
            ConnectionMode::ClientCredentials {
                tenant_id,
                client_id,
                client_secret,
                scopes,
            } => {
                let credential =
                    ClientSecretCredential::new(tenant_id, client_id, client_secret.as_str())?
                        .with_authority_host(settings.authority_host.clone())
                        .with_token_store(Arc::new(settings.store()));
                GraphAuthProvider::Credential(
                    CredentialAuthenticationProvider::new(Arc::new(credential), scopes)
                        .with_graph_host(settings.graph_host.clone()),
                )
            }
        };
        log::info!("Configured {} authentication provider", provider.name());
        Ok(provider)
    }

    /// The acquirer behind an interactive provider.
    pub fn acquirer(&self) -> Option<&Arc<TokenAcquirer>> {
        match self {
            GraphAuthProvider::Interactive(provider) => Some(provider.acquirer()),
            _ => None,
        }
    }
}

#[async_trait]
impl AuthenticationProvider for GraphAuthProvider {
    async fn authenticate_request(
        &self,
        request: &mut RequestInformation,
        cancel: &CancellationToken,
    ) -> AuthResult<()> {
        match self {
            GraphAuthProvider::Interactive(p) => p.authenticate_request(request, cancel).await,
            GraphAuthProvider::Static(p) => p.authenticate_request(request, cancel).await,
            GraphAuthProvider::Credential(p) => p.authenticate_request(request, cancel).await,
            GraphAuthProvider::Anonymous(p) => p.authenticate_request(request, cancel).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            GraphAuthProvider::Interactive(p) => p.name(),
            GraphAuthProvider::Static(p) => p.name(),
            GraphAuthProvider::Credential(p) => p.name(),
            GraphAuthProvider::Anonymous(p) => p.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes() -> Vec<String> {
        vec!["User.Read".to_string()]
    }

    #[test]
    fn test_token_wins_over_everything() {
        let options = ConnectOptions {
            token: Some(Zeroizing::new("abc".to_string())),
            username: Some("alice@contoso.com".to_string()),
            use_default_credentials: true,
            ..Default::default()
        };
        assert!(matches!(
            options.resolve().unwrap(),
            ConnectionMode::StaticToken(_)
        ));
    }

    #[test]
    fn test_blank_token_is_ignored() {
        let options = ConnectOptions {
            token: Some(Zeroizing::new("  ".to_string())),
            use_default_credentials: true,
            ..Default::default()
        };
        assert!(matches!(
            options.resolve().unwrap(),
            ConnectionMode::DefaultCredentials { .. }
        ));
    }

    #[test]
    fn test_username_selects_interactive() {
        let options = ConnectOptions {
            username: Some("alice@contoso.com".to_string()),
            scopes: scopes(),
            client_secret: Some(Zeroizing::new("s".to_string())),
            ..Default::default()
        };
        match options.resolve().unwrap() {
            ConnectionMode::Interactive(interactive) => {
                assert_eq!(interactive.username.as_deref(), Some("alice@contoso.com"));
                assert_eq!(interactive.client_id, DEFAULT_CLIENT_ID);
            }
            other => panic!("unexpected mode {other:?}"),
        }
    }

    #[test]
    fn test_interactive_requires_scopes() {
        let options = ConnectOptions {
            interactive: true,
            ..Default::default()
        };
        assert!(matches!(
            options.resolve(),
            Err(AuthError::Configuration(_))
        ));
    }

    #[test]
    fn test_default_credentials_before_client_credentials() {
        let options = ConnectOptions {
            use_default_credentials: true,
            tenant_id: Some("t".to_string()),
            client_id: Some("c".to_string()),
            client_secret: Some(Zeroizing::new("s".to_string())),
            ..Default::default()
        };
        assert!(matches!(
            options.resolve().unwrap(),
            ConnectionMode::DefaultCredentials { .. }
        ));
    }

    #[test]
    fn test_incomplete_client_credentials() {
        let options = ConnectOptions {
            tenant_id: Some("t".to_string()),
            client_secret: Some(Zeroizing::new("s".to_string())),
            ..Default::default()
        };
        let err = options.resolve().unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
        assert!(err.to_string().contains("client id"));
    }

    #[test]
    fn test_nothing_selected_is_configuration_error() {
        assert!(matches!(
            ConnectOptions::default().resolve(),
            Err(AuthError::Configuration(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let options = ConnectOptions {
            client_secret: Some(Zeroizing::new("hunter2".to_string())),
            token: Some(Zeroizing::new("eyJ0".to_string())),
            ..Default::default()
        };
        let debug = format!("{options:?}");
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("eyJ0"));
    }

    #[tokio::test]
    async fn test_from_mode_builds_matching_variant() {
        let settings = ProviderSettings::default();

        let provider = GraphAuthProvider::from_mode(
            ConnectionMode::StaticToken(Zeroizing::new("abc".to_string())),
            &settings,
        )
        .unwrap();
        assert_eq!(provider.name(), "static");
        assert!(provider.acquirer().is_none());

        let provider = GraphAuthProvider::from_mode(
            ConnectionMode::ClientCredentials {
                tenant_id: "t".to_string(),
                client_id: "c".to_string(),
                client_secret: Zeroizing::new("s".to_string()),
                scopes: Vec::new(),
            },
            &settings,
        )
        .unwrap();
        assert_eq!(provider.name(), "credential");
    }
}
