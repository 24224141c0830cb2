//! Non-interactive credentials: client secret, environment, managed identity
//! and Azure CLI.
//!
//! These back the "default credentials" and "client credentials" connection
//! modes. None of them ever prompts a user.

use super::persistent_cache::{CacheSnapshot, TokenCacheStore};
use super::provider::{AuthenticationProvider, is_allowed_host, require_host, set_bearer_token};
use super::request::RequestInformation;
use super::token_cache::MemoryTokenCache;
use super::types::{
    CachedToken, DEFAULT_AUTHORITY_HOST, DEFAULT_CREDENTIAL_SCOPE, GRAPH_HOST, TokenCacheKey,
    non_blank,
};
use crate::common::{AuthError, AuthResult, CancellationReason};
use crate::utils::env::{
    AZURE_CLIENT_ID, AZURE_CLIENT_SECRET, AZURE_TENANT_ID, EnvUtils, IDENTITY_ENDPOINT,
    IDENTITY_HEADER,
};
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use zeroize::Zeroizing;

/// Azure Instance Metadata Service token endpoint.
pub const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
/// The IMDS address is link-local; off Azure a connect attempt only ends at this timeout.
const MANAGED_IDENTITY_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);
const MANAGED_IDENTITY_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that can produce an access token without user interaction.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(
        &self,
        scopes: &[String],
        cancel: &CancellationToken,
    ) -> AuthResult<CachedToken>;

    fn name(&self) -> &'static str;
}

#[derive(Deserialize)]
struct ClientCredentialsResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct ClientCredentialsError {
    error: String,
    error_description: Option<String>,
}

/// OAuth2 client credentials grant with an application secret.
///
/// With a token store attached, issued tokens are shared with later processes
/// under the client id and tenant until they expire.
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: Zeroizing<String>,
    authority_host: String,
    http_client: reqwest::Client,
    store: Option<Arc<dyn TokenCacheStore>>,
}

impl ClientSecretCredential {
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] when any of the three values is blank.
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> AuthResult<Self> {
        let tenant_id = non_blank(Some(tenant_id.into()));
        let client_id = non_blank(Some(client_id.into()));
        let client_secret = Zeroizing::new(client_secret.into());

        match (tenant_id, client_id) {
            (Some(tenant_id), Some(client_id)) if !client_secret.trim().is_empty() => Ok(Self {
                tenant_id,
                client_id,
                client_secret,
                authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
                http_client: reqwest::Client::new(),
                store: None,
            }),
            _ => Err(AuthError::Configuration(
                "Not all parameters for client credentials are specified: tenant id, client id and client secret are required".to_string(),
            )),
        }
    }

    pub fn with_authority_host(mut self, authority_host: impl Into<String>) -> Self {
        self.authority_host = authority_host.into();
        self
    }

    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    pub fn with_token_store(mut self, store: Arc<dyn TokenCacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }

    async fn stored_token(&self, scopes: &[String]) -> Option<CachedToken> {
        let store = self.store.as_ref()?;
        match store.load().await {
            Ok(snapshot) => {
                snapshot.app_token(&self.client_id, &self.tenant_id, scopes, Utc::now())
            }
            Err(e) => {
                log::warn!("Failed to read token cache: {e}");
                None
            }
        }
    }

    async fn store_token(&self, scopes: &[String], token: &CachedToken) {
        let Some(store) = &self.store else {
            return;
        };
        let mut apply = |snapshot: &mut CacheSnapshot| {
            snapshot.record_app_token(&self.client_id, &self.tenant_id, scopes, token);
        };
        if let Err(e) = store.update(&mut apply).await {
            log::warn!("Failed to persist client credentials token: {e}");
        }
    }

    async fn request_token(
        &self,
        scopes: &[String],
        cancel: &CancellationToken,
    ) -> AuthResult<CachedToken> {
        let scope = scopes.join(" ");
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        log::debug!(
            "Requesting client credentials token for client {} in tenant {}",
            self.client_id,
            self.tenant_id
        );

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(AuthError::Cancelled(CancellationReason::CallerCancelled));
            }
            response = self.http_client.post(self.token_url()).form(&params).send() => {
                response.map_err(AuthError::network)?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_client_credentials_error(status, &body));
        }

        let token: ClientCredentialsResponse = response.json().await.map_err(|e| {
            AuthError::AuthenticationFailed(format!("Failed to parse token response: {e}"))
        })?;

        Ok(CachedToken::expiring_in(
            token.access_token,
            token.expires_in,
            None,
        ))
    }
}

impl std::fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        cancel: &CancellationToken,
    ) -> AuthResult<CachedToken> {
        if let Some(token) = self.stored_token(scopes).await {
            log::debug!(
                "Using stored client credentials token valid until {}",
                token.expires_on
            );
            return Ok(token);
        }

        let token = self.request_token(scopes, cancel).await?;
        self.store_token(scopes, &token).await;
        Ok(token)
    }

    fn name(&self) -> &'static str {
        "client-secret"
    }
}

fn classify_client_credentials_error(status: reqwest::StatusCode, body: &str) -> AuthError {
    if status.is_server_error() {
        return AuthError::Network(format!("Identity service returned HTTP {status}"));
    }

    match serde_json::from_str::<ClientCredentialsError>(body) {
        Ok(error) if error.error == "invalid_client" || error.error == "unauthorized_client" => {
            AuthError::AuthenticationFailed(format!(
                "{}: the client secret or client id was rejected",
                error.error
            ))
        }
        Ok(error) => AuthError::AuthenticationFailed(match error.error_description {
            Some(desc) => format!("{} - {}", error.error, desc.lines().next().unwrap_or_default()),
            None => error.error,
        }),
        Err(_) => AuthError::AuthenticationFailed(format!(
            "Token request failed with status {status}"
        )),
    }
}

/// Client secret credential configured from `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`
/// and `AZURE_CLIENT_SECRET`.
pub struct EnvironmentCredential {
    inner: Option<ClientSecretCredential>,
}

impl EnvironmentCredential {
    pub fn from_env() -> Self {
        let inner = match (
            EnvUtils::get_optional_var(AZURE_TENANT_ID),
            EnvUtils::get_optional_var(AZURE_CLIENT_ID),
            EnvUtils::get_optional_var(AZURE_CLIENT_SECRET),
        ) {
            (Some(tenant), Some(client), Some(secret)) => {
                ClientSecretCredential::new(tenant, client, secret).ok()
            }
            _ => None,
        };
        Self { inner }
    }
}

#[async_trait]
impl TokenCredential for EnvironmentCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        cancel: &CancellationToken,
    ) -> AuthResult<CachedToken> {
        match &self.inner {
            Some(credential) => credential.get_token(scopes, cancel).await,
            None => Err(AuthError::AuthenticationFailed(format!(
                "environment variables are not fully configured ({AZURE_TENANT_ID}, {AZURE_CLIENT_ID}, {AZURE_CLIENT_SECRET})"
            ))),
        }
    }

    fn name(&self) -> &'static str {
        "environment"
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureCliToken {
    access_token: String,
    expires_on: Option<String>,
    #[serde(rename = "expires_on")]
    expires_on_unix: Option<i64>,
}

/// Borrows the token of the account signed in to the Azure CLI (`az login`).
#[derive(Clone, Debug, Default)]
pub struct AzureCliCredential {
    tenant_id: Option<String>,
}

impl AzureCliCredential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant_id(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = non_blank(tenant_id);
        self
    }

    fn command(&self, scope: &str) -> tokio::process::Command {
        let program = if cfg!(windows) { "az.cmd" } else { "az" };
        let mut command = tokio::process::Command::new(program);
        command.args(["account", "get-access-token", "--output", "json", "--scope", scope]);
        if let Some(tenant) = &self.tenant_id {
            command.args(["--tenant", tenant]);
        }
        command.kill_on_drop(true);
        command
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        cancel: &CancellationToken,
    ) -> AuthResult<CachedToken> {
        let scope = scopes.first().ok_or_else(|| {
            AuthError::Configuration("At least one scope is required".to_string())
        })?;

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(AuthError::Cancelled(CancellationReason::CallerCancelled));
            }
            output = self.command(scope).output() => output,
        };

        let output = match output {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::AuthenticationFailed(
                    "Azure CLI not found on PATH".to_string(),
                ));
            }
            Err(e) => {
                return Err(AuthError::AuthenticationFailed(format!(
                    "Failed to run Azure CLI: {e}"
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.contains("az login") {
                "Azure CLI is not signed in, run `az login`".to_string()
            } else {
                stderr.lines().next().unwrap_or("unknown error").trim().to_string()
            };
            return Err(AuthError::AuthenticationFailed(format!(
                "Azure CLI failed: {message}"
            )));
        }

        parse_cli_token(&output.stdout)
    }

    fn name(&self) -> &'static str {
        "azure-cli"
    }
}

fn parse_cli_token(stdout: &[u8]) -> AuthResult<CachedToken> {
    let token: AzureCliToken = serde_json::from_slice(stdout).map_err(|e| {
        AuthError::AuthenticationFailed(format!("Unexpected Azure CLI output: {e}"))
    })?;

    let expires_on = match (token.expires_on_unix, token.expires_on.as_deref()) {
        (Some(unix), _) => DateTime::<Utc>::from_timestamp(unix, 0),
        (None, Some(local)) => parse_cli_local_time(local),
        (None, None) => None,
    }
    .ok_or_else(|| {
        AuthError::AuthenticationFailed("Azure CLI token has no valid expiry".to_string())
    })?;

    Ok(CachedToken::new(token.access_token, expires_on, None))
}

/// Older CLI versions only report `expiresOn` in local time, e.g. `2024-01-01 12:00:00.000000`.
fn parse_cli_local_time(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

enum ManagedIdentitySource {
    /// App Service style endpoint guarded by a per-host secret header.
    AppService {
        endpoint: String,
        header: Zeroizing<String>,
    },
    Imds {
        endpoint: String,
    },
}

#[derive(Deserialize)]
struct ManagedIdentityToken {
    access_token: String,
    /// Unix seconds; IMDS sends a string, App Service a number or a string.
    expires_on: Option<serde_json::Value>,
    expires_in: Option<serde_json::Value>,
}

fn json_seconds(value: Option<&serde_json::Value>) -> Option<i64> {
    match value? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Token of the Azure resource this process runs on.
///
/// Uses `IDENTITY_ENDPOINT`/`IDENTITY_HEADER` when the host injects them and
/// the Instance Metadata Service otherwise. A user-assigned identity is
/// selected by client id.
pub struct ManagedIdentityCredential {
    source: ManagedIdentitySource,
    client_id: Option<String>,
    http_client: reqwest::Client,
}

impl ManagedIdentityCredential {
    /// Picks the endpoint from the environment; `AZURE_CLIENT_ID` selects a user-assigned identity.
    pub fn from_env() -> Self {
        let credential = match (
            EnvUtils::get_optional_var(IDENTITY_ENDPOINT),
            EnvUtils::get_optional_var(IDENTITY_HEADER),
        ) {
            (Some(endpoint), Some(header)) => Self::app_service(endpoint, header),
            (Some(_), None) => {
                log::warn!("{IDENTITY_ENDPOINT} is set without {IDENTITY_HEADER}; using IMDS");
                Self::imds()
            }
            _ => Self::imds(),
        };
        credential.with_client_id(EnvUtils::get_optional_var(AZURE_CLIENT_ID))
    }

    pub fn app_service(endpoint: impl Into<String>, header: impl Into<String>) -> Self {
        Self::with_source(ManagedIdentitySource::AppService {
            endpoint: endpoint.into(),
            header: Zeroizing::new(header.into()),
        })
    }

    pub fn imds() -> Self {
        Self::imds_at(IMDS_TOKEN_ENDPOINT)
    }

    pub fn imds_at(endpoint: impl Into<String>) -> Self {
        Self::with_source(ManagedIdentitySource::Imds {
            endpoint: endpoint.into(),
        })
    }

    fn with_source(source: ManagedIdentitySource) -> Self {
        let http_client = reqwest::Client::builder()
            .connect_timeout(MANAGED_IDENTITY_CONNECT_TIMEOUT)
            .timeout(MANAGED_IDENTITY_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Failed to build managed identity HTTP client: {e}");
                reqwest::Client::new()
            });
        Self {
            source,
            client_id: None,
            http_client,
        }
    }

    pub fn with_client_id(mut self, client_id: Option<String>) -> Self {
        self.client_id = non_blank(client_id);
        self
    }

    fn request(&self, resource: &str) -> reqwest::RequestBuilder {
        let (endpoint, api_version) = match &self.source {
            ManagedIdentitySource::AppService { endpoint, .. } => {
                (endpoint.as_str(), APP_SERVICE_API_VERSION)
            }
            ManagedIdentitySource::Imds { endpoint } => (endpoint.as_str(), IMDS_API_VERSION),
        };

        let mut query = vec![("api-version", api_version), ("resource", resource)];
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }

        let request = self.http_client.get(endpoint).query(&query);
        match &self.source {
            ManagedIdentitySource::AppService { header, .. } => {
                request.header("X-IDENTITY-HEADER", header.as_str())
            }
            ManagedIdentitySource::Imds { .. } => request.header("Metadata", "true"),
        }
    }
}

impl std::fmt::Debug for ManagedIdentityCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            ManagedIdentitySource::AppService { .. } => "app-service",
            ManagedIdentitySource::Imds { .. } => "imds",
        };
        f.debug_struct("ManagedIdentityCredential")
            .field("source", &source)
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(
        &self,
        scopes: &[String],
        cancel: &CancellationToken,
    ) -> AuthResult<CachedToken> {
        let scope = scopes.first().ok_or_else(|| {
            AuthError::Configuration("At least one scope is required".to_string())
        })?;
        let resource = scope.strip_suffix("/.default").unwrap_or(scope);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(AuthError::Cancelled(CancellationReason::CallerCancelled));
            }
            response = self.request(resource).send() => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return Err(AuthError::AuthenticationFailed(format!(
                    "managed identity endpoint unreachable: {e}"
                )));
            }
            Err(e) => return Err(AuthError::network(e)),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(AuthError::Network(format!(
                    "Managed identity endpoint returned HTTP {status}"
                )));
            }
            let detail = serde_json::from_str::<ClientCredentialsError>(&body)
                .map(|error| error.error_description.unwrap_or(error.error))
                .unwrap_or_else(|_| format!("HTTP {status}"));
            return Err(AuthError::AuthenticationFailed(format!(
                "managed identity unavailable: {}",
                detail.lines().next().unwrap_or_default()
            )));
        }

        let token: ManagedIdentityToken = response.json().await.map_err(|e| {
            AuthError::AuthenticationFailed(format!("Unexpected managed identity response: {e}"))
        })?;

        let expires_on = json_seconds(token.expires_on.as_ref())
            .and_then(|unix| DateTime::<Utc>::from_timestamp(unix, 0))
            .or_else(|| {
                json_seconds(token.expires_in.as_ref())
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
            })
            .ok_or_else(|| {
                AuthError::AuthenticationFailed(
                    "Managed identity token has no valid expiry".to_string(),
                )
            })?;

        Ok(CachedToken::new(token.access_token, expires_on, None))
    }

    fn name(&self) -> &'static str {
        "managed-identity"
    }
}

/// Tries each credential in turn and sticks with the first one that works.
pub struct DefaultCredentialChain {
    sources: Vec<Arc<dyn TokenCredential>>,
    selected: RwLock<Option<usize>>,
}

impl DefaultCredentialChain {
    /// Environment variables, then managed identity, then the Azure CLI.
    pub fn new(tenant_id: Option<String>) -> Self {
        let environment: Arc<dyn TokenCredential> = Arc::new(EnvironmentCredential::from_env());
        let managed_identity: Arc<dyn TokenCredential> =
            Arc::new(ManagedIdentityCredential::from_env());
        let cli: Arc<dyn TokenCredential> =
            Arc::new(AzureCliCredential::new().with_tenant_id(tenant_id));
        Self::with_sources(vec![environment, managed_identity, cli])
    }

    pub fn with_sources(sources: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self {
            sources,
            selected: RwLock::new(None),
        }
    }

    /// Names of the sources in the order they are tried.
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|source| source.name()).collect()
    }
}

#[async_trait]
impl TokenCredential for DefaultCredentialChain {
    async fn get_token(
        &self,
        scopes: &[String],
        cancel: &CancellationToken,
    ) -> AuthResult<CachedToken> {
        if let Some(index) = *self.selected.read().await {
            return self.sources[index].get_token(scopes, cancel).await;
        }

        let mut attempts = Vec::with_capacity(self.sources.len());
        for (index, source) in self.sources.iter().enumerate() {
            match source.get_token(scopes, cancel).await {
                Ok(token) => {
                    log::info!("Default credentials resolved using {}", source.name());
                    *self.selected.write().await = Some(index);
                    return Ok(token);
                }
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    log::debug!("Credential {} unavailable: {e}", source.name());
                    attempts.push(format!("{}: {e}", source.name()));
                }
            }
        }

        Err(AuthError::AuthenticationFailed(format!(
            "No default credential succeeded. Attempts: [{}]",
            attempts.join("; ")
        )))
    }

    fn name(&self) -> &'static str {
        "default-chain"
    }
}

/// Host-scoped provider for any [`TokenCredential`].
pub struct CredentialAuthenticationProvider {
    credential: Arc<dyn TokenCredential>,
    scopes: Vec<String>,
    graph_host: String,
    memory: MemoryTokenCache,
}

impl CredentialAuthenticationProvider {
    /// Empty `scopes` fall back to `https://graph.microsoft.com/.default`.
    pub fn new(credential: Arc<dyn TokenCredential>, scopes: Vec<String>) -> Self {
        let scopes = if scopes.iter().all(|s| s.trim().is_empty()) {
            vec![DEFAULT_CREDENTIAL_SCOPE.to_string()]
        } else {
            scopes
        };
        Self {
            credential,
            scopes,
            graph_host: GRAPH_HOST.to_string(),
            memory: MemoryTokenCache::new(),
        }
    }

    pub fn with_graph_host(mut self, graph_host: impl Into<String>) -> Self {
        self.graph_host = graph_host.into();
        self
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

#[async_trait]
impl AuthenticationProvider for CredentialAuthenticationProvider {
    async fn authenticate_request(
        &self,
        request: &mut RequestInformation,
        cancel: &CancellationToken,
    ) -> AuthResult<()> {
        let host = require_host(request)?;
        if !is_allowed_host(host, &self.graph_host) {
            log::trace!("Not attaching credentials to request for host {host}");
            return Ok(());
        }

        let key = TokenCacheKey::new(&self.scopes, None, Some(self.credential.name()));
        let token = match self.memory.get(&key).await {
            Some(token) => token,
            None => {
                let token = Arc::new(self.credential.get_token(&self.scopes, cancel).await?);
                self.memory.set(key, Arc::clone(&token)).await;
                token
            }
        };

        set_bearer_token(request, &token.access_token)
    }

    fn name(&self) -> &'static str {
        "credential"
    }
}
