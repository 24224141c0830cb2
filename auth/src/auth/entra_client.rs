use super::identity_client::{IdentityClient, InteractiveRequest, SilentTarget};
use super::persistent_cache::{CacheSnapshot, TokenCacheStore};
use super::types::{Account, CachedToken, DEFAULT_AUTHORITY_HOST, DEFAULT_CLIENT_ID};
use crate::common::{AuthError, AuthResult, CancellationReason};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Scopes added to every user sign-in so the response carries an id token and a refresh token.
const SIGN_IN_SCOPES: [&str; 3] = ["offline_access", "openid", "profile"];

/// Tenant segment used when no tenant is configured: any work or school account.
const MULTI_TENANT_AUTHORITY: &str = "organizations";

/// Device code prompt shown to the user while the interactive login waits.
#[derive(Clone, Debug)]
pub struct DeviceCodeInfo {
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    pub interval: u64,
    pub message: String,
}

/// Receives the device code prompt. The default implementation logs it.
pub type DeviceCodeCallback = Arc<dyn Fn(&DeviceCodeInfo) + Send + Sync>;

/// Settings of an [`EntraPublicClient`].
#[derive(Clone, Debug)]
pub struct EntraClientConfig {
    pub client_id: String,
    pub tenant_id: Option<String>,
    pub authority_host: String,
}

impl Default for EntraClientConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            tenant_id: None,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
        }
    }
}

/// Public client application for Microsoft Entra ID.
///
/// Silent acquisition serves persisted access tokens and redeems refresh
/// tokens; interactive acquisition runs the OAuth2 device authorization grant,
/// which works in any terminal. Every successful result is written back to the
/// persistent store.
pub struct EntraPublicClient {
    config: EntraClientConfig,
    http_client: reqwest::Client,
    store: Arc<dyn TokenCacheStore>,
    snapshot: RwLock<CacheSnapshot>,
    device_code_callback: DeviceCodeCallback,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    refresh_token: Option<String>,
    id_token: Option<String>,
}

#[derive(Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: u64,
    interval: Option<u64>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
    error_description: Option<String>,
}

impl ErrorResponse {
    fn unparsable(status: reqwest::StatusCode) -> Self {
        Self {
            error: "unknown_error".to_string(),
            error_description: Some(format!("Unexpected response from identity service (HTTP {status})")),
        }
    }

    fn describe(&self) -> String {
        match &self.error_description {
            Some(desc) => format!("{} - {}", self.error, first_line(desc)),
            None => self.error.clone(),
        }
    }
}

#[derive(Deserialize)]
struct IdTokenClaims {
    oid: Option<String>,
    sub: Option<String>,
    tid: Option<String>,
    preferred_username: Option<String>,
    upn: Option<String>,
}

impl EntraPublicClient {
    pub fn new(config: EntraClientConfig, store: Arc<dyn TokenCacheStore>) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            store,
            snapshot: RwLock::new(CacheSnapshot::default()),
            device_code_callback: Arc::new(|info: &DeviceCodeInfo| {
                log::warn!("{}", info.message);
            }),
        }
    }

    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    pub fn with_device_code_callback(mut self, callback: DeviceCodeCallback) -> Self {
        self.device_code_callback = callback;
        self
    }

    pub fn config(&self) -> &EntraClientConfig {
        &self.config
    }

    fn authority_host(&self) -> &str {
        self.config.authority_host.trim_end_matches('/')
    }

    fn environment(&self) -> String {
        reqwest::Url::parse(self.authority_host())
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| self.authority_host().to_string())
    }

    fn tenant<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .or(self.config.tenant_id.as_deref())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(MULTI_TENANT_AUTHORITY)
    }

    fn token_url(&self, tenant: &str) -> String {
        format!("{}/{tenant}/oauth2/v2.0/token", self.authority_host())
    }

    fn device_code_url(&self, tenant: &str) -> String {
        format!("{}/{tenant}/oauth2/v2.0/devicecode", self.authority_host())
    }

    async fn cached_account_for_hint(&self, hint: &str) -> Option<Account> {
        let snapshot = self.snapshot.read().await;
        snapshot
            .accounts(&self.config.client_id)
            .into_iter()
            .find(|account| account.username.eq_ignore_ascii_case(hint))
    }

    async fn persist(
        &self,
        account: &Account,
        refresh_token: Option<String>,
        scopes: &[String],
        token: &CachedToken,
    ) {
        let client_id = self.config.client_id.as_str();
        let mut apply = |snapshot: &mut CacheSnapshot| {
            snapshot.record(client_id, account, refresh_token.clone(), scopes, token);
        };

        // The token is returned even when persisting fails.
        match self.store.update(&mut apply).await {
            Ok(merged) => *self.snapshot.write().await = merged,
            Err(e) => {
                log::warn!("Failed to persist token cache: {e}");
                apply(&mut *self.snapshot.write().await);
            }
        }
    }

    async fn send_token_request(
        &self,
        url: &str,
        params: &[(&str, &str)],
        cancel: &CancellationToken,
    ) -> AuthResult<reqwest::Response> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(AuthError::Cancelled(CancellationReason::CallerCancelled))
            }
            response = self.http_client.post(url).form(params).send() => {
                response.map_err(AuthError::network)
            }
        }
    }

    /// Turns a successful token endpoint response into a token and persists it.
    async fn complete_sign_in(
        &self,
        response: reqwest::Response,
        scopes: &[String],
        known_account: Option<Account>,
    ) -> AuthResult<CachedToken> {
        let token_response: TokenResponse = response.json().await.map_err(|e| {
            AuthError::AuthenticationFailed(format!("Failed to parse token response: {e}"))
        })?;

        let account = match token_response.id_token.as_deref() {
            Some(id_token) => account_from_id_token(id_token, &self.environment())?,
            None => known_account.ok_or_else(|| {
                AuthError::AuthenticationFailed(
                    "Token response did not identify the signed-in account".to_string(),
                )
            })?,
        };

        let token = CachedToken::expiring_in(
            token_response.access_token,
            token_response.expires_in,
            Some(account.clone()),
        );
        self.persist(&account, token_response.refresh_token, scopes, &token)
            .await;

        log::info!(
            "Acquired token for {} (tenant {}), valid until {}",
            account.username,
            account.tenant_id,
            token.expires_on
        );
        Ok(token)
    }

    pub async fn start_device_code_flow(
        &self,
        scopes: &[String],
        tenant_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> AuthResult<(String, DeviceCodeInfo)> {
        let url = self.device_code_url(self.tenant(tenant_id));
        let scope = sign_in_scope(scopes);
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self.send_token_request(&url, &params, cancel).await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_info = response
                .json::<ErrorResponse>()
                .await
                .unwrap_or_else(|_| ErrorResponse::unparsable(status));

            let user_friendly_message = match error_info.error.as_str() {
                "invalid_client" => {
                    "Invalid client configuration. Ensure 'Allow public client flows' is enabled on the app registration.".to_string()
                }
                "invalid_request" => {
                    "Invalid authentication request. Please check your client ID and tenant ID.".to_string()
                }
                "unauthorized_client" => {
                    "This application is not authorized for device code flow.".to_string()
                }
                _ => error_info.describe(),
            };

            if status.is_server_error() {
                return Err(AuthError::Network(user_friendly_message));
            }
            return Err(AuthError::AuthenticationFailed(user_friendly_message));
        }

        let device_code: DeviceCodeResponse = response.json().await.map_err(|e| {
            AuthError::AuthenticationFailed(format!("Failed to parse device code response: {e}"))
        })?;

        let message = device_code.message.unwrap_or_else(|| {
            format!(
                "To sign in, open {} and enter the code {}",
                device_code.verification_uri, device_code.user_code
            )
        });

        Ok((
            device_code.device_code,
            DeviceCodeInfo {
                user_code: device_code.user_code,
                verification_uri: device_code.verification_uri,
                expires_in: device_code.expires_in,
                interval: device_code.interval.unwrap_or(5),
                message,
            },
        ))
    }

    pub async fn poll_device_code_token(
        &self,
        device_code: &str,
        info: &DeviceCodeInfo,
        scopes: &[String],
        tenant_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> AuthResult<CachedToken> {
        let url = self.token_url(self.tenant(tenant_id));
        let mut interval = Duration::from_secs(info.interval);
        let timeout = Duration::from_secs(info.expires_in);
        let start = Instant::now();

        loop {
            if start.elapsed() > timeout {
                return Err(AuthError::Cancelled(CancellationReason::TimedOut {
                    after_secs: info.expires_in,
                }));
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(AuthError::Cancelled(CancellationReason::CallerCancelled));
                }
                _ = tokio::time::sleep(interval) => {}
            }

            let params = [
                ("grant_type", "urn:ietf:params:oauth:grant-type:device_code"),
                ("client_id", self.config.client_id.as_str()),
                ("device_code", device_code),
            ];

            let response = self.send_token_request(&url, &params, cancel).await?;

            if response.status().is_success() {
                return self.complete_sign_in(response, scopes, None).await;
            }

            let status = response.status();
            let error_info = response
                .json::<ErrorResponse>()
                .await
                .unwrap_or_else(|_| ErrorResponse::unparsable(status));

            match error_info.error.as_str() {
                "authorization_pending" => {
                    log::debug!("Waiting for user to complete authentication");
                    continue;
                }
                "slow_down" => {
                    log::debug!("Polling too frequently, increasing interval");
                    interval += Duration::from_secs(5);
                    continue;
                }
                "expired_token" | "code_expired" => {
                    return Err(AuthError::Cancelled(CancellationReason::TimedOut {
                        after_secs: info.expires_in,
                    }));
                }
                "access_denied" | "authorization_declined" => {
                    return Err(AuthError::Cancelled(CancellationReason::UserDeclined));
                }
                _ if status.is_server_error() => {
                    return Err(AuthError::Network(error_info.describe()));
                }
                _ => {
                    return Err(AuthError::AuthenticationFailed(error_info.describe()));
                }
            }
        }
    }
}

#[async_trait]
impl IdentityClient for EntraPublicClient {
    async fn attach_persistent_cache(&self) -> AuthResult<()> {
        let loaded = self.store.load().await?;
        let mut snapshot = self.snapshot.write().await;
        *snapshot = loaded;
        Ok(())
    }

    async fn accounts(&self) -> AuthResult<Vec<Account>> {
        let snapshot = self.snapshot.read().await;
        Ok(snapshot.accounts(&self.config.client_id))
    }

    async fn acquire_token_silent(
        &self,
        scopes: &[String],
        target: &SilentTarget,
        cancel: &CancellationToken,
    ) -> AuthResult<CachedToken> {
        let account = match target {
            SilentTarget::Account(account) => account.clone(),
            SilentTarget::LoginHint(Some(hint)) => {
                self.cached_account_for_hint(hint).await.ok_or_else(|| {
                    AuthError::InteractionRequired(format!("no cached account for {hint}"))
                })?
            }
            SilentTarget::LoginHint(None) => {
                return Err(AuthError::InteractionRequired(
                    "no account or login hint provided".to_string(),
                ));
            }
        };

        let refresh_token = {
            let snapshot = self.snapshot.read().await;
            if let Some(token) =
                snapshot.access_token(&self.config.client_id, &account, scopes, Utc::now())
            {
                log::debug!("Using persisted access token for {}", account.username);
                return Ok(token);
            }
            snapshot
                .entry(&self.config.client_id, &account.home_account_id)
                .and_then(|entry| entry.refresh_token.clone())
        };

        let Some(refresh_token) = refresh_token else {
            return Err(AuthError::InteractionRequired(format!(
                "no refresh token cached for {}",
                account.username
            )));
        };

        let url = self.token_url(self.tenant(Some(&account.tenant_id)));
        let scope = sign_in_scope(scopes);
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("scope", scope.as_str()),
        ];

        let response = self.send_token_request(&url, &params, cancel).await?;
        if response.status().is_success() {
            return self.complete_sign_in(response, scopes, Some(account)).await;
        }

        let status = response.status();
        let error_info = response
            .json::<ErrorResponse>()
            .await
            .unwrap_or_else(|_| ErrorResponse::unparsable(status));

        Err(classify_silent_error(status, &error_info))
    }

    async fn acquire_token_interactive(
        &self,
        request: InteractiveRequest,
        cancel: &CancellationToken,
    ) -> AuthResult<CachedToken> {
        if let Some(handle) = request.parent_window {
            log::debug!("Device code login does not use the broker window {handle:?}");
        }

        let (device_code, info) = self
            .start_device_code_flow(&request.scopes, request.tenant_id.as_deref(), cancel)
            .await?;

        log::info!("Device code authentication initiated - awaiting user action");
        (self.device_code_callback)(&info);

        let token = self
            .poll_device_code_token(
                &device_code,
                &info,
                &request.scopes,
                request.tenant_id.as_deref(),
                cancel,
            )
            .await?;

        if let (Some(hint), Some(account)) = (&request.login_hint, &token.account) {
            if !account.username.eq_ignore_ascii_case(hint) {
                log::warn!(
                    "Signed in as {} although {} was requested",
                    account.username,
                    hint
                );
            }
        }
        Ok(token)
    }

    async fn remove_accounts(&self) -> AuthResult<usize> {
        let client_id = self.config.client_id.as_str();
        let mut removed = 0;
        let merged = self
            .store
            .update(&mut |snapshot: &mut CacheSnapshot| {
                removed = snapshot.remove_client(client_id);
            })
            .await?;
        *self.snapshot.write().await = merged;
        Ok(removed)
    }
}

fn classify_silent_error(status: reqwest::StatusCode, error: &ErrorResponse) -> AuthError {
    match error.error.as_str() {
        "invalid_grant" | "interaction_required" | "consent_required" | "login_required" => {
            AuthError::InteractionRequired(error.describe())
        }
        _ if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS => {
            AuthError::Network(error.describe())
        }
        _ => AuthError::AuthenticationFailed(error.describe()),
    }
}

/// Requested scopes plus the sign-in scopes, space separated, without duplicates.
fn sign_in_scope(scopes: &[String]) -> String {
    let mut all: Vec<&str> = Vec::with_capacity(scopes.len() + SIGN_IN_SCOPES.len());
    for scope in scopes.iter().map(String::as_str).chain(SIGN_IN_SCOPES) {
        if !all.iter().any(|s| s.eq_ignore_ascii_case(scope)) {
            all.push(scope);
        }
    }
    all.join(" ")
}

/// Reads the signed-in identity from an id token's claims. The signature is not checked;
/// the token came straight from the identity service over TLS.
fn account_from_id_token(id_token: &str, environment: &str) -> AuthResult<Account> {
    let invalid = |reason: &str| AuthError::AuthenticationFailed(format!("Invalid id_token: {reason}"));

    let payload = id_token
        .split('.')
        .nth(1)
        .ok_or_else(|| invalid("not a JWT"))?;
    let decoded = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| invalid("payload is not base64url"))?;
    let claims: IdTokenClaims =
        serde_json::from_slice(&decoded).map_err(|_| invalid("payload is not JSON"))?;

    let tenant_id = claims.tid.ok_or_else(|| invalid("missing tid claim"))?;
    let object_id = claims
        .oid
        .or(claims.sub)
        .ok_or_else(|| invalid("missing oid claim"))?;
    let username = claims
        .preferred_username
        .or(claims.upn)
        .unwrap_or_else(|| object_id.clone());

    Ok(Account {
        home_account_id: format!("{object_id}.{tenant_id}"),
        tenant_id,
        username,
        environment: environment.to_string(),
    })
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text).trim()
}
