use super::broker;
use super::identity_client::{IdentityClient, InteractiveRequest, SilentTarget};
use super::token_cache::MemoryTokenCache;
use super::types::{
    Account, CachedToken, DEFAULT_INTERACTIVE_TIMEOUT, TokenCacheKey, is_tenant_identifier,
};
use crate::common::{AuthError, AuthResult, CancellationReason};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

type SharedLogin = Shared<BoxFuture<'static, AuthResult<Arc<CachedToken>>>>;
type InFlightLogins = Mutex<HashMap<TokenCacheKey, InFlightLogin>>;

/// An interactive login shared by every caller waiting on the same key.
///
/// The login runs under its own token, cancelled only once the last waiter
/// has gone.
struct InFlightLogin {
    id: u64,
    login: SharedLogin,
    cancel: CancellationToken,
    waiters: usize,
}

fn lock_logins(
    in_flight: &InFlightLogins,
) -> MutexGuard<'_, HashMap<TokenCacheKey, InFlightLogin>> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registration of one caller on an in-flight login, released on drop.
struct LoginWaiter<'a> {
    in_flight: &'a InFlightLogins,
    key: TokenCacheKey,
    id: u64,
}

impl Drop for LoginWaiter<'_> {
    fn drop(&mut self) {
        let mut in_flight = lock_logins(self.in_flight);
        let Some(entry) = in_flight.get_mut(&self.key) else {
            return;
        };
        if entry.id != self.id {
            return;
        }
        entry.waiters = entry.waiters.saturating_sub(1);
        if entry.waiters == 0 {
            if entry.login.peek().is_none() {
                log::debug!("Last waiter left; abandoning interactive login");
                entry.cancel.cancel();
            }
            in_flight.remove(&self.key);
        }
    }
}

/// Progress of the one-time persistent cache attach.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheState {
    Uninitialized,
    CacheLoading,
    Ready,
}

impl CacheState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CacheState::CacheLoading,
            2 => CacheState::Ready,
            _ => CacheState::Uninitialized,
        }
    }
}

/// Tunables for [`TokenAcquirer`].
#[derive(Clone, Debug)]
pub struct AcquirerSettings {
    /// Hard bound on an interactive login, independent of the caller's cancellation.
    pub interactive_timeout: Duration,
    /// Hand the console window to the login broker when one exists.
    pub use_broker: bool,
}

impl Default for AcquirerSettings {
    fn default() -> Self {
        Self {
            interactive_timeout: DEFAULT_INTERACTIVE_TIMEOUT,
            use_broker: cfg!(windows),
        }
    }
}

/// Silent-first token acquisition with interactive fallback.
///
/// Each acquisition walks `memory -> persistent cache (silent) -> interactive`.
/// The persistent cache is attached to the identity client exactly once, no
/// matter how many callers race on the first request, and concurrent
/// interactive logins for the same request share one in-flight prompt.
///
/// # Examples
///
/// ```no_run
/// use graph_auth::auth::token_acquirer::{AcquirerSettings, TokenAcquirer};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn demo(client: std::sync::Arc<dyn graph_auth::auth::IdentityClient>) -> graph_auth::common::AuthResult<()> {
/// let acquirer = TokenAcquirer::new(client, AcquirerSettings::default());
/// let token = acquirer
///     .acquire_token(&["User.Read".to_string()], None, Some("admin@contoso.com"), &CancellationToken::new())
///     .await?;
/// println!("token valid until {}", token.expires_on);
/// # Ok(())
/// # }
/// ```
pub struct TokenAcquirer {
    client: Arc<dyn IdentityClient>,
    settings: AcquirerSettings,
    cache_loaded: OnceCell<()>,
    cache_state: AtomicU8,
    memory: MemoryTokenCache,
    in_flight: InFlightLogins,
    next_login_id: AtomicU64,
}

impl TokenAcquirer {
    pub fn new(client: Arc<dyn IdentityClient>, settings: AcquirerSettings) -> Self {
        Self {
            client,
            settings,
            cache_loaded: OnceCell::new(),
            cache_state: AtomicU8::new(0),
            memory: MemoryTokenCache::new(),
            in_flight: Mutex::new(HashMap::new()),
            next_login_id: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &AcquirerSettings {
        &self.settings
    }

    pub fn cache_state(&self) -> CacheState {
        CacheState::from_u8(self.cache_state.load(Ordering::Acquire))
    }

    /// Attaches the persistent cache to the identity client once per acquirer.
    ///
    /// Concurrent first callers wait for the single load; later callers return
    /// immediately. A failed load leaves the state uninitialized so the next
    /// caller retries.
    pub async fn ensure_cache_loaded(&self) -> AuthResult<()> {
        if self.cache_loaded.initialized() {
            return Ok(());
        }

        self.cache_loaded
            .get_or_try_init(|| async {
                self.cache_state.store(1, Ordering::Release);
                log::debug!("Attaching persistent token cache");
                match self.client.attach_persistent_cache().await {
                    Ok(()) => {
                        self.cache_state.store(2, Ordering::Release);
                        Ok(())
                    }
                    Err(e) => {
                        self.cache_state.store(0, Ordering::Release);
                        log::warn!("Failed to attach persistent token cache: {e}");
                        Err(e)
                    }
                }
            })
            .await
            .map(|_| ())
    }

    /// Returns a token for `scopes`, signing the user in only when nothing cached works.
    ///
    /// `tenant_id` narrows account selection only when it is a GUID; `user_id` is
    /// matched case-insensitively against cached usernames and used as login hint.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Cancelled`] when the caller cancels or the interactive login times out
    /// - [`AuthError::Network`] / [`AuthError::AuthenticationFailed`] from silent
    ///   acquisition, which never fall through to interactive login
    pub async fn acquire_token(
        &self,
        scopes: &[String],
        tenant_id: Option<&str>,
        user_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> AuthResult<Arc<CachedToken>> {
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled(CancellationReason::CallerCancelled));
        }

        self.ensure_cache_loaded().await?;

        let key = TokenCacheKey::new(scopes, tenant_id, user_id);
        if let Some(token) = self.memory.get(&key).await {
            log::trace!("Using in-memory token valid until {}", token.expires_on);
            return Ok(token);
        }

        let accounts = self.client.accounts().await?;
        let account = select_account(&accounts, tenant_id, user_id).cloned();
        let target = match &account {
            Some(account) => {
                log::debug!(
                    "Acquiring token silently for {} in tenant {}",
                    account.username,
                    account.tenant_id
                );
                SilentTarget::Account(account.clone())
            }
            None => {
                log::debug!("No cached account matched; trying silent login with hint");
                SilentTarget::LoginHint(user_id.map(str::to_string))
            }
        };

        let silent = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(AuthError::Cancelled(CancellationReason::CallerCancelled))
            }
            result = self.client.acquire_token_silent(scopes, &target, cancel) => result,
        };

        match silent {
            Ok(token) => {
                let token = Arc::new(token);
                self.memory.set(key, token.clone()).await;
                Ok(token)
            }
            Err(AuthError::InteractionRequired(reason)) => {
                log::info!("Silent token acquisition needs user interaction: {reason}");
                let login_hint = account
                    .map(|a| a.username)
                    .or_else(|| user_id.map(str::to_string));
                let request = self.interactive_request(scopes, tenant_id, login_hint);
                self.run_interactive(key, request, cancel).await
            }
            Err(e) => Err(e),
        }
    }

    /// Signs the user in interactively, bypassing every cache lookup.
    ///
    /// The login is bounded by [`AcquirerSettings::interactive_timeout`] and by
    /// `cancel`, whichever fires first. Both surface as
    /// [`AuthError::Cancelled`], never as an authentication failure.
    pub async fn acquire_token_interactive(
        &self,
        scopes: &[String],
        tenant_id: Option<&str>,
        user_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> AuthResult<Arc<CachedToken>> {
        let key = TokenCacheKey::new(scopes, tenant_id, user_id);
        let request = self.interactive_request(scopes, tenant_id, user_id.map(str::to_string));
        self.run_interactive(key, request, cancel).await
    }

    /// Accounts currently held by the persistent cache.
    pub async fn accounts(&self) -> AuthResult<Vec<Account>> {
        self.ensure_cache_loaded().await?;
        self.client.accounts().await
    }

    /// Drops every in-memory token and removes all cached accounts.
    pub async fn sign_out(&self) -> AuthResult<usize> {
        self.ensure_cache_loaded().await?;
        self.memory.clear().await;
        let removed = self.client.remove_accounts().await?;
        log::info!("Removed {removed} cached account(s)");
        Ok(removed)
    }

    fn interactive_request(
        &self,
        scopes: &[String],
        tenant_id: Option<&str>,
        login_hint: Option<String>,
    ) -> InteractiveRequest {
        InteractiveRequest {
            scopes: scopes.to_vec(),
            tenant_id: tenant_id
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            login_hint: login_hint.filter(|h| !h.trim().is_empty()),
            parent_window: broker::parent_window_for(self.settings.use_broker),
        }
    }

    async fn run_interactive(
        &self,
        key: TokenCacheKey,
        request: InteractiveRequest,
        cancel: &CancellationToken,
    ) -> AuthResult<Arc<CachedToken>> {
        self.ensure_cache_loaded().await?;

        let (login, _waiter) = {
            let mut in_flight = lock_logins(&self.in_flight);
            let entry = match in_flight.entry(key.clone()) {
                Entry::Occupied(occupied) if occupied.get().login.peek().is_none() => {
                    log::debug!("Joining interactive login already in progress");
                    occupied.into_mut()
                }
                Entry::Occupied(mut finished) => {
                    finished.insert(self.start_login(key.clone(), request));
                    finished.into_mut()
                }
                Entry::Vacant(vacant) => vacant.insert(self.start_login(key.clone(), request)),
            };
            entry.waiters += 1;
            let waiter = LoginWaiter {
                in_flight: &self.in_flight,
                key,
                id: entry.id,
            };
            (entry.login.clone(), waiter)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(AuthError::Cancelled(CancellationReason::CallerCancelled))
            }
            result = login => result,
        }
    }

    fn start_login(&self, key: TokenCacheKey, request: InteractiveRequest) -> InFlightLogin {
        let cancel = CancellationToken::new();
        let login = interactive_login(
            self.client.clone(),
            self.memory.clone(),
            key,
            request,
            self.settings.interactive_timeout,
            cancel.clone(),
        )
        .boxed()
        .shared();
        InFlightLogin {
            id: self.next_login_id.fetch_add(1, Ordering::Relaxed),
            login,
            cancel,
            waiters: 0,
        }
    }
}

/// One interactive login, bounded by `timeout` and by the login's own token.
async fn interactive_login(
    client: Arc<dyn IdentityClient>,
    memory: MemoryTokenCache,
    key: TokenCacheKey,
    request: InteractiveRequest,
    timeout: Duration,
    cancel: CancellationToken,
) -> AuthResult<Arc<CachedToken>> {
    log::info!(
        "Acquiring token interactively for scopes {:?} (tenant: {}, hint: {})",
        request.scopes,
        request.tenant_id.as_deref().unwrap_or("<default>"),
        request.login_hint.as_deref().unwrap_or("<none>")
    );

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            Err(AuthError::Cancelled(CancellationReason::CallerCancelled))
        }
        outcome = tokio::time::timeout(
            timeout,
            client.acquire_token_interactive(request, &cancel),
        ) => match outcome {
            Ok(result) => result,
            Err(_) => {
                log::warn!("Interactive login timed out after {}s", timeout.as_secs());
                Err(AuthError::Cancelled(CancellationReason::TimedOut {
                    after_secs: timeout.as_secs(),
                }))
            }
        },
    };

    let token = Arc::new(result?);
    memory.set(key, token.clone()).await;
    Ok(token)
}

/// Picks the cached account to reuse for a request.
///
/// Tenant filtering applies only when `tenant_id` is a GUID; domain names and
/// other strings skip it. The username comparison ignores case. If several
/// accounts match, the first wins.
pub fn select_account<'a>(
    accounts: &'a [Account],
    tenant_id: Option<&str>,
    user_id: Option<&str>,
) -> Option<&'a Account> {
    let tenant = tenant_id
        .map(str::trim)
        .filter(|t| !t.is_empty() && is_tenant_identifier(t));
    let user = user_id.map(str::trim).filter(|u| !u.is_empty());

    let mut matching = accounts.iter().filter(|account| {
        tenant.is_none_or(|t| account.tenant_id.eq_ignore_ascii_case(t))
            && user.is_none_or(|u| account.username.eq_ignore_ascii_case(u))
    });

    let selected = matching.next();
    if let Some(account) = selected {
        if matching.next().is_some() {
            log::warn!(
                "Several cached accounts match the request; using {}",
                account.username
            );
        }
    }
    selected
}
