//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use graph_auth::auth::{
    Account, CachedToken, IdentityClient, InteractiveRequest, SilentTarget,
};
use graph_auth::common::{AuthError, AuthResult};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const TENANT_A: &str = "11111111-1111-1111-1111-111111111111";
pub const TENANT_B: &str = "22222222-2222-2222-2222-222222222222";

pub fn account(tenant: &str, username: &str) -> Account {
    Account {
        home_account_id: format!("{username}.{tenant}"),
        tenant_id: tenant.to_string(),
        username: username.to_string(),
        environment: "login.microsoftonline.com".to_string(),
    }
}

pub fn scopes() -> Vec<String> {
    vec!["User.Read".to_string()]
}

/// What silent acquisition answers.
#[derive(Clone)]
pub enum SilentBehavior {
    /// A token valid for the given number of seconds (0 expires immediately).
    Token { token: String, valid_for_secs: i64 },
    InteractionRequired,
    Fail(AuthError),
}

/// What interactive acquisition answers.
#[derive(Clone)]
pub enum InteractiveBehavior {
    Token(String),
    /// Resolves after the delay, measured on the tokio clock.
    Delayed(Duration, String),
    /// Never resolves.
    Hang,
    Fail(AuthError),
}

/// Identity client double that records every call.
pub struct MockIdentityClient {
    pub attach_calls: AtomicUsize,
    pub accounts_calls: AtomicUsize,
    pub silent_calls: AtomicUsize,
    pub interactive_calls: AtomicUsize,
    pub remove_calls: AtomicUsize,
    pub silent_targets: Mutex<Vec<SilentTarget>>,
    pub interactive_requests: Mutex<Vec<InteractiveRequest>>,
    accounts: Vec<Account>,
    silent: SilentBehavior,
    interactive: InteractiveBehavior,
    attach_delay: Duration,
    attach_failures: AtomicUsize,
}

impl MockIdentityClient {
    pub fn new(silent: SilentBehavior, interactive: InteractiveBehavior) -> Self {
        Self {
            attach_calls: AtomicUsize::new(0),
            accounts_calls: AtomicUsize::new(0),
            silent_calls: AtomicUsize::new(0),
            interactive_calls: AtomicUsize::new(0),
            remove_calls: AtomicUsize::new(0),
            silent_targets: Mutex::new(Vec::new()),
            interactive_requests: Mutex::new(Vec::new()),
            accounts: Vec::new(),
            silent,
            interactive,
            attach_delay: Duration::ZERO,
            attach_failures: AtomicUsize::new(0),
        }
    }

    /// Silent acquisition always succeeds with a one hour token.
    pub fn with_silent_token(token: &str) -> Self {
        Self::new(
            SilentBehavior::Token {
                token: token.to_string(),
                valid_for_secs: 3600,
            },
            InteractiveBehavior::Fail(AuthError::AuthenticationFailed(
                "interactive login not expected".to_string(),
            )),
        )
    }

    /// Silent acquisition needs a user; interactive login answers per `interactive`.
    pub fn requiring_interaction(interactive: InteractiveBehavior) -> Self {
        Self::new(SilentBehavior::InteractionRequired, interactive)
    }

    pub fn with_accounts(mut self, accounts: Vec<Account>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn with_attach_delay(mut self, delay: Duration) -> Self {
        self.attach_delay = delay;
        self
    }

    /// The first `failures` attach attempts fail.
    pub fn with_attach_failures(self, failures: usize) -> Self {
        self.attach_failures.store(failures, Ordering::SeqCst);
        self
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn silent_targets(&self) -> Vec<SilentTarget> {
        self.silent_targets.lock().unwrap().clone()
    }

    pub fn interactive_requests(&self) -> Vec<InteractiveRequest> {
        self.interactive_requests.lock().unwrap().clone()
    }
}

fn token_valid_for(token: &str, secs: i64, account: Option<Account>) -> CachedToken {
    CachedToken::new(
        token.to_string(),
        Utc::now() + ChronoDuration::seconds(secs),
        account,
    )
}

#[async_trait]
impl IdentityClient for MockIdentityClient {
    async fn attach_persistent_cache(&self) -> AuthResult<()> {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        if !self.attach_delay.is_zero() {
            tokio::time::sleep(self.attach_delay).await;
        }
        let remaining = self.attach_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.attach_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AuthError::Cache("store unavailable".to_string()));
        }
        Ok(())
    }

    async fn accounts(&self) -> AuthResult<Vec<Account>> {
        self.accounts_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.clone())
    }

    async fn acquire_token_silent(
        &self,
        _scopes: &[String],
        target: &SilentTarget,
        _cancel: &CancellationToken,
    ) -> AuthResult<CachedToken> {
        self.silent_calls.fetch_add(1, Ordering::SeqCst);
        self.silent_targets.lock().unwrap().push(target.clone());

        match &self.silent {
            SilentBehavior::Token {
                token,
                valid_for_secs,
            } => {
                let account = match target {
                    SilentTarget::Account(account) => Some(account.clone()),
                    SilentTarget::LoginHint(_) => None,
                };
                Ok(token_valid_for(token, *valid_for_secs, account))
            }
            SilentBehavior::InteractionRequired => Err(AuthError::InteractionRequired(
                "no refresh token".to_string(),
            )),
            SilentBehavior::Fail(err) => Err(err.clone()),
        }
    }

    async fn acquire_token_interactive(
        &self,
        request: InteractiveRequest,
        _cancel: &CancellationToken,
    ) -> AuthResult<CachedToken> {
        self.interactive_calls.fetch_add(1, Ordering::SeqCst);
        self.interactive_requests.lock().unwrap().push(request);

        match &self.interactive {
            InteractiveBehavior::Token(token) => Ok(token_valid_for(token, 3600, None)),
            InteractiveBehavior::Delayed(delay, token) => {
                tokio::time::sleep(*delay).await;
                Ok(token_valid_for(token, 3600, None))
            }
            InteractiveBehavior::Hang => std::future::pending().await,
            InteractiveBehavior::Fail(err) => Err(err.clone()),
        }
    }

    async fn remove_accounts(&self) -> AuthResult<usize> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.accounts.len())
    }
}
