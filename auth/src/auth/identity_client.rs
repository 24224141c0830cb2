use super::broker::WindowHandle;
use super::types::{Account, CachedToken};
use crate::common::AuthResult;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Who a silent acquisition should be performed for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SilentTarget {
    /// A cached account enumerated from the persistent store.
    Account(Account),
    /// No cached account matched; let the client resolve the bare login hint, if any.
    LoginHint(Option<String>),
}

/// Parameters of an interactive login.
#[derive(Clone, Debug, Default)]
pub struct InteractiveRequest {
    pub scopes: Vec<String>,
    pub tenant_id: Option<String>,
    pub login_hint: Option<String>,
    /// Window the OS-native login UI should parent itself to.
    pub parent_window: Option<WindowHandle>,
}

/// The identity library the acquirer drives.
///
/// Implementations own the in-memory token cache of the public client
/// application and know how to attach the durable store to it.
///
/// Silent acquisition must report "a user has to sign in" as
/// [`AuthError::InteractionRequired`](crate::common::AuthError::InteractionRequired)
/// and nothing else; every other failure (network, consent, ...) propagates.
#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Loads the persistent store into the client's in-memory cache.
    ///
    /// The acquirer calls this at most once per client unless it fails.
    async fn attach_persistent_cache(&self) -> AuthResult<()>;

    /// Accounts known to the client, enumerated from the persistent store.
    async fn accounts(&self) -> AuthResult<Vec<Account>>;

    async fn acquire_token_silent(
        &self,
        scopes: &[String],
        target: &SilentTarget,
        cancel: &CancellationToken,
    ) -> AuthResult<CachedToken>;

    /// Runs the user-facing login. The caller bounds how long this may take.
    async fn acquire_token_interactive(
        &self,
        request: InteractiveRequest,
        cancel: &CancellationToken,
    ) -> AuthResult<CachedToken>;

    /// Forgets every cached account, returning how many were removed.
    async fn remove_accounts(&self) -> AuthResult<usize>;
}
