use crate::common::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Well-known public client id used when the caller does not register its own app.
pub const DEFAULT_CLIENT_ID: &str = "6fb61555-6571-4835-8f61-23bcce62844d";

/// Host that receives bearer tokens. Requests to any other host pass through untouched.
pub const GRAPH_HOST: &str = "graph.microsoft.com";

/// Default Microsoft Entra ID authority.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Scope requested by credential-based flows when none is given.
pub const DEFAULT_CREDENTIAL_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Upper bound on how long an interactive login may wait for the user.
pub const DEFAULT_INTERACTIVE_TIMEOUT: Duration = Duration::from_secs(120);

// Identity services never issue tokens living longer than a day; clamp anything odd.
const MAX_TOKEN_LIFETIME_SECS: i64 = 24 * 60 * 60;

/// Configuration for the interactive (public client) login flow.
///
/// Captured once when the provider is built and never mutated afterwards.
///
/// # Required Fields
///
/// - `scopes` - at least one scope, e.g. `User.Read`
///
/// # Optional Fields
///
/// - `tenant_id` - restricts login to one tenant; multi-tenant organizations otherwise
/// - `client_id` - defaults to [`DEFAULT_CLIENT_ID`]
/// - `username` - login hint, also used to pick a cached account
/// - `use_broker` - prefer the OS-native login broker (Windows only)
///
/// # Examples
///
/// ```no_run
/// use graph_auth::auth::types::InteractiveOptions;
///
/// let options = InteractiveOptions::new(vec!["User.Read".to_string()])?
///     .with_username(Some("admin@contoso.com".to_string()))
///     .with_tenant_id(Some("contoso.onmicrosoft.com".to_string()));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InteractiveOptions {
    pub scopes: Vec<String>,
    pub tenant_id: Option<String>,
    pub client_id: String,
    pub username: Option<String>,
    pub use_broker: bool,
}

impl InteractiveOptions {
    /// Creates options for the given scopes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] when `scopes` is empty or only holds
    /// blank entries.
    pub fn new(scopes: Vec<String>) -> AuthResult<Self> {
        let scopes = normalize_scopes(scopes);
        if scopes.is_empty() {
            return Err(AuthError::Configuration("Scopes are required".to_string()));
        }

        Ok(Self {
            scopes,
            tenant_id: None,
            client_id: DEFAULT_CLIENT_ID.to_string(),
            username: None,
            use_broker: cfg!(windows),
        })
    }

    pub fn with_tenant_id(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = non_blank(tenant_id);
        self
    }

    pub fn with_client_id(mut self, client_id: Option<String>) -> Self {
        self.client_id = non_blank(client_id).unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());
        self
    }

    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = non_blank(username);
        self
    }

    pub fn with_broker(mut self, use_broker: bool) -> Self {
        self.use_broker = use_broker;
        self
    }
}

/// A signed-in identity enumerated from the persistent token store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// `<object id>.<tenant id>`, stable across sign-ins.
    pub home_account_id: String,
    pub tenant_id: String,
    pub username: String,
    /// Authority host the account signed in through, e.g. `login.microsoftonline.com`.
    pub environment: String,
}

/// An access token together with its expiry and the identity it was issued for.
///
/// Instances are immutable; the memory cache swaps whole `Arc<CachedToken>`
/// records so readers never observe a partially written token.
#[derive(Clone, Serialize, Deserialize)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_on: DateTime<Utc>,
    pub account: Option<Account>,
}

impl CachedToken {
    pub fn new(access_token: String, expires_on: DateTime<Utc>, account: Option<Account>) -> Self {
        Self {
            access_token,
            expires_on,
            account,
        }
    }

    /// Builds a token from an OAuth2 `expires_in` value.
    pub fn expiring_in(access_token: String, expires_in_secs: u64, account: Option<Account>) -> Self {
        let secs = i64::try_from(expires_in_secs)
            .unwrap_or(MAX_TOKEN_LIFETIME_SECS)
            .min(MAX_TOKEN_LIFETIME_SECS);
        Self::new(
            access_token,
            Utc::now() + chrono::Duration::seconds(secs),
            account,
        )
    }

    /// A token is usable only while its expiry lies strictly after `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on > now
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &format_args!("<redacted {} chars>", self.access_token.len()))
            .field("expires_on", &self.expires_on)
            .field("account", &self.account)
            .finish()
    }
}

/// Key of the in-memory token cache: the scopes, tenant and user actually requested.
///
/// Scopes are sorted and all parts are lower-cased, so `["b", "A"]` and
/// `["a", "B"]` share one entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TokenCacheKey {
    scopes: Vec<String>,
    tenant_id: Option<String>,
    user: Option<String>,
}

impl TokenCacheKey {
    pub fn new(scopes: &[String], tenant_id: Option<&str>, user: Option<&str>) -> Self {
        let mut scopes: Vec<String> = scopes.iter().map(|s| s.to_lowercase()).collect();
        scopes.sort();
        scopes.dedup();
        Self {
            scopes,
            tenant_id: tenant_id.map(str::to_lowercase),
            user: user.map(str::to_lowercase),
        }
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

/// Returns `true` when `tenant` is a syntactically valid tenant identifier (a GUID).
///
/// Domain-style tenants such as `contoso.onmicrosoft.com` are accepted by the
/// identity service but cannot be compared against cached accounts, which only
/// record the GUID.
pub fn is_tenant_identifier(tenant: &str) -> bool {
    uuid::Uuid::parse_str(tenant.trim()).is_ok()
}

pub(crate) fn normalize_scopes(scopes: Vec<String>) -> Vec<String> {
    scopes
        .iter()
        .flat_map(|s| s.split_whitespace())
        .map(str::to_string)
        .collect()
}

pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_scopes_rejected() {
        let err = InteractiveOptions::new(vec![]).unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));

        let err = InteractiveOptions::new(vec!["   ".to_string()]).unwrap_err();
        assert!(matches!(err, AuthError::Configuration(_)));
    }

    #[test]
    fn test_client_id_defaults_when_blank() {
        let options = InteractiveOptions::new(vec!["User.Read".to_string()])
            .unwrap()
            .with_client_id(Some("  ".to_string()));
        assert_eq!(options.client_id, DEFAULT_CLIENT_ID);
    }

    #[test]
    fn test_space_separated_scopes_are_split() {
        let options =
            InteractiveOptions::new(vec!["User.Read Group.Read.All".to_string()]).unwrap();
        assert_eq!(options.scopes, vec!["User.Read", "Group.Read.All"]);
    }

    #[test]
    fn test_expiry_is_strict() {
        let now = Utc::now();
        let token = CachedToken::new("t".to_string(), now, None);
        assert!(!token.is_valid_at(now));
        assert!(token.is_valid_at(now - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let token = CachedToken::expiring_in("super-secret".to_string(), 60, None);
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("redacted 12 chars"));
    }

    #[test]
    fn test_cache_key_ignores_scope_order_and_case() {
        let a = TokenCacheKey::new(
            &["User.Read".to_string(), "Group.Read.All".to_string()],
            Some("Tenant"),
            Some("Admin@Contoso.com"),
        );
        let b = TokenCacheKey::new(
            &["group.read.all".to_string(), "user.read".to_string()],
            Some("tenant"),
            Some("admin@contoso.com"),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_cache_key_differs_per_tenant() {
        let scopes = ["User.Read".to_string()];
        assert_ne!(
            TokenCacheKey::new(&scopes, Some("a"), None),
            TokenCacheKey::new(&scopes, Some("b"), None)
        );
    }

    #[test]
    fn test_tenant_identifier_detection() {
        assert!(is_tenant_identifier("72f988bf-86f1-41af-91ab-2d7cd011db47"));
        assert!(!is_tenant_identifier("contoso.onmicrosoft.com"));
        assert!(!is_tenant_identifier(""));
    }
}
