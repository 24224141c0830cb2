//! Durable, account-keyed token store shared by every process of the tool.
//!
//! The store is a single JSON document. Each entry is keyed by
//! `<client id>.<home account id>` and holds the account, its refresh token and
//! the access tokens issued for it. Readers treat a missing or unreadable file
//! as an empty cache, so a damaged store costs a sign-in, never a crash.

use super::types::{Account, CachedToken};
use crate::common::{AuthError, AuthResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const CACHE_FORMAT_VERSION: u32 = 1;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);
const LOCK_WAIT_LIMIT: Duration = Duration::from_secs(10);
/// A lock file older than this belongs to a process that died while holding it.
const STALE_LOCK_AGE: Duration = Duration::from_secs(30);

/// File name of the persistent store inside its directory.
pub const CACHE_FILE_NAME: &str = ".accounts";

/// Scopes the identity service adds to every user token; never part of cache matching.
const RESERVED_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// An access token as persisted for one account.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredAccessToken {
    /// Lower-cased, sorted, without reserved scopes.
    pub scopes: Vec<String>,
    pub access_token: String,
    pub expires_on: DateTime<Utc>,
}

/// Everything remembered about one signed-in account for one client id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccountEntry {
    pub client_id: String,
    pub account: Account,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub access_tokens: Vec<StoredAccessToken>,
}

/// Application tokens from the client credentials grant for one client id and tenant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppTokenEntry {
    pub client_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub access_tokens: Vec<StoredAccessToken>,
}

/// The full contents of the persistent store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: u32,
    #[serde(default)]
    pub entries: BTreeMap<String, AccountEntry>,
    /// Keyed by `<client id>.<tenant id>`.
    #[serde(default)]
    pub app_tokens: BTreeMap<String, AppTokenEntry>,
}

impl Default for CacheSnapshot {
    fn default() -> Self {
        Self {
            version: CACHE_FORMAT_VERSION,
            entries: BTreeMap::new(),
            app_tokens: BTreeMap::new(),
        }
    }
}

impl CacheSnapshot {
    pub fn entry_key(client_id: &str, home_account_id: &str) -> String {
        format!("{client_id}.{home_account_id}")
    }

    /// Accounts that signed in through `client_id`.
    pub fn accounts(&self, client_id: &str) -> Vec<Account> {
        self.entries
            .values()
            .filter(|entry| entry.client_id == client_id)
            .map(|entry| entry.account.clone())
            .collect()
    }

    pub fn entry(&self, client_id: &str, home_account_id: &str) -> Option<&AccountEntry> {
        self.entries
            .get(&Self::entry_key(client_id, home_account_id))
    }

    /// Finds a stored access token covering every requested scope that is valid at `now`.
    pub fn access_token(
        &self,
        client_id: &str,
        account: &Account,
        scopes: &[String],
        now: DateTime<Utc>,
    ) -> Option<CachedToken> {
        let entry = self.entry(client_id, &account.home_account_id)?;
        find_token(&entry.access_tokens, scopes, now).map(|stored| {
            CachedToken::new(
                stored.access_token.clone(),
                stored.expires_on,
                Some(entry.account.clone()),
            )
        })
    }

    /// Records a successful acquisition for `account`.
    ///
    /// Expired access tokens and tokens for the same scope set are dropped. A
    /// `None` refresh token keeps the previously stored one.
    pub fn record(
        &mut self,
        client_id: &str,
        account: &Account,
        refresh_token: Option<String>,
        scopes: &[String],
        token: &CachedToken,
    ) {
        let key = Self::entry_key(client_id, &account.home_account_id);
        let entry = self.entries.entry(key).or_insert_with(|| AccountEntry {
            client_id: client_id.to_string(),
            account: account.clone(),
            refresh_token: None,
            access_tokens: Vec::new(),
        });

        entry.account = account.clone();
        if refresh_token.is_some() {
            entry.refresh_token = refresh_token;
        }

        push_token(&mut entry.access_tokens, scopes, token);
    }

    /// Application token of `client_id` in `tenant_id` covering `scopes` at `now`.
    pub fn app_token(
        &self,
        client_id: &str,
        tenant_id: &str,
        scopes: &[String],
        now: DateTime<Utc>,
    ) -> Option<CachedToken> {
        let entry = self.app_tokens.get(&Self::entry_key(client_id, tenant_id))?;
        find_token(&entry.access_tokens, scopes, now)
            .map(|stored| CachedToken::new(stored.access_token.clone(), stored.expires_on, None))
    }

    pub fn record_app_token(
        &mut self,
        client_id: &str,
        tenant_id: &str,
        scopes: &[String],
        token: &CachedToken,
    ) {
        let key = Self::entry_key(client_id, tenant_id);
        let entry = self.app_tokens.entry(key).or_insert_with(|| AppTokenEntry {
            client_id: client_id.to_string(),
            tenant_id: tenant_id.to_string(),
            access_tokens: Vec::new(),
        });
        push_token(&mut entry.access_tokens, scopes, token);
    }

    /// Removes every account and application token of `client_id`.
    ///
    /// Returns how many accounts were removed.
    pub fn remove_client(&mut self, client_id: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.client_id != client_id);
        self.app_tokens.retain(|_, entry| entry.client_id != client_id);
        before - self.entries.len()
    }
}

fn find_token<'a>(
    tokens: &'a [StoredAccessToken],
    scopes: &[String],
    now: DateTime<Utc>,
) -> Option<&'a StoredAccessToken> {
    let wanted = cache_scopes(scopes);
    tokens
        .iter()
        .filter(|stored| stored.expires_on > now)
        .find(|stored| wanted.iter().all(|scope| stored.scopes.contains(scope)))
}

/// Adds `token`, dropping expired tokens and any older token for the same scopes.
fn push_token(tokens: &mut Vec<StoredAccessToken>, scopes: &[String], token: &CachedToken) {
    let scopes = cache_scopes(scopes);
    let now = Utc::now();
    tokens.retain(|stored| stored.expires_on > now && stored.scopes != scopes);
    tokens.push(StoredAccessToken {
        scopes,
        access_token: token.access_token.clone(),
        expires_on: token.expires_on,
    });
}

fn cache_scopes(scopes: &[String]) -> Vec<String> {
    let mut scopes: Vec<String> = scopes
        .iter()
        .map(|s| s.to_lowercase())
        .filter(|s| !RESERVED_SCOPES.contains(&s.as_str()))
        .collect();
    scopes.sort();
    scopes.dedup();
    scopes
}

/// Durable storage for [`CacheSnapshot`]s.
#[async_trait]
pub trait TokenCacheStore: Send + Sync {
    /// Reads the current snapshot. A store that does not exist yet is empty.
    async fn load(&self) -> AuthResult<CacheSnapshot>;

    /// Replaces the stored snapshot.
    async fn save(&self, snapshot: &CacheSnapshot) -> AuthResult<()>;

    /// Forgets everything stored.
    async fn clear(&self) -> AuthResult<()> {
        self.save(&CacheSnapshot::default()).await
    }

    /// Reloads the stored snapshot, applies `apply` to it and writes it back.
    ///
    /// Returns the snapshot as written. Stores shared between processes
    /// serialize the whole cycle so concurrent writers never drop each
    /// other's entries.
    async fn update(
        &self,
        apply: &mut (dyn for<'a> FnMut(&'a mut CacheSnapshot) + Send),
    ) -> AuthResult<CacheSnapshot> {
        let mut snapshot = self.load().await?;
        apply(&mut snapshot);
        self.save(&snapshot).await?;
        Ok(snapshot)
    }
}

/// JSON file store under the user's cache directory.
#[derive(Clone, Debug)]
pub struct FileTokenCacheStore {
    path: PathBuf,
}

impl FileTokenCacheStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<cache dir>/bettergraph/.accounts`, falling back to the temp dir.
    pub fn default_location() -> Self {
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self::new(base.join("bettergraph").join(CACHE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the advisory lock taken around read-modify-write cycles.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| CACHE_FILE_NAME.into());
        name.push(".lock");
        self.path.with_file_name(name)
    }

    async fn acquire_lock(&self) -> AuthResult<StoreLock> {
        let path = self.lock_path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let deadline = tokio::time::Instant::now() + LOCK_WAIT_LIMIT;
        loop {
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(_) => return Ok(StoreLock { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path).await {
                        log::warn!("Removing stale token cache lock {}", path.display());
                        let _ = tokio::fs::remove_file(&path).await;
                        continue;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(AuthError::Cache(format!(
                            "Timed out waiting for token cache lock {}",
                            path.display()
                        )));
                    }
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

async fn lock_is_stale(path: &Path) -> bool {
    let Ok(metadata) = tokio::fs::metadata(path).await else {
        return false;
    };
    metadata
        .modified()
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > STALE_LOCK_AGE)
}

/// Held lock file; removed on drop.
struct StoreLock {
    path: PathBuf,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to release token cache lock {}: {e}", self.path.display());
        }
    }
}

#[async_trait]
impl TokenCacheStore for FileTokenCacheStore {
    async fn load(&self) -> AuthResult<CacheSnapshot> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No token cache at {}", self.path.display());
                return Ok(CacheSnapshot::default());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<CacheSnapshot>(&raw) {
            Ok(snapshot) if snapshot.version == CACHE_FORMAT_VERSION => {
                log::debug!(
                    "Loaded {} cached account(s) from {}",
                    snapshot.entries.len(),
                    self.path.display()
                );
                Ok(snapshot)
            }
            Ok(snapshot) => {
                log::warn!(
                    "Ignoring token cache with unsupported version {} at {}",
                    snapshot.version,
                    self.path.display()
                );
                Ok(CacheSnapshot::default())
            }
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable token cache at {}: {e}",
                    self.path.display()
                );
                Ok(CacheSnapshot::default())
            }
        }
    }

    async fn save(&self, snapshot: &CacheSnapshot) -> AuthResult<()> {
        use tokio::io::AsyncWriteExt;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_vec_pretty(snapshot)?;
        let tmp_path = self.path.with_extension("tmp");

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&tmp_path).await?;
        file.write_all(&contents).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp_path, &self.path).await?;
        log::debug!(
            "Persisted {} cached account(s) to {}",
            snapshot.entries.len(),
            self.path.display()
        );
        Ok(())
    }

    async fn clear(&self) -> AuthResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                log::debug!("Removed token cache at {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(
        &self,
        apply: &mut (dyn for<'a> FnMut(&'a mut CacheSnapshot) + Send),
    ) -> AuthResult<CacheSnapshot> {
        let _lock = self.acquire_lock().await?;
        let mut snapshot = self.load().await?;
        apply(&mut snapshot);
        self.save(&snapshot).await?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(tenant: &str, username: &str) -> Account {
        Account {
            home_account_id: format!("oid-{username}.{tenant}"),
            tenant_id: tenant.to_string(),
            username: username.to_string(),
            environment: "login.microsoftonline.com".to_string(),
        }
    }

    #[test]
    fn test_record_and_lookup_access_token() {
        let mut snapshot = CacheSnapshot::default();
        let acct = account("t1", "alice@contoso.com");
        let token = CachedToken::expiring_in("at".into(), 3600, Some(acct.clone()));
        snapshot.record(
            "client",
            &acct,
            Some("rt".into()),
            &["User.Read".into(), "offline_access".into()],
            &token,
        );

        let found = snapshot
            .access_token("client", &acct, &["user.read".into()], Utc::now())
            .unwrap();
        assert_eq!(found.access_token, "at");
        assert!(
            snapshot
                .access_token("client", &acct, &["Group.Read.All".into()], Utc::now())
                .is_none()
        );
        assert!(
            snapshot
                .access_token("other-client", &acct, &["User.Read".into()], Utc::now())
                .is_none()
        );
    }

    #[test]
    fn test_record_keeps_refresh_token_when_none_returned() {
        let mut snapshot = CacheSnapshot::default();
        let acct = account("t1", "alice@contoso.com");
        let token = CachedToken::expiring_in("at".into(), 3600, None);
        snapshot.record("client", &acct, Some("rt".into()), &["a".into()], &token);
        snapshot.record("client", &acct, None, &["a".into()], &token);

        let entry = snapshot.entry("client", &acct.home_account_id).unwrap();
        assert_eq!(entry.refresh_token.as_deref(), Some("rt"));
        assert_eq!(entry.access_tokens.len(), 1);
    }

    #[test]
    fn test_accounts_are_scoped_to_client() {
        let mut snapshot = CacheSnapshot::default();
        let token = CachedToken::expiring_in("at".into(), 3600, None);
        snapshot.record("c1", &account("t1", "a"), None, &["x".into()], &token);
        snapshot.record("c2", &account("t2", "b"), None, &["x".into()], &token);

        assert_eq!(snapshot.accounts("c1").len(), 1);
        assert_eq!(snapshot.remove_client("c1"), 1);
        assert!(snapshot.accounts("c1").is_empty());
        assert_eq!(snapshot.accounts("c2").len(), 1);
    }

    #[test]
    fn test_app_tokens_keyed_by_client_and_tenant() {
        let mut snapshot = CacheSnapshot::default();
        let scopes = ["https://graph.microsoft.com/.default".to_string()];
        let token = CachedToken::expiring_in("app".into(), 3600, None);
        snapshot.record_app_token("app-id", "t1", &scopes, &token);

        let found = snapshot.app_token("app-id", "t1", &scopes, Utc::now()).unwrap();
        assert_eq!(found.access_token, "app");
        assert!(found.account.is_none());
        assert!(snapshot.app_token("app-id", "t2", &scopes, Utc::now()).is_none());
        assert!(snapshot.app_token("other", "t1", &scopes, Utc::now()).is_none());

        // Application tokens are not accounts.
        assert_eq!(snapshot.remove_client("app-id"), 0);
        assert!(snapshot.app_tokens.is_empty());
    }
}
