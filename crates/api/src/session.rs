//! Session lifecycle: login, resolve, whoami and logout.
//!
//! A session exists only in the [`SessionStore`] as `session:<token>` holding
//! the user id, with a store-enforced TTL. Every successful resolve pushes the
//! TTL back to the full lifetime, so only idle sessions expire. The
//! [`UserStore`] stays the system of record: a session pointing at a user that
//! no longer exists is deleted on sight.

use std::sync::Arc;

use crate::crypto::{self, CredentialHasher};
use crate::store::{SessionStore, StoreError, UserStore};
use crate::{SESSION_COOKIE_NAME, ServiceError, UserInfo};

/// Prefix of every session key in the session store.
pub const SESSION_KEY_PREFIX: &str = "session:";

/// Session lifetime: 7 days in seconds.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 3600;

/// Longest accepted session lifetime: 10 years in seconds.
pub const MAX_SESSION_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

/// Session store key for a token.
pub fn session_key(token: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{token}")
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sliding session lifetime in seconds.
    pub ttl_secs: u64,
    /// Add `Secure` to the session cookie.
    pub cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_SESSION_TTL_SECS,
            cookie_secure: false,
        }
    }
}

/// The session credential as the HTTP adapter must emit it.
///
/// Always `HttpOnly`, `SameSite=Lax`, `Path=/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub value: String,
    pub max_age: u64,
    pub secure: bool,
}

impl SessionCookie {
    fn issue(token: String, ttl_secs: u64, secure: bool) -> Self {
        Self {
            value: token,
            max_age: ttl_secs,
            secure,
        }
    }

    /// Cookie instructing the client to discard its credential.
    pub fn removal(secure: bool) -> Self {
        Self {
            value: String::new(),
            max_age: 0,
            secure,
        }
    }

    pub fn is_removal(&self) -> bool {
        self.max_age == 0
    }

    /// Render as a `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let mut out = format!(
            "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
            SESSION_COOKIE_NAME, self.value, self.max_age
        );
        if self.is_removal() {
            out.push_str("; Expires=Thu, 01 Jan 1970 00:00:00 GMT");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        out
    }
}

/// Successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user_id: i64,
    pub email: String,
    pub cookie: SessionCookie,
}

/// Orchestrates the session store and the user store.
///
/// Generic over both stores so that this crate has no dependency on a
/// database or cache client.
pub struct SessionManager<U: UserStore, S: SessionStore> {
    users: U,
    sessions: S,
    hasher: Arc<dyn CredentialHasher>,
    config: SessionConfig,
    /// Verified against when the email is unknown, so both login failures
    /// cost one hash.
    decoy_digest: Option<String>,
}

impl<U: UserStore, S: SessionStore> SessionManager<U, S> {
    pub fn new(
        users: U,
        sessions: S,
        hasher: Arc<dyn CredentialHasher>,
        config: SessionConfig,
    ) -> Self {
        let decoy_digest = hasher.hash(&crypto::generate_token().unwrap_or_default()).ok();
        Self {
            users,
            sessions,
            hasher,
            config,
            decoy_digest,
        }
    }

    /// Authenticate with email + password and open a new session.
    ///
    /// Unknown email and wrong password fail identically. The token is only
    /// returned once it has been written to the session store.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, ServiceError> {
        // 1. Look up user.
        let user = self
            .users
            .find_by_email(email)
            .await
            .map_err(internal("login: user lookup"))?;
        let Some(user) = user else {
            if let Some(decoy) = &self.decoy_digest {
                self.hasher.verify(password, decoy);
            }
            tracing::warn!(email, "login failed: user not found");
            return Err(ServiceError::InvalidCredentials);
        };

        // 2. Verify password.
        if !self.hasher.verify(password, &user.password_digest) {
            tracing::warn!(email, "login failed: wrong password");
            return Err(ServiceError::InvalidCredentials);
        }

        // 3. Mint and store the session.
        let token = crypto::generate_token()?;
        self.sessions
            .set_ex(
                &session_key(&token),
                &user.id.to_string(),
                self.config.ttl_secs,
            )
            .await
            .map_err(session_err("login: create session"))?;

        tracing::info!(user_id = user.id, "user logged in");

        Ok(LoginOutcome {
            user_id: user.id,
            email: user.email,
            cookie: SessionCookie::issue(token, self.config.ttl_secs, self.config.cookie_secure),
        })
    }

    /// Map a token to its user id, refreshing the TTL.
    ///
    /// `Ok(None)` means anonymous: no token, or no live session for it.
    /// An unreachable store is an error, never anonymous.
    pub async fn resolve(&self, token: Option<&str>) -> Result<Option<i64>, ServiceError> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        let key = session_key(token);

        let Some(raw) = self
            .sessions
            .get(&key)
            .await
            .map_err(session_err("resolve: read session"))?
        else {
            return Ok(None);
        };

        let Ok(user_id) = raw.trim().parse::<i64>() else {
            tracing::warn!("discarding session with malformed user id");
            self.discard(&key, "resolve").await;
            return Ok(None);
        };

        let refreshed = self
            .sessions
            .expire(&key, self.config.ttl_secs)
            .await
            .map_err(session_err("resolve: refresh session"))?;
        if !refreshed {
            // Expired between the read and the refresh.
            return Ok(None);
        }

        Ok(Some(user_id))
    }

    /// Resolve the session and load its user.
    ///
    /// A live session whose user row is gone is deleted and treated as
    /// anonymous.
    pub async fn whoami(&self, token: Option<&str>) -> Result<Option<UserInfo>, ServiceError> {
        let Some(user_id) = self.resolve(token).await? else {
            return Ok(None);
        };

        let user = self
            .users
            .find_by_id(user_id)
            .await
            .map_err(internal("whoami: user lookup"))?;

        match user {
            Some(user) => Ok(Some(UserInfo {
                user_id: user.id,
                email: user.email,
            })),
            None => {
                tracing::warn!(user_id, "session references a missing user; removing it");
                if let Some(token) = token {
                    self.discard(&session_key(token), "whoami").await;
                }
                Ok(None)
            }
        }
    }

    /// Delete the session and return a cookie that clears the credential.
    ///
    /// Never fails: the client discards its credential either way.
    pub async fn logout(&self, token: Option<&str>) -> SessionCookie {
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            self.discard(&session_key(token), "logout").await;
        }
        SessionCookie::removal(self.config.cookie_secure)
    }

    /// Probe both stores.
    pub async fn check_health(&self) -> Result<(), ServiceError> {
        self.users.ping().await.map_err(|e| {
            tracing::error!("health: user store unreachable: {e}");
            ServiceError::Unavailable(format!("user store: {e}"))
        })?;
        self.sessions.ping().await.map_err(|e| {
            tracing::error!("health: session store unreachable: {e}");
            ServiceError::Unavailable(format!("session store: {e}"))
        })?;
        Ok(())
    }

    async fn discard(&self, key: &str, context: &str) {
        if let Err(e) = self.sessions.del(key).await {
            tracing::error!("{context}: failed to delete session: {e}");
        }
    }
}

fn internal(context: &'static str) -> impl FnOnce(StoreError) -> ServiceError {
    move |e| {
        tracing::error!("{context}: {e}");
        ServiceError::Internal(format!("{context}: {e}"))
    }
}

fn session_err(context: &'static str) -> impl FnOnce(StoreError) -> ServiceError {
    move |e| {
        tracing::error!("{context}: {e}");
        ServiceError::SessionStore(format!("{context}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::crypto::Sha256Hasher;
    use crate::memory::MemorySessionStore;
    use crate::testing::{FailingSessionStore, FakeUserStore};

    const TTL: u64 = 60;

    fn manager<S: SessionStore>(
        users: FakeUserStore,
        sessions: S,
    ) -> SessionManager<FakeUserStore, S> {
        SessionManager::new(
            users,
            sessions,
            Arc::new(Sha256Hasher),
            SessionConfig {
                ttl_secs: TTL,
                cookie_secure: false,
            },
        )
    }

    fn seeded_users() -> (FakeUserStore, i64) {
        let users = FakeUserStore::default();
        let id = users.seed_user("alice@example.com", &Sha256Hasher.hash("s3cret").unwrap());
        (users, id)
    }

    #[tokio::test]
    async fn login_then_resolve_returns_same_user() {
        let (users, id) = seeded_users();
        let sessions = MemorySessionStore::new();
        let mgr = manager(users, sessions.clone());

        let out = mgr.login("alice@example.com", "s3cret").await.unwrap();
        assert_eq!(out.user_id, id);
        assert_eq!(out.email, "alice@example.com");
        assert_eq!(out.cookie.max_age, TTL);
        assert_eq!(
            sessions.get(&session_key(&out.cookie.value)).await.unwrap(),
            Some(id.to_string())
        );

        let resolved = mgr.resolve(Some(&out.cookie.value)).await.unwrap();
        assert_eq!(resolved, Some(id));
    }

    #[tokio::test]
    async fn bad_credentials_are_indistinguishable() {
        let (users, _) = seeded_users();
        let mgr = manager(users, MemorySessionStore::new());

        let wrong_pw = mgr.login("alice@example.com", "nope").await.unwrap_err();
        let no_user = mgr.login("bob@example.com", "s3cret").await.unwrap_err();
        assert_eq!(wrong_pw, ServiceError::InvalidCredentials);
        assert_eq!(wrong_pw, no_user);
        assert_eq!(wrong_pw.public_message(), no_user.public_message());
    }

    #[derive(Default)]
    struct CountingHasher {
        verifies: AtomicUsize,
    }

    impl CredentialHasher for CountingHasher {
        fn hash(&self, plaintext: &str) -> Result<String, ServiceError> {
            Sha256Hasher.hash(plaintext)
        }

        fn verify(&self, plaintext: &str, digest: &str) -> bool {
            self.verifies.fetch_add(1, Ordering::SeqCst);
            Sha256Hasher.verify(plaintext, digest)
        }
    }

    #[tokio::test]
    async fn unknown_email_still_pays_for_a_hash() {
        let (users, _) = seeded_users();
        let hasher = Arc::new(CountingHasher::default());
        let mgr = SessionManager::new(
            users,
            MemorySessionStore::new(),
            hasher.clone(),
            SessionConfig::default(),
        );

        let err = mgr.login("bob@example.com", "s3cret").await.unwrap_err();
        assert_eq!(err, ServiceError::InvalidCredentials);
        assert_eq!(hasher.verifies.load(Ordering::SeqCst), 1);

        mgr.login("alice@example.com", "nope").await.unwrap_err();
        assert_eq!(hasher.verifies.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn each_login_opens_a_distinct_session() {
        let (users, id) = seeded_users();
        let mgr = manager(users, MemorySessionStore::new());

        let a = mgr.login("alice@example.com", "s3cret").await.unwrap();
        let b = mgr.login("alice@example.com", "s3cret").await.unwrap();
        assert_ne!(a.cookie.value, b.cookie.value);
        assert_eq!(mgr.resolve(Some(&a.cookie.value)).await.unwrap(), Some(id));
        assert_eq!(mgr.resolve(Some(&b.cookie.value)).await.unwrap(), Some(id));
    }

    #[tokio::test(start_paused = true)]
    async fn resolve_slides_the_expiry() {
        let (users, id) = seeded_users();
        let mgr = manager(users, MemorySessionStore::new());
        let token = mgr.login("alice@example.com", "s3cret").await.unwrap().cookie.value;

        // Keep touching the session well past the initial lifetime.
        for _ in 0..10 {
            tokio::time::advance(Duration::from_secs(TTL - 5)).await;
            assert_eq!(mgr.resolve(Some(&token)).await.unwrap(), Some(id));
        }

        // Go idle for longer than the TTL.
        tokio::time::advance(Duration::from_secs(TTL + 1)).await;
        assert_eq!(mgr.resolve(Some(&token)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_or_unknown_token_is_anonymous() {
        let (users, _) = seeded_users();
        let mgr = manager(users, MemorySessionStore::new());
        assert_eq!(mgr.resolve(None).await.unwrap(), None);
        assert_eq!(mgr.resolve(Some("")).await.unwrap(), None);
        assert_eq!(mgr.resolve(Some("deadbeef")).await.unwrap(), None);
        assert_eq!(mgr.whoami(None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let (users, _) = seeded_users();
        let mgr = manager(users, MemorySessionStore::new());
        let token = mgr.login("alice@example.com", "s3cret").await.unwrap().cookie.value;

        let cookie = mgr.logout(Some(&token)).await;
        assert!(cookie.is_removal());
        assert_eq!(mgr.resolve(Some(&token)).await.unwrap(), None);

        let again = mgr.logout(Some(&token)).await;
        assert!(again.is_removal());
        assert!(mgr.logout(None).await.is_removal());
    }

    #[tokio::test]
    async fn whoami_heals_dangling_session() {
        let (users, id) = seeded_users();
        let sessions = MemorySessionStore::new();
        let mgr = manager(users.clone(), sessions.clone());
        let token = mgr.login("alice@example.com", "s3cret").await.unwrap().cookie.value;

        let me = mgr.whoami(Some(&token)).await.unwrap().unwrap();
        assert_eq!(me.user_id, id);

        users.delete_user(id);
        assert_eq!(mgr.whoami(Some(&token)).await.unwrap(), None);
        assert_eq!(sessions.get(&session_key(&token)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_session_value_is_discarded() {
        let (users, _) = seeded_users();
        let sessions = MemorySessionStore::new();
        sessions.set_ex(&session_key("t"), "not-a-number", TTL).await.unwrap();
        let mgr = manager(users, sessions.clone());

        assert_eq!(mgr.resolve(Some("t")).await.unwrap(), None);
        assert_eq!(sessions.get(&session_key("t")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn store_outage_is_not_anonymous() {
        let (users, _) = seeded_users();
        let mgr = manager(users, FailingSessionStore);

        let err = mgr.login("alice@example.com", "s3cret").await.unwrap_err();
        assert!(matches!(err, ServiceError::SessionStore(_)));

        let err = mgr.resolve(Some("token")).await.unwrap_err();
        assert!(matches!(err, ServiceError::SessionStore(_)));

        let err = mgr.whoami(Some("token")).await.unwrap_err();
        assert!(matches!(err, ServiceError::SessionStore(_)));

        // Logout still succeeds.
        assert!(mgr.logout(Some("token")).await.is_removal());

        let err = mgr.check_health().await.unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
    }

    #[test]
    fn cookie_header_attributes() {
        let cookie = SessionCookie::issue("abc".into(), 604_800, false);
        assert_eq!(
            cookie.to_header_value(),
            "session_id=abc; Max-Age=604800; Path=/; HttpOnly; SameSite=Lax"
        );

        let removal = SessionCookie::removal(true).to_header_value();
        assert!(removal.starts_with("session_id=; Max-Age=0; Path=/; HttpOnly; SameSite=Lax"));
        assert!(removal.contains("Expires=Thu, 01 Jan 1970 00:00:00 GMT"));
        assert!(removal.ends_with("; Secure"));
    }
}
