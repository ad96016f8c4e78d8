//! Storage seams for the two external stores.
//!
//! [`UserStore`] is the relational system of record. [`SessionStore`] is an
//! expiring key-value cache that may lose data at any time. All operations are
//! async and return `Send` futures so generic services can run inside
//! multi-threaded request handlers.

/// Error reported by a store backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or the connection broke.
    #[error("connection error: {0}")]
    Connection(String),

    /// The backend rejected or failed a statement.
    #[error("query error: {0}")]
    Query(String),

    /// A uniqueness constraint rejected a write.
    #[error("unique constraint violated: {0}")]
    Conflict(String),
}

/// A row of the `users` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_digest: String,
    pub invite_code_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Values for a new `users` row.
#[derive(Debug, Clone, Copy)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_digest: &'a str,
    pub invite_code_id: i64,
}

/// Relational user store.
pub trait UserStore: Send + Sync {
    /// Transaction handle used by registration.
    type Tx: RegistrationTx;

    /// Open a write transaction. Dropping it without [`RegistrationTx::commit`]
    /// rolls back every statement issued through it.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx, StoreError>> + Send;

    fn find_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    fn find_by_id(&self, id: i64) -> impl Future<Output = Result<Option<User>, StoreError>> + Send;

    /// Cheap round trip used by the liveness probe.
    fn ping(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Statements available inside a registration transaction.
pub trait RegistrationTx: Send {
    fn user_id_by_email(
        &mut self,
        email: &str,
    ) -> impl Future<Output = Result<Option<i64>, StoreError>> + Send;

    /// Id of the invite code row with this code and `is_active = true`.
    fn active_invite_code_id(
        &mut self,
        code: &str,
    ) -> impl Future<Output = Result<Option<i64>, StoreError>> + Send;

    /// Id of the invite code row with this code, active or not.
    fn invite_code_id(
        &mut self,
        code: &str,
    ) -> impl Future<Output = Result<Option<i64>, StoreError>> + Send;

    /// Insert an active invite code. [`StoreError::Conflict`] if the code exists.
    fn insert_invite_code(
        &mut self,
        code: &str,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// Insert a user. [`StoreError::Conflict`] if the email exists.
    fn insert_user(
        &mut self,
        user: NewUser<'_>,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    fn commit(self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Expiring key-value store holding `session:<token>` entries.
///
/// Every operation touches a single key; no multi-key atomicity is assumed.
pub trait SessionStore: Send + Sync {
    /// Set `key` to `value`, expiring after `ttl_secs`.
    fn set_ex(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Current value, or `None` if the key is absent or expired.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Reset the TTL of an existing key. Returns `false` if the key is absent.
    fn expire(
        &self,
        key: &str,
        ttl_secs: u64,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Remove `key`. Removing an absent key is not an error.
    fn del(&self, key: &str) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn ping(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}
