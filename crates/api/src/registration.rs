//! Account creation gated by invite codes.
//!
//! The whole flow runs in one user-store transaction: the email check, the
//! invite code resolution (including lazily creating the default code) and
//! the user insert either all commit or none do.

use std::sync::Arc;

use crate::ServiceError;
use crate::crypto::CredentialHasher;
use crate::service::normalize_invite_code;
use crate::store::{NewUser, RegistrationTx, StoreError, UserStore};

/// Invite code used when the registrant supplies none.
pub const DEFAULT_INVITE_CODE: &str = "DEFAULT2024";

#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    /// Code resolved (and created on first use) when none is supplied.
    pub default_invite_code: String,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            default_invite_code: DEFAULT_INVITE_CODE.into(),
        }
    }
}

pub struct RegistrationFlow<U: UserStore> {
    users: U,
    hasher: Arc<dyn CredentialHasher>,
    config: RegistrationConfig,
}

impl<U: UserStore> RegistrationFlow<U> {
    pub fn new(users: U, hasher: Arc<dyn CredentialHasher>, config: RegistrationConfig) -> Self {
        Self {
            users,
            hasher,
            config,
        }
    }

    /// Create an account. Returns nothing on success.
    ///
    /// A blank `invite_code` counts as not supplied.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        invite_code: Option<&str>,
    ) -> Result<(), ServiceError> {
        let mut tx = self
            .users
            .begin()
            .await
            .map_err(internal("register: begin transaction"))?;

        // 1. Email must be free.
        if tx
            .user_id_by_email(email)
            .await
            .map_err(internal("register: email lookup"))?
            .is_some()
        {
            tracing::info!(email, "registration rejected: email already exists");
            return Err(ServiceError::DuplicateEmail);
        }

        // 2. Invite code.
        let invite_code_id = resolve_invite_code(
            &mut tx,
            normalize_invite_code(invite_code),
            &self.config.default_invite_code,
        )
        .await?;

        // 3. User row.
        let digest = self.hasher.hash(password)?;
        let user_id = tx
            .insert_user(NewUser {
                email,
                password_digest: &digest,
                invite_code_id,
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => {
                    tracing::info!(email, "registration lost a race on email uniqueness");
                    ServiceError::DuplicateEmail
                }
                other => internal("register: insert user")(other),
            })?;

        // 4. Commit.
        tx.commit().await.map_err(|e| match e {
            StoreError::Conflict(_) => ServiceError::DuplicateEmail,
            other => internal("register: commit")(other),
        })?;

        tracing::info!(user_id, invite_code_id, "user registered");
        Ok(())
    }
}

/// Resolve the invite code id for a registration.
///
/// A supplied code must exist and be active. Without one, the default code
/// is looked up and created on first use; losing the creation race to a
/// concurrent registration just means re-reading the winner's row.
pub async fn resolve_invite_code<T: RegistrationTx>(
    tx: &mut T,
    supplied: Option<&str>,
    default_code: &str,
) -> Result<i64, ServiceError> {
    if let Some(code) = supplied {
        return tx
            .active_invite_code_id(code)
            .await
            .map_err(internal("register: invite code lookup"))?
            .ok_or(ServiceError::InvalidInviteCode);
    }

    if let Some(id) = tx
        .invite_code_id(default_code)
        .await
        .map_err(internal("register: default invite code lookup"))?
    {
        return Ok(id);
    }

    tracing::info!(code = default_code, "creating default invite code");
    match tx.insert_invite_code(default_code).await {
        Ok(id) => Ok(id),
        Err(StoreError::Conflict(_)) => {
            tracing::debug!("default invite code created concurrently; re-reading");
            tx.invite_code_id(default_code)
                .await
                .map_err(internal("register: default invite code re-read"))?
                .ok_or_else(|| {
                    ServiceError::Internal("default invite code missing after conflict".into())
                })
        }
        Err(e) => Err(internal("register: create default invite code")(e)),
    }
}

fn internal(context: &'static str) -> impl FnOnce(StoreError) -> ServiceError {
    move |e| {
        tracing::error!("{context}: {e}");
        ServiceError::Internal(format!("{context}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Sha256Hasher;
    use crate::testing::FakeUserStore;

    fn flow(users: FakeUserStore) -> RegistrationFlow<FakeUserStore> {
        RegistrationFlow::new(users, Arc::new(Sha256Hasher), RegistrationConfig::default())
    }

    #[tokio::test]
    async fn register_without_code_creates_default_once() {
        let users = FakeUserStore::default();
        let reg = flow(users.clone());

        reg.register("a@example.com", "pw", None).await.unwrap();
        reg.register("b@example.com", "pw", Some("   ")).await.unwrap();

        let codes = users.invite_codes();
        assert_eq!(codes.len(), 1);
        assert_eq!(codes[0].1, DEFAULT_INVITE_CODE);

        let a = users.user_by_email("a@example.com").unwrap();
        let b = users.user_by_email("b@example.com").unwrap();
        assert_eq!(a.invite_code_id, codes[0].0);
        assert_eq!(b.invite_code_id, codes[0].0);
        assert_eq!(a.password_digest, Sha256Hasher.hash("pw").unwrap());
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let users = FakeUserStore::default();
        let reg = flow(users.clone());

        reg.register("a@example.com", "pw", None).await.unwrap();
        let err = reg.register("a@example.com", "other", None).await.unwrap_err();
        assert_eq!(err, ServiceError::DuplicateEmail);
        assert_eq!(users.user_count(), 1);
    }

    #[tokio::test]
    async fn supplied_code_must_be_active() {
        let users = FakeUserStore::default();
        let vip = users.seed_invite_code("VIP", true);
        users.seed_invite_code("OLD", false);
        let reg = flow(users.clone());

        reg.register("vip@example.com", "pw", Some("VIP")).await.unwrap();
        assert_eq!(users.user_by_email("vip@example.com").unwrap().invite_code_id, vip);

        let err = reg.register("old@example.com", "pw", Some("OLD")).await.unwrap_err();
        assert_eq!(err, ServiceError::InvalidInviteCode);
        let err = reg.register("x@example.com", "pw", Some("NOPE")).await.unwrap_err();
        assert_eq!(err, ServiceError::InvalidInviteCode);
        assert_eq!(users.user_count(), 1);
    }

    #[tokio::test]
    async fn failed_registration_leaves_no_default_code() {
        let users = FakeUserStore::default();
        users.fail_user_inserts();
        let reg = flow(users.clone());

        let err = reg.register("a@example.com", "pw", None).await.unwrap_err();
        assert!(matches!(err, ServiceError::Internal(_)));
        assert!(users.invite_codes().is_empty());
        assert_eq!(users.user_count(), 0);
    }

    #[tokio::test]
    async fn email_taken_at_insert_is_duplicate() {
        let users = FakeUserStore::default();
        users.race_user_insert();
        let reg = flow(users.clone());

        let err = reg.register("a@example.com", "pw", None).await.unwrap_err();
        assert_eq!(err, ServiceError::DuplicateEmail);
        assert_eq!(users.user_count(), 1);
        let winner = users.user_by_email("a@example.com").unwrap();
        assert_eq!(winner.password_digest, "other-writer");
        // The default code staged by the losing transaction was not committed.
        assert!(users.invite_codes().is_empty());
    }

    #[tokio::test]
    async fn default_code_conflict_rereads_winner() {
        let users = FakeUserStore::default();
        users.race_default_code_insert();
        let reg = flow(users.clone());

        reg.register("a@example.com", "pw", None).await.unwrap();
        let codes = users.invite_codes();
        assert_eq!(codes.len(), 1);
        assert_eq!(
            users.user_by_email("a@example.com").unwrap().invite_code_id,
            codes[0].0
        );
    }

    #[tokio::test]
    async fn configured_default_code_is_used() {
        let users = FakeUserStore::default();
        let reg = RegistrationFlow::new(
            users.clone(),
            Arc::new(Sha256Hasher),
            RegistrationConfig {
                default_invite_code: "SPRING".into(),
            },
        );
        reg.register("a@example.com", "pw", None).await.unwrap();
        assert_eq!(users.invite_codes()[0].1, "SPRING");
    }
}
