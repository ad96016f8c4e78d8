//! In-memory store doubles for the unit tests.

use std::sync::{Arc, Mutex};

use crate::store::{NewUser, RegistrationTx, SessionStore, StoreError, User, UserStore};

#[derive(Debug, Clone, Default)]
struct State {
    users: Vec<User>,
    /// `(id, code, is_active)`
    invite_codes: Vec<(i64, String, bool)>,
    next_user_id: i64,
    next_code_id: i64,
}

impl State {
    fn add_code(&mut self, code: &str, active: bool) -> i64 {
        self.next_code_id += 1;
        self.invite_codes
            .push((self.next_code_id, code.to_string(), active));
        self.next_code_id
    }
}

#[derive(Debug, Default)]
struct Shared {
    committed: State,
    fail_user_inserts: bool,
    race_default_code: bool,
    race_user_insert: bool,
}

/// User store whose transactions work on a snapshot and publish it on commit.
#[derive(Debug, Clone, Default)]
pub struct FakeUserStore {
    shared: Arc<Mutex<Shared>>,
}

impl FakeUserStore {
    pub fn seed_user(&self, email: &str, digest: &str) -> i64 {
        let mut shared = self.shared.lock().unwrap();
        let state = &mut shared.committed;
        let code_id = match state.invite_codes.first() {
            Some((id, _, _)) => *id,
            None => state.add_code("SEED", true),
        };
        state.next_user_id += 1;
        let id = state.next_user_id;
        state.users.push(User {
            id,
            email: email.to_string(),
            password_digest: digest.to_string(),
            invite_code_id: code_id,
            created_at: "2024-01-01 00:00:00".into(),
            updated_at: "2024-01-01 00:00:00".into(),
        });
        id
    }

    pub fn seed_invite_code(&self, code: &str, active: bool) -> i64 {
        self.shared.lock().unwrap().committed.add_code(code, active)
    }

    pub fn delete_user(&self, id: i64) {
        self.shared
            .lock()
            .unwrap()
            .committed
            .users
            .retain(|u| u.id != id);
    }

    pub fn user_by_email(&self, email: &str) -> Option<User> {
        let shared = self.shared.lock().unwrap();
        shared
            .committed
            .users
            .iter()
            .find(|u| u.email == email)
            .cloned()
    }

    pub fn user_count(&self) -> usize {
        self.shared.lock().unwrap().committed.users.len()
    }

    /// Committed invite codes as `(id, code)`.
    pub fn invite_codes(&self) -> Vec<(i64, String)> {
        let shared = self.shared.lock().unwrap();
        shared
            .committed
            .invite_codes
            .iter()
            .map(|(id, code, _)| (*id, code.clone()))
            .collect()
    }

    /// Make every `insert_user` fail with a query error.
    pub fn fail_user_inserts(&self) {
        self.shared.lock().unwrap().fail_user_inserts = true;
    }

    /// Make the next `insert_invite_code` lose to a concurrent writer that
    /// commits the same code first.
    pub fn race_default_code_insert(&self) {
        self.shared.lock().unwrap().race_default_code = true;
    }

    /// Make the next `insert_user` lose to a concurrent writer that commits a
    /// user with the same email first.
    pub fn race_user_insert(&self) {
        self.shared.lock().unwrap().race_user_insert = true;
    }
}

impl UserStore for FakeUserStore {
    type Tx = FakeTx;

    async fn begin(&self) -> Result<FakeTx, StoreError> {
        let staged = self.shared.lock().unwrap().committed.clone();
        Ok(FakeTx {
            shared: self.shared.clone(),
            staged,
        })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.user_by_email(email))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let shared = self.shared.lock().unwrap();
        Ok(shared.committed.users.iter().find(|u| u.id == id).cloned())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

pub struct FakeTx {
    shared: Arc<Mutex<Shared>>,
    staged: State,
}

impl RegistrationTx for FakeTx {
    async fn user_id_by_email(&mut self, email: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .staged
            .users
            .iter()
            .find(|u| u.email == email)
            .map(|u| u.id))
    }

    async fn active_invite_code_id(&mut self, code: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .staged
            .invite_codes
            .iter()
            .find(|(_, c, active)| c == code && *active)
            .map(|(id, _, _)| *id))
    }

    async fn invite_code_id(&mut self, code: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .staged
            .invite_codes
            .iter()
            .find(|(_, c, _)| c == code)
            .map(|(id, _, _)| *id))
    }

    async fn insert_invite_code(&mut self, code: &str) -> Result<i64, StoreError> {
        {
            let mut shared = self.shared.lock().unwrap();
            if std::mem::take(&mut shared.race_default_code) {
                let id = shared.committed.add_code(code, true);
                self.staged.invite_codes.push((id, code.to_string(), true));
                self.staged.next_code_id = shared.committed.next_code_id;
                return Err(StoreError::Conflict(format!("invite_codes.code: {code}")));
            }
        }
        if self.staged.invite_codes.iter().any(|(_, c, _)| c == code) {
            return Err(StoreError::Conflict(format!("invite_codes.code: {code}")));
        }
        Ok(self.staged.add_code(code, true))
    }

    async fn insert_user(&mut self, user: NewUser<'_>) -> Result<i64, StoreError> {
        {
            let mut shared = self.shared.lock().unwrap();
            if shared.fail_user_inserts {
                return Err(StoreError::Query("disk I/O error".into()));
            }
            if std::mem::take(&mut shared.race_user_insert) {
                let state = &mut shared.committed;
                state.next_user_id += 1;
                let id = state.next_user_id;
                state.users.push(User {
                    id,
                    email: user.email.to_string(),
                    password_digest: "other-writer".into(),
                    invite_code_id: user.invite_code_id,
                    created_at: "2024-01-01 00:00:00".into(),
                    updated_at: "2024-01-01 00:00:00".into(),
                });
                return Err(StoreError::Conflict(format!("users.email: {}", user.email)));
            }
        }
        if self.staged.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!("users.email: {}", user.email)));
        }
        self.staged.next_user_id += 1;
        let id = self.staged.next_user_id;
        self.staged.users.push(User {
            id,
            email: user.email.to_string(),
            password_digest: user.password_digest.to_string(),
            invite_code_id: user.invite_code_id,
            created_at: "2024-01-01 00:00:00".into(),
            updated_at: "2024-01-01 00:00:00".into(),
        });
        Ok(id)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.shared.lock().unwrap().committed = self.staged;
        Ok(())
    }
}

/// Session store that is always unreachable.
#[derive(Debug, Clone, Copy)]
pub struct FailingSessionStore;

fn refused() -> StoreError {
    StoreError::Connection("connection refused".into())
}

impl SessionStore for FailingSessionStore {
    async fn set_ex(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<(), StoreError> {
        Err(refused())
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(refused())
    }

    async fn expire(&self, _key: &str, _ttl_secs: u64) -> Result<bool, StoreError> {
        Err(refused())
    }

    async fn del(&self, _key: &str) -> Result<(), StoreError> {
        Err(refused())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(refused())
    }
}
