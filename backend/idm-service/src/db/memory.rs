use super::{CredentialStore, UserDeletion};
use crate::error::{IdentityError, Result};
use crate::models::{NewUser, Role, TokenRevocation, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-process credential store
///
/// Backs the test suites and `STORE_BACKEND=memory` local runs. Shard-level
/// locking in `DashMap::entry` gives the same insert-if-absent guarantee as the
/// database unique constraints. Nothing survives a restart.
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    users: Arc<DashMap<String, User>>,
    revocations: Arc<DashMap<String, TokenRevocation>>,
    // Serializes admin check-then-write, like the advisory lock in Postgres.
    admin_set: Arc<Mutex<()>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_user(&self, new_user: NewUser) -> Result<User> {
        match self.users.entry(new_user.email.clone()) {
            Entry::Occupied(_) => Err(IdentityError::UserAlreadyExists),
            Entry::Vacant(slot) => {
                let user = new_user.into_user(Utc::now());
                slot.insert(user.clone());
                Ok(user)
            }
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_user(&self, email: &str) -> Result<Option<User>> {
        Ok(self.users.get(email).map(|entry| entry.value().clone()))
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        self.insert_user(new_user)
    }

    async fn create_admin_if_absent(&self, new_user: NewUser) -> Result<bool> {
        let _guard = self.admin_set.lock().await;

        if self.users.iter().any(|entry| entry.value().is_admin()) {
            return Ok(false);
        }

        self.insert_user(new_user)?;
        Ok(true)
    }

    async fn count_users_with_role(&self, role: Role) -> Result<i64> {
        let count = self
            .users
            .iter()
            .filter(|entry| entry.value().role == role)
            .count();
        Ok(count as i64)
    }

    async fn update_password(&self, email: &str, password_hash: &str) -> Result<bool> {
        match self.users.get_mut(email) {
            Some(mut entry) => {
                let user = entry.value_mut();
                user.password_hash = password_hash.to_string();
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_user_unless_last_admin(&self, email: &str) -> Result<UserDeletion> {
        let _guard = self.admin_set.lock().await;

        let Some(is_admin) = self.users.get(email).map(|entry| entry.value().is_admin()) else {
            return Ok(UserDeletion::NotFound);
        };
        if is_admin && self.count_users_with_role(Role::Admin).await? <= 1 {
            return Ok(UserDeletion::LastAdmin);
        }

        match self.users.remove(email) {
            Some(_) => Ok(UserDeletion::Deleted),
            None => Ok(UserDeletion::NotFound),
        }
    }

    async fn revoke_token(&self, revocation: TokenRevocation) -> Result<bool> {
        match self.revocations.entry(revocation.jti.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(revocation);
                Ok(true)
            }
        }
    }

    async fn is_token_revoked(&self, jti: &str) -> Result<bool> {
        Ok(self.revocations.contains_key(jti))
    }

    async fn delete_expired_revocations(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut removed = 0u64;
        self.revocations.retain(|_, revocation| {
            let keep = !revocation.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn count_revocations(&self) -> Result<i64> {
        Ok(self.revocations.len() as i64)
    }
}
