use crate::error::Result;
use crate::models::{NewUser, Role, TokenRevocation, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Result of an account deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserDeletion {
    Deleted,
    NotFound,
    /// Refused: the account is the only remaining admin
    LastAdmin,
}

/// Persistence for accounts and revoked token ids.
///
/// No business logic lives behind this trait. Every mutation is a single
/// atomic operation in the backing store, so callers never lock.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up an account by its unique email.
    async fn find_user(&self, email: &str) -> Result<Option<User>>;

    /// Insert an account; `UserAlreadyExists` if the email is taken.
    async fn create_user(&self, new_user: NewUser) -> Result<User>;

    /// Insert `new_user` only if no admin exists yet. Returns `true` if inserted.
    async fn create_admin_if_absent(&self, new_user: NewUser) -> Result<bool>;

    async fn count_users_with_role(&self, role: Role) -> Result<i64>;

    /// Returns `false` if the account does not exist.
    async fn update_password(&self, email: &str, password_hash: &str) -> Result<bool>;

    /// Delete an account unless it is the last admin. The admin count is
    /// checked in the same critical section as the delete.
    async fn delete_user_unless_last_admin(&self, email: &str) -> Result<UserDeletion>;

    /// Idempotent insert into the ledger. Returns `true` if the entry is new.
    async fn revoke_token(&self, revocation: TokenRevocation) -> Result<bool>;

    async fn is_token_revoked(&self, jti: &str) -> Result<bool>;

    /// Remove ledger entries whose token expired at or before `now`.
    async fn delete_expired_revocations(&self, now: DateTime<Utc>) -> Result<u64>;

    async fn count_revocations(&self) -> Result<i64>;
}
