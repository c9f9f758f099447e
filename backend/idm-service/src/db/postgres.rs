use super::{token_revocation, users, CredentialStore, UserDeletion};
use crate::error::Result;
use crate::models::{NewUser, Role, TokenRevocation, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// PostgreSQL-backed credential store
///
/// Each call checks a connection out of the pool for its own duration.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user(&self, email: &str) -> Result<Option<User>> {
        users::find_by_email(&self.pool, email).await
    }

    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        users::create_user(&self.pool, new_user).await
    }

    async fn create_admin_if_absent(&self, new_user: NewUser) -> Result<bool> {
        users::create_admin_if_absent(&self.pool, new_user).await
    }

    async fn count_users_with_role(&self, role: Role) -> Result<i64> {
        users::count_by_role(&self.pool, role).await
    }

    async fn update_password(&self, email: &str, password_hash: &str) -> Result<bool> {
        users::update_password(&self.pool, email, password_hash).await
    }

    async fn delete_user_unless_last_admin(&self, email: &str) -> Result<UserDeletion> {
        users::delete_user_unless_last_admin(&self.pool, email).await
    }

    async fn revoke_token(&self, revocation: TokenRevocation) -> Result<bool> {
        token_revocation::revoke_token(&self.pool, &revocation).await
    }

    async fn is_token_revoked(&self, jti: &str) -> Result<bool> {
        token_revocation::is_jti_revoked(&self.pool, jti).await
    }

    async fn delete_expired_revocations(&self, now: DateTime<Utc>) -> Result<u64> {
        token_revocation::cleanup_expired_revocations(&self.pool, now).await
    }

    async fn count_revocations(&self) -> Result<i64> {
        token_revocation::count_revocations(&self.pool).await
    }
}
