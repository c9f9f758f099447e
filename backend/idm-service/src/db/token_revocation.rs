/// Token revocation database operations
use crate::error::Result;
use crate::models::TokenRevocation;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Record a revoked token in the ledger
///
/// Idempotent: a second revoke of the same id is a no-op. Returns `true` when
/// this call inserted the entry.
pub async fn revoke_token(pool: &PgPool, revocation: &TokenRevocation) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO token_revocation (jti, reason, expires_at, revoked_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (jti) DO NOTHING
        "#,
    )
    .bind(&revocation.jti)
    .bind(&revocation.reason)
    .bind(revocation.expires_at)
    .bind(revocation.revoked_at)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Check if a token (by JTI) is revoked
pub async fn is_jti_revoked(pool: &PgPool, jti: &str) -> Result<bool> {
    let revoked = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM token_revocation WHERE jti = $1)",
    )
    .bind(jti)
    .fetch_one(pool)
    .await?;

    Ok(revoked)
}

/// Delete revocation records whose token has expired anyway (maintenance operation)
pub async fn cleanup_expired_revocations(pool: &PgPool, now: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query("DELETE FROM token_revocation WHERE expires_at <= $1")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Get the count of revocation records
pub async fn count_revocations(pool: &PgPool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM token_revocation")
        .fetch_one(pool)
        .await?;

    Ok(count)
}
