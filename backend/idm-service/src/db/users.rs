/// User database operations for idm-service
use crate::db::UserDeletion;
use crate::error::{is_unique_violation, IdentityError, Result};
use crate::models::{NewUser, Role, User};
use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};

/// Advisory lock key serializing changes to the admin set across instances
const ADMIN_LOCK_KEY: i64 = 0x1d_b007;

const USER_COLUMNS: &str = "id, email, password_hash, role, created_at, updated_at";

/// Find user by email
pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(user)
}

async fn lock_admin_set(tx: &mut Transaction<'_, Postgres>) -> Result<()> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(ADMIN_LOCK_KEY)
        .execute(tx.as_mut())
        .await?;

    Ok(())
}

async fn insert_user(tx: &mut Transaction<'_, Postgres>, new_user: NewUser) -> Result<User> {
    let user = new_user.into_user(Utc::now());

    sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (id, email, password_hash, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role)
    .bind(user.created_at)
    .fetch_one(tx.as_mut())
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            IdentityError::UserAlreadyExists
        } else {
            IdentityError::from(e)
        }
    })
}

/// Create a new user
///
/// The unique constraint on `email` decides concurrent duplicates: the
/// losing insert surfaces as `UserAlreadyExists`.
pub async fn create_user(pool: &PgPool, new_user: NewUser) -> Result<User> {
    let mut tx = pool.begin().await?;
    let user = insert_user(&mut tx, new_user).await?;
    tx.commit().await?;

    Ok(user)
}

/// Create the admin account unless one already exists
///
/// Runs under a transaction-scoped advisory lock so instances starting at the
/// same time cannot both create an admin. Returns `true` if a row was inserted.
pub async fn create_admin_if_absent(pool: &PgPool, new_user: NewUser) -> Result<bool> {
    let mut tx = pool.begin().await?;
    lock_admin_set(&mut tx).await?;

    let exists =
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE role = $1)")
            .bind(Role::Admin)
            .fetch_one(tx.as_mut())
            .await?;

    if exists {
        tx.commit().await?;
        return Ok(false);
    }

    // Dropping the transaction on error rolls it back.
    insert_user(&mut tx, new_user).await?;
    tx.commit().await?;

    Ok(true)
}

/// Count users holding a role
pub async fn count_by_role(pool: &PgPool, role: Role) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE role = $1")
        .bind(role)
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Replace a user's password hash; returns `false` if no such user
pub async fn update_password(pool: &PgPool, email: &str, password_hash: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE users
        SET password_hash = $2, updated_at = $3
        WHERE email = $1
        "#,
    )
    .bind(email)
    .bind(password_hash)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a user unless it is the only admin left
///
/// Takes the same advisory lock as the admin bootstrap, so two admins deleting
/// each other concurrently cannot both succeed.
pub async fn delete_user_unless_last_admin(pool: &PgPool, email: &str) -> Result<UserDeletion> {
    let mut tx = pool.begin().await?;
    lock_admin_set(&mut tx).await?;

    let result = sqlx::query(
        r#"
        DELETE FROM users
        WHERE email = $1
          AND (role <> $2 OR (SELECT COUNT(*) FROM users WHERE role = $2) > 1)
        "#,
    )
    .bind(email)
    .bind(Role::Admin)
    .execute(tx.as_mut())
    .await?;

    let outcome = if result.rows_affected() > 0 {
        UserDeletion::Deleted
    } else {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(tx.as_mut())
                .await?;
        if exists {
            UserDeletion::LastAdmin
        } else {
            UserDeletion::NotFound
        }
    };
    tx.commit().await?;

    Ok(outcome)
}
