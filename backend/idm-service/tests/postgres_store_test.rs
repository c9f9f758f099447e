// PostgreSQL credential store tests
//
// Need a disposable database: every test truncates the IDM tables.
// Run with: DATABASE_URL=postgres://... cargo test --test postgres_store_test -- --ignored

use chrono::{Duration, Utc};
use idm_service::db::{CredentialStore, PgCredentialStore, UserDeletion};
use idm_service::models::{NewUser, RevocationReason, Role, TokenRevocation};
use idm_service::IdentityError;
use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::sync::Arc;

async fn bootstrap_pool() -> Pool<Postgres> {
    let db_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL env var required for postgres store tests");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await
        .expect("failed to connect to DATABASE_URL");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");
    sqlx::query("TRUNCATE users, token_revocation")
        .execute(&pool)
        .await
        .expect("failed to reset tables");

    pool
}

fn new_user(email: &str, role: Role) -> NewUser {
    NewUser {
        email: email.to_string(),
        password_hash: "hash".to_string(),
        role,
    }
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_duplicate_email_maps_to_user_already_exists() {
    let store = PgCredentialStore::new(bootstrap_pool().await);

    store.create_user(new_user("a@x", Role::Student)).await.unwrap();
    let err = store
        .create_user(new_user("a@x", Role::Teacher))
        .await
        .unwrap_err();

    assert!(matches!(err, IdentityError::UserAlreadyExists));
    assert_eq!(
        store.find_user("a@x").await.unwrap().unwrap().role,
        Role::Student
    );
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_concurrent_admin_bootstrap_inserts_once() {
    let store = Arc::new(PgCredentialStore::new(bootstrap_pool().await));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .create_admin_if_absent(new_user(&format!("admin{}@x", i), Role::Admin))
                    .await
            })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(store.count_users_with_role(Role::Admin).await.unwrap(), 1);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_revocation_insert_is_idempotent() {
    let store = PgCredentialStore::new(bootstrap_pool().await);
    let expires_at = Utc::now() + Duration::hours(1);

    assert!(store
        .revoke_token(TokenRevocation::new("jti-1".into(), RevocationReason::Logout, expires_at))
        .await
        .unwrap());
    assert!(!store
        .revoke_token(TokenRevocation::new("jti-1".into(), RevocationReason::Expired, expires_at))
        .await
        .unwrap());
    assert!(store.is_token_revoked("jti-1").await.unwrap());
    assert_eq!(store.count_revocations().await.unwrap(), 1);

    assert_eq!(
        store
            .delete_expired_revocations(expires_at + Duration::seconds(1))
            .await
            .unwrap(),
        1
    );
    assert!(!store.is_token_revoked("jti-1").await.unwrap());
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_last_admin_survives_concurrent_deletes() {
    let store = Arc::new(PgCredentialStore::new(bootstrap_pool().await));
    store.create_user(new_user("a@x", Role::Admin)).await.unwrap();
    store.create_user(new_user("b@x", Role::Admin)).await.unwrap();

    let handles: Vec<_> = ["a@x", "b@x"]
        .into_iter()
        .map(|email| {
            let store = store.clone();
            tokio::spawn(async move { store.delete_user_unless_last_admin(email).await })
        })
        .collect();

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap().unwrap());
    }

    assert!(outcomes.contains(&UserDeletion::Deleted));
    assert!(outcomes.contains(&UserDeletion::LastAdmin));
    assert_eq!(store.count_users_with_role(Role::Admin).await.unwrap(), 1);
    assert_eq!(
        store.delete_user_unless_last_admin("ghost@x").await.unwrap(),
        UserDeletion::NotFound
    );
}
