/// Identity service business logic
///
/// Composes the credential store, password hasher, token codec and revocation
/// ledger into the operations exposed over gRPC. Authorization policy lives
/// here: only an admin caller may register or delete accounts.
///
/// Token lifecycle: Issued -> Valid -> Expired | Revoked. Expiry is discovered
/// lazily when a token is validated after its `exp`, at which point its id is
/// written to the ledger.
use crate::db::{CredentialStore, UserDeletion};
use crate::error::{IdentityError, Result};
use crate::models::{NewUser, RevocationReason, Role, User};
use crate::security::password::{hash_password, hash_password_blocking, verify_password_blocking};
use crate::security::{IssuedToken, JwtKeys, RevocationLedger, TokenError};
use crate::validators;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Verified against when the account does not exist, so a failed login costs
/// the same whether or not the identity is registered.
static DUMMY_PASSWORD_HASH: Lazy<Option<String>> =
    Lazy::new(|| hash_password("idm-timing-equalizer").ok());

/// Argon2 calls allowed in flight when no limit is configured
pub const DEFAULT_HASHING_LIMIT: usize = 10;

/// The caller behind a valid token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub role: Role,
    pub jti: String,
}

/// Outcome of validating a bearer token
///
/// An invalid token is a normal result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValidation {
    Valid(Principal),
    Invalid,
}

impl TokenValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenValidation::Valid(_))
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            TokenValidation::Valid(principal) => Some(principal),
            TokenValidation::Invalid => None,
        }
    }
}

#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn CredentialStore>,
    ledger: RevocationLedger,
    keys: Arc<JwtKeys>,
    token_ttl: Duration,
    hashing: Arc<Semaphore>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn CredentialStore>, keys: JwtKeys, token_ttl: Duration) -> Self {
        let ledger = RevocationLedger::new(store.clone(), token_ttl);
        Self {
            store,
            ledger,
            keys: Arc::new(keys),
            token_ttl,
            hashing: Arc::new(Semaphore::new(DEFAULT_HASHING_LIMIT)),
        }
    }

    /// Bound the number of Argon2 computations running at once across all
    /// connections
    pub fn with_hashing_limit(mut self, permits: usize) -> Self {
        self.hashing = Arc::new(Semaphore::new(permits.max(1)));
        self
    }

    pub fn ledger(&self) -> &RevocationLedger {
        &self.ledger
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn keys(&self) -> &JwtKeys {
        &self.keys
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    async fn verify_bounded(&self, password: &str, hash: String) -> Result<bool> {
        let _permit = self
            .hashing
            .acquire()
            .await
            .map_err(|e| IdentityError::Internal(format!("Password hashing unavailable: {}", e)))?;
        verify_password_blocking(password.to_string(), hash).await
    }

    async fn hash_bounded(&self, password: &str) -> Result<String> {
        let _permit = self
            .hashing
            .acquire()
            .await
            .map_err(|e| IdentityError::Internal(format!("Password hashing unavailable: {}", e)))?;
        hash_password_blocking(password.to_string()).await
    }

    /// Check an identity/password pair
    ///
    /// Unknown identity and wrong password both yield `InvalidCredentials`.
    async fn authenticate(&self, email: &str, password: &str) -> Result<User> {
        let Some(user) = self.store.find_user(email).await? else {
            if let Some(dummy) = DUMMY_PASSWORD_HASH.as_ref() {
                let _ = self.verify_bounded(password, dummy.clone()).await;
            }
            warn!("Authentication failed: unknown account");
            return Err(IdentityError::InvalidCredentials);
        };

        if !self.verify_bounded(password, user.password_hash.clone()).await? {
            warn!(user = %user.email, "Authentication failed: wrong password");
            return Err(IdentityError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Issue a token for valid credentials
    ///
    /// The token carries the account's role as of now; later role changes do
    /// not affect tokens already issued.
    pub async fn login(&self, email: &str, password: &str) -> Result<IssuedToken> {
        let user = self.authenticate(email, password).await?;

        let issued = self
            .keys
            .issue(&user.email, user.role.as_str(), self.token_ttl, Utc::now())?;

        info!(
            user = %user.email,
            role = %user.role,
            jti = %issued.jti,
            "User logged in successfully"
        );
        Ok(issued)
    }

    /// Validate a bearer token at the current wall-clock time
    pub async fn validate_token(&self, token: &str) -> Result<TokenValidation> {
        self.validate_token_at(token, Utc::now()).await
    }

    /// Validate a bearer token as of `now`
    ///
    /// Expired and unverifiable tokens are written to the ledger as a side
    /// effect. That write is best effort: if it fails the token is still
    /// reported invalid. Only a failed ledger lookup is an error.
    pub async fn validate_token_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenValidation> {
        if token.is_empty() {
            return Ok(TokenValidation::Invalid);
        }

        match self.keys.parse_and_verify(token, now) {
            Ok(claims) => {
                if self.ledger.is_revoked(&claims.jti).await? {
                    debug!(jti = %claims.jti, "Rejected revoked token");
                    return Ok(TokenValidation::Invalid);
                }

                let Some(role) = Role::parse(&claims.role) else {
                    warn!(jti = %claims.jti, role = %claims.role, "Token carries unknown role");
                    return Ok(TokenValidation::Invalid);
                };

                Ok(TokenValidation::Valid(Principal {
                    subject: claims.sub,
                    role,
                    jti: claims.jti,
                }))
            }
            Err(TokenError::Expired { claims }) => {
                debug!(jti = %claims.jti, "Rejected expired token");
                if let Err(err) = self.ledger.revoke(&claims, RevocationReason::Expired).await {
                    warn!(jti = %claims.jti, error = %err, "Failed to revoke expired token");
                }
                Ok(TokenValidation::Invalid)
            }
            Err(err @ (TokenError::Malformed(_) | TokenError::BadSignature)) => {
                debug!(error = %err, "Rejected unverifiable token");
                if let Err(err) = self
                    .ledger
                    .revoke_unverified(token, RevocationReason::Invalid, now)
                    .await
                {
                    warn!(error = %err, "Failed to revoke unverifiable token");
                }
                Ok(TokenValidation::Invalid)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// End a session early
    ///
    /// Whatever was presented can never be used afterwards: a verified (or
    /// merely expired) token is revoked by `jti`, anything else by fingerprint.
    pub async fn logout(&self, token: &str) -> Result<()> {
        if token.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        match self.keys.parse_and_verify(token, now) {
            Ok(claims) | Err(TokenError::Expired { claims }) => {
                self.ledger.revoke(&claims, RevocationReason::Logout).await?;
                info!(user = %claims.sub, jti = %claims.jti, "User logged out");
            }
            Err(TokenError::Malformed(_) | TokenError::BadSignature) => {
                self.ledger
                    .revoke_unverified(token, RevocationReason::Logout, now)
                    .await?;
            }
            Err(err) => return Err(err.into()),
        }

        Ok(())
    }

    /// Require a valid admin token whose account still exists as an admin
    pub async fn authorize_admin(&self, caller_token: &str) -> Result<Principal> {
        if caller_token.is_empty() {
            return Err(IdentityError::MissingToken);
        }

        let principal = match self.validate_token(caller_token).await? {
            TokenValidation::Invalid => return Err(IdentityError::InvalidToken),
            TokenValidation::Valid(principal) => principal,
        };

        if principal.role != Role::Admin {
            warn!(
                caller = %principal.subject,
                role = %principal.role,
                "Admin operation attempted by non-admin"
            );
            return Err(IdentityError::PermissionDenied);
        }

        match self.store.find_user(&principal.subject).await? {
            Some(account) if account.is_admin() => Ok(principal),
            Some(_) => {
                warn!(caller = %principal.subject, "Admin token held by non-admin account");
                Err(IdentityError::PermissionDenied)
            }
            None => {
                warn!(caller = %principal.subject, "Admin token for deleted account");
                Err(IdentityError::InvalidToken)
            }
        }
    }

    /// Create an account on behalf of an admin
    pub async fn register(
        &self,
        caller_token: &str,
        email: &str,
        password: &str,
        role: &str,
    ) -> Result<User> {
        let admin = self.authorize_admin(caller_token).await?;

        let role = Role::parse(role).ok_or_else(|| {
            warn!(role = %role, "Registration rejected: invalid role");
            IdentityError::InvalidRole(role.to_string())
        })?;
        validators::check_new_credentials(email, password)?;

        if self.store.find_user(email).await?.is_some() {
            warn!(user = %email, "Registration rejected: user already exists");
            return Err(IdentityError::UserAlreadyExists);
        }

        let password_hash = self.hash_bounded(password).await?;
        let user = match self
            .store
            .create_user(NewUser {
                email: email.to_string(),
                password_hash,
                role,
            })
            .await
        {
            Ok(user) => user,
            Err(IdentityError::UserAlreadyExists) => {
                warn!(user = %email, "Registration lost race: user already exists");
                return Err(IdentityError::UserAlreadyExists);
            }
            Err(err) => return Err(err),
        };

        info!(
            user = %user.email,
            role = %user.role,
            registered_by = %admin.subject,
            "User registered successfully"
        );
        Ok(user)
    }

    /// Replace a password after re-checking the current one
    pub async fn change_password(
        &self,
        email: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let user = self.authenticate(email, current_password).await?;

        if !validators::validate_password(new_password) {
            return Err(IdentityError::Validation("invalid password".to_string()));
        }

        let password_hash = self.hash_bounded(new_password).await?;
        if !self.store.update_password(&user.email, &password_hash).await? {
            return Err(IdentityError::UserNotFound);
        }

        info!(user = %user.email, "Password changed");
        Ok(())
    }

    /// Remove an account on behalf of an admin
    ///
    /// Tokens already issued to the account stay valid for `ValidateToken`
    /// until they expire or are logged out, but no longer authorize admin
    /// operations. The last admin account is never removed.
    pub async fn delete_user(&self, caller_token: &str, email: &str) -> Result<()> {
        let admin = self.authorize_admin(caller_token).await?;

        if admin.subject == email {
            return Err(IdentityError::FailedPrecondition(
                "Admins cannot delete their own account".to_string(),
            ));
        }

        match self.store.delete_user_unless_last_admin(email).await? {
            UserDeletion::Deleted => {}
            UserDeletion::NotFound => return Err(IdentityError::UserNotFound),
            UserDeletion::LastAdmin => {
                return Err(IdentityError::FailedPrecondition(
                    "Cannot delete the last admin account".to_string(),
                ));
            }
        }

        info!(user = %email, deleted_by = %admin.subject, "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryCredentialStore;

    const SECRET: &str = "identity-service-unit-test-secret";
    const ISSUER: &str = "[::]:50051";

    async fn service_with(accounts: &[(&str, &str, Role)]) -> IdentityService {
        let store = Arc::new(MemoryCredentialStore::new());
        for (email, password, role) in accounts {
            store
                .create_user(NewUser {
                    email: email.to_string(),
                    password_hash: hash_password(password).unwrap(),
                    role: *role,
                })
                .await
                .unwrap();
        }
        let keys = JwtKeys::from_secret(SECRET, ISSUER).unwrap();
        IdentityService::new(store, keys, Duration::hours(2))
    }

    #[tokio::test]
    async fn test_login_token_carries_role() {
        let service = service_with(&[("t@x", "pw", Role::Teacher)]).await;
        let issued = service.login("t@x", "pw").await.unwrap();

        let validation = service.validate_token(&issued.token).await.unwrap();
        let principal = validation.principal().expect("valid");
        assert_eq!(principal.subject, "t@x");
        assert_eq!(principal.role, Role::Teacher);
        assert_eq!(principal.jti, issued.jti);
    }

    #[tokio::test]
    async fn test_empty_token_is_invalid_without_ledger_write() {
        let service = service_with(&[]).await;
        assert_eq!(
            service.validate_token("").await.unwrap(),
            TokenValidation::Invalid
        );
        assert_eq!(service.store().count_revocations().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_garbage_token_is_invalid_and_fingerprinted() {
        let service = service_with(&[]).await;
        assert!(!service.validate_token("abc.def.ghi").await.unwrap().is_valid());
        assert!(service
            .ledger()
            .is_unverified_revoked("abc.def.ghi")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_unknown_role_in_signed_token_is_invalid() {
        let service = service_with(&[]).await;
        let issued = service
            .keys()
            .issue("x@x", "superuser", Duration::hours(2), Utc::now())
            .unwrap();
        assert!(!service.validate_token(&issued.token).await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn test_logout_of_expired_token_succeeds() {
        let service = service_with(&[]).await;
        let issued = service
            .keys()
            .issue("s@x", "student", Duration::hours(2), Utc::now() - Duration::hours(3))
            .unwrap();

        service.logout(&issued.token).await.unwrap();
        assert!(service.ledger().is_revoked(&issued.jti).await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_caller_token() {
        let service = service_with(&[]).await;
        let err = service.register("", "n@x", "pw", "student").await.unwrap_err();
        assert!(matches!(err, IdentityError::MissingToken));
    }

    #[tokio::test]
    async fn test_invalid_role_rejected_before_creation() {
        let service = service_with(&[("admin@x", "p", Role::Admin)]).await;
        let admin = service.login("admin@x", "p").await.unwrap();

        let err = service
            .register(&admin.token, "n@x", "pw", "janitor")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::InvalidRole(_)));
        assert!(service.store().find_user("n@x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_identity_rejected() {
        let service = service_with(&[("admin@x", "p", Role::Admin)]).await;
        let admin = service.login("admin@x", "p").await.unwrap();

        let err = service
            .register(&admin.token, "", "pw", "student")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::Validation(_)));
    }

    #[tokio::test]
    async fn test_change_password() {
        let service = service_with(&[("s@x", "old", Role::Student)]).await;

        service.change_password("s@x", "old", "new").await.unwrap();
        assert!(matches!(
            service.login("s@x", "old").await,
            Err(IdentityError::InvalidCredentials)
        ));
        assert!(service.login("s@x", "new").await.is_ok());
    }

    #[tokio::test]
    async fn test_change_password_requires_current() {
        let service = service_with(&[("s@x", "old", Role::Student)]).await;

        assert!(matches!(
            service.change_password("s@x", "wrong", "new").await,
            Err(IdentityError::InvalidCredentials)
        ));
        assert!(matches!(
            service.change_password("nobody@x", "old", "new").await,
            Err(IdentityError::InvalidCredentials)
        ));
        assert!(matches!(
            service.change_password("s@x", "old", "").await,
            Err(IdentityError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_user_policy() {
        let service = service_with(&[
            ("admin@x", "p", Role::Admin),
            ("t@x", "pw", Role::Teacher),
        ])
        .await;
        let admin = service.login("admin@x", "p").await.unwrap();
        let teacher = service.login("t@x", "pw").await.unwrap();

        assert!(matches!(
            service.delete_user(&teacher.token, "admin@x").await,
            Err(IdentityError::PermissionDenied)
        ));
        assert!(matches!(
            service.delete_user(&admin.token, "admin@x").await,
            Err(IdentityError::FailedPrecondition(_))
        ));
        assert!(matches!(
            service.delete_user(&admin.token, "ghost@x").await,
            Err(IdentityError::UserNotFound)
        ));

        service.delete_user(&admin.token, "t@x").await.unwrap();
        assert!(service.store().find_user("t@x").await.unwrap().is_none());
        assert!(matches!(
            service.login("t@x", "pw").await,
            Err(IdentityError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_admin_token_requires_live_admin_account() {
        let service = service_with(&[("admin@x", "p", Role::Admin)]).await;

        // Signed with the service key but for an account that never existed
        let orphan = service
            .keys()
            .issue("gone@x", "admin", Duration::hours(2), Utc::now())
            .unwrap();
        assert!(service.validate_token(&orphan.token).await.unwrap().is_valid());
        assert!(matches!(
            service.register(&orphan.token, "n@x", "pw", "student").await,
            Err(IdentityError::InvalidToken)
        ));
        assert!(service.store().find_user("n@x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_password_hashing_waits_for_permit() {
        let service = service_with(&[("s@x", "pw", Role::Student)])
            .await
            .with_hashing_limit(1);

        let held = service.hashing.clone().acquire_owned().await.unwrap();
        let blocked =
            tokio::time::timeout(std::time::Duration::from_millis(200), service.login("s@x", "pw"))
                .await;
        assert!(blocked.is_err());

        drop(held);
        assert!(service.login("s@x", "pw").await.is_ok());
        assert_eq!(service.hashing.available_permits(), 1);
    }
}
