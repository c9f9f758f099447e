/// Shared JWT codec for the academic-records platform
///
/// Issues and verifies the role-tagged bearer tokens handed out by the IDM
/// service. Every token carries `iss`, `sub`, `role`, `jti`, `iat` and `exp`
/// and is signed with HS256 using a secret that only the IDM service holds.
///
/// ## Security Design
///
/// - **HS256 only**: the algorithm is pinned on both sides; a token whose header
///   names another algorithm fails as a bad signature
/// - **No hardcoded keys**: the secret is injected through `JwtKeys::from_secret`
/// - **Signature before expiry**: an expired token is reported as `Expired` only
///   after its signature verified, so callers can trust the returned claims
/// - **Pure**: nothing here touches storage; revocation is the caller's job
///
/// ## Usage
///
/// ```rust
/// use chrono::{Duration, Utc};
/// use crypto_core::jwt::JwtKeys;
///
/// let keys = JwtKeys::from_secret("change-me", "[::]:50051").unwrap();
/// let issued = keys.issue("admin@x", "admin", Duration::hours(2), Utc::now()).unwrap();
/// let claims = keys.parse_and_verify(&issued.token, Utc::now()).unwrap();
/// assert_eq!(claims.role, "admin");
/// ```
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Default bearer token lifetime (2 hours)
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 2 * 60 * 60;

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

// ============================================================================
// Data Structures
// ============================================================================

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Issuing authority
    pub iss: String,
    /// Subject (account email)
    pub sub: String,
    /// Role at issuance time: "admin", "teacher" or "student"
    pub role: String,
    /// Unique token id, fresh per issuance
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        timestamp_to_datetime(self.exp)
    }
}

/// A freshly signed token together with the bookkeeping fields callers need
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token signature verification failed")]
    BadSignature,

    #[error("token expired")]
    Expired { claims: Claims },

    #[error("failed to sign token: {0}")]
    Signing(String),

    #[error("invalid signing key: {0}")]
    InvalidKey(String),
}

// ============================================================================
// Keys
// ============================================================================

/// Signing and verification keys plus the issuer they vouch for.
///
/// Built once at startup from configuration and shared by reference; cloning
/// is cheap enough to hand a copy to each service that needs one.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
}

impl fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtKeys")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl JwtKeys {
    /// Build keys from a shared HMAC secret
    ///
    /// ## Errors
    ///
    /// Returns `TokenError::InvalidKey` if the secret or issuer is empty.
    pub fn from_secret(secret: &str, issuer: &str) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::InvalidKey("signing secret is empty".into()));
        }
        if issuer.is_empty() {
            return Err(TokenError::InvalidKey("issuer is empty".into()));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    // ========================================================================
    // Token Generation
    // ========================================================================

    /// Sign a new token for `subject` with `role`, valid for `ttl` from `issued_at`
    ///
    /// A fresh UUIDv4 is used as `jti` so two tokens for the same account are
    /// always distinguishable in the revocation ledger.
    pub fn issue(
        &self,
        subject: &str,
        role: &str,
        ttl: Duration,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let expires_at = issued_at + ttl;
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            role: role.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            token,
            jti: claims.jti,
            expires_at: timestamp_to_datetime(claims.exp),
        })
    }

    // ========================================================================
    // Token Validation
    // ========================================================================

    /// Verify the signature and issuer, then check expiry against `now`
    ///
    /// ## Errors
    ///
    /// - `Malformed` if the token cannot be decoded
    /// - `BadSignature` if the HMAC, algorithm or issuer does not match
    /// - `Expired` if `now >= exp`; carries the verified claims
    pub fn parse_and_verify(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(JWT_ALGORITHM);
        // Expiry is checked below against the caller's clock, after the signature.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidIssuer => TokenError::BadSignature,
                _ => TokenError::Malformed(e.to_string()),
            }
        })?;

        if now.timestamp() >= data.claims.exp {
            return Err(TokenError::Expired {
                claims: data.claims,
            });
        }

        Ok(data.claims)
    }
}

fn timestamp_to_datetime(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-signing-secret-for-unit-tests-only";
    const TEST_ISSUER: &str = "[::]:50051";

    fn keys() -> JwtKeys {
        JwtKeys::from_secret(TEST_SECRET, TEST_ISSUER).expect("keys")
    }

    #[test]
    fn test_issue_produces_three_part_token() {
        let issued = keys()
            .issue("admin@x", "admin", Duration::hours(2), Utc::now())
            .expect("issue");

        assert_eq!(issued.token.matches('.').count(), 2);
        assert!(Uuid::parse_str(&issued.jti).is_ok());
    }

    #[test]
    fn test_roundtrip_claims() {
        let now = Utc::now();
        let keys = keys();
        let issued = keys
            .issue("t1@x", "teacher", Duration::hours(2), now)
            .expect("issue");

        let claims = keys.parse_and_verify(&issued.token, now).expect("valid");
        assert_eq!(claims.sub, "t1@x");
        assert_eq!(claims.role, "teacher");
        assert_eq!(claims.iss, TEST_ISSUER);
        assert_eq!(claims.jti, issued.jti);
        assert_eq!(claims.exp - claims.iat, DEFAULT_TOKEN_TTL_SECS);
    }

    #[test]
    fn test_jti_unique_per_issuance() {
        let now = Utc::now();
        let keys = keys();
        let a = keys.issue("s@x", "student", Duration::hours(2), now).unwrap();
        let b = keys.issue("s@x", "student", Duration::hours(2), now).unwrap();
        assert_ne!(a.jti, b.jti);
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_expired_after_ttl() {
        let issued_at = Utc::now() - Duration::hours(2) - Duration::seconds(1);
        let keys = keys();
        let issued = keys
            .issue("s@x", "student", Duration::hours(2), issued_at)
            .unwrap();

        match keys.parse_and_verify(&issued.token, Utc::now()) {
            Err(TokenError::Expired { claims }) => assert_eq!(claims.jti, issued.jti),
            other => panic!("expected Expired, got {:?}", other),
        }
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let issued_at = Utc::now();
        let keys = keys();
        let issued = keys
            .issue("s@x", "student", Duration::hours(2), issued_at)
            .unwrap();

        let at_expiry = issued_at + Duration::hours(2);
        assert!(matches!(
            keys.parse_and_verify(&issued.token, at_expiry),
            Err(TokenError::Expired { .. })
        ));
        assert!(keys
            .parse_and_verify(&issued.token, at_expiry - Duration::seconds(1))
            .is_ok());
    }

    #[test]
    fn test_wrong_secret_is_bad_signature() {
        let issued = keys()
            .issue("admin@x", "admin", Duration::hours(2), Utc::now())
            .unwrap();
        let other = JwtKeys::from_secret("another-secret", TEST_ISSUER).unwrap();

        assert!(matches!(
            other.parse_and_verify(&issued.token, Utc::now()),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn test_expired_with_wrong_secret_reports_signature_first() {
        let issued = keys()
            .issue("admin@x", "admin", Duration::hours(2), Utc::now() - Duration::days(1))
            .unwrap();
        let other = JwtKeys::from_secret("another-secret", TEST_ISSUER).unwrap();

        assert!(matches!(
            other.parse_and_verify(&issued.token, Utc::now()),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let issued = JwtKeys::from_secret(TEST_SECRET, "somebody-else")
            .unwrap()
            .issue("admin@x", "admin", Duration::hours(2), Utc::now())
            .unwrap();

        assert!(matches!(
            keys().parse_and_verify(&issued.token, Utc::now()),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            keys().parse_and_verify("invalid.token.here", Utc::now()),
            Err(TokenError::Malformed(_))
        ));
        assert!(matches!(
            keys().parse_and_verify("", Utc::now()),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(matches!(
            JwtKeys::from_secret("", TEST_ISSUER),
            Err(TokenError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", keys());
        assert!(!rendered.contains(TEST_SECRET));
        assert!(rendered.contains("REDACTED"));
    }
}
