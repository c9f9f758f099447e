use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Why a token ended up in the revocation ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    /// Explicit logout by the holder
    Logout,
    /// Found past its expiry during validation
    Expired,
    /// Failed signature or structure checks
    Invalid,
}

impl RevocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationReason::Logout => "logout",
            RevocationReason::Expired => "expired",
            RevocationReason::Invalid => "invalid",
        }
    }
}

/// Token revocation model for the ledger
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TokenRevocation {
    /// Token id, or SHA-256 fingerprint when the token could not be verified
    pub jti: String,
    pub reason: String,
    /// When the token would naturally expire
    pub expires_at: DateTime<Utc>,
    pub revoked_at: DateTime<Utc>,
}

impl TokenRevocation {
    pub fn new(jti: String, reason: RevocationReason, expires_at: DateTime<Utc>) -> Self {
        Self {
            jti,
            reason: reason.as_str().to_string(),
            expires_at,
            revoked_at: Utc::now(),
        }
    }

    /// Once the token's natural expiry has passed the entry carries no information
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
