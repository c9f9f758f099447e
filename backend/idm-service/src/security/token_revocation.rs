/// JWT Token Revocation Ledger
///
/// Tracks token ids that must no longer validate: tokens ended by logout,
/// tokens found expired during validation, and tokens that failed verification.
///
/// ## Architecture
///
/// - **Ledger** (this module): revocation policy on top of the credential store
/// - **Store** (`db::CredentialStore`): the persistent set itself
///
/// ## Keys
///
/// A verified token is keyed by its `jti`. A token whose signature does not
/// verify is keyed by the SHA-256 fingerprint of the raw string instead, so a
/// forged token can never revoke somebody else's `jti`.
///
/// ## Growth
///
/// Every entry remembers when its token would expire anyway. Past that point
/// the entry carries no information, and the sweeper deletes it, bounding the
/// ledger to the live-token window.
use crate::db::CredentialStore;
use crate::error::Result;
use crate::models::{RevocationReason, TokenRevocation};
use chrono::{DateTime, Duration, Utc};
use crypto_core::{token_fingerprint, Claims};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

#[derive(Clone)]
pub struct RevocationLedger {
    store: Arc<dyn CredentialStore>,
    token_ttl: Duration,
}

impl RevocationLedger {
    /// `token_ttl` bounds how long an unverifiable token could possibly live,
    /// and is used as the retention window for fingerprint entries.
    pub fn new(store: Arc<dyn CredentialStore>, token_ttl: Duration) -> Self {
        Self { store, token_ttl }
    }

    /// Revoke a verified token by its claims
    ///
    /// Idempotent: revoking an already revoked token succeeds.
    pub async fn revoke(&self, claims: &Claims, reason: RevocationReason) -> Result<()> {
        let inserted = self
            .store
            .revoke_token(TokenRevocation::new(
                claims.jti.clone(),
                reason,
                claims.expires_at(),
            ))
            .await?;

        if inserted {
            info!(jti = %claims.jti, reason = reason.as_str(), "Token revoked");
        } else {
            debug!(jti = %claims.jti, "Token already revoked");
        }
        Ok(())
    }

    /// Revoke a token that could not be verified, keyed by its fingerprint
    pub async fn revoke_unverified(
        &self,
        token: &str,
        reason: RevocationReason,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let fingerprint = token_fingerprint(token);
        let inserted = self
            .store
            .revoke_token(TokenRevocation::new(
                fingerprint.clone(),
                reason,
                now + self.token_ttl,
            ))
            .await?;

        if inserted {
            info!(
                fingerprint = %fingerprint,
                reason = reason.as_str(),
                "Unverifiable token revoked"
            );
        }
        Ok(())
    }

    /// Check if a token id is in the ledger
    pub async fn is_revoked(&self, jti: &str) -> Result<bool> {
        self.store.is_token_revoked(jti).await
    }

    /// Check if a raw unverifiable token was revoked by fingerprint
    pub async fn is_unverified_revoked(&self, token: &str) -> Result<bool> {
        self.store.is_token_revoked(&token_fingerprint(token)).await
    }

    /// Delete entries whose token would have expired by `now`
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        self.store.delete_expired_revocations(now).await
    }
}

/// Spawn background sweep of expired ledger entries
///
/// Runs until aborted. A failed sweep is logged and retried on the next tick.
///
/// ## Returns
///
/// JoinHandle for background task
pub fn spawn_revocation_sweeper(
    ledger: RevocationLedger,
    period: std::time::Duration,
) -> JoinHandle<()> {
    info!(
        interval_secs = period.as_secs(),
        "Starting revocation ledger sweeper"
    );

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match ledger.sweep_expired(Utc::now()).await {
                Ok(0) => debug!("Revocation sweep found nothing to remove"),
                Ok(removed) => info!(removed, "Swept expired revocation entries"),
                Err(err) => error!("Revocation sweep failed: {}", err),
            }
        }
    })
}
