//! Bearer token helpers for services that consume IDM
//!
//! A downstream service pulls the token out of the `authorization` metadata,
//! sends it to `ValidateToken`, and gates the endpoint on the returned role.

use crate::grpc::idm::ValidateTokenResponse;
use crate::models::Role;
use tonic::metadata::MetadataMap;
use tonic::Status;
use tracing::warn;

/// Extract the token from an `authorization: Bearer <token>` header
pub fn extract_bearer_token(metadata: &MetadataMap) -> Result<&str, Status> {
    let auth_header = metadata.get("authorization").ok_or_else(|| {
        warn!("Missing authorization header");
        Status::unauthenticated("Missing authorization header")
    })?;

    let auth_str = auth_header.to_str().map_err(|e| {
        warn!("Invalid authorization header encoding: {}", e);
        Status::unauthenticated("Invalid authorization header")
    })?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            warn!("Invalid authorization format (expected 'Bearer <token>')");
            Status::unauthenticated("Invalid authorization format")
        })?;

    Ok(token)
}

/// Caller identity confirmed by `ValidateToken`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPrincipal {
    pub username: String,
    pub role: Role,
}

impl TryFrom<ValidateTokenResponse> for ValidatedPrincipal {
    type Error = Status;

    fn try_from(response: ValidateTokenResponse) -> Result<Self, Self::Error> {
        if !response.valid {
            return Err(Status::unauthenticated("Invalid, expired, or revoked token"));
        }

        let role = Role::parse(&response.role).ok_or_else(|| {
            warn!(role = %response.role, "Validated token carries unknown role");
            Status::unauthenticated("Invalid token")
        })?;

        Ok(Self {
            username: response.username,
            role,
        })
    }
}

impl ValidatedPrincipal {
    /// Reject the call unless the caller's role is one of `allowed`
    pub fn require_role(&self, allowed: &[Role]) -> Result<(), Status> {
        if allowed.contains(&self.role) {
            return Ok(());
        }

        warn!(
            user = %self.username,
            role = %self.role,
            "Caller role not permitted for this operation"
        );
        Err(Status::permission_denied(
            "Role not permitted for this operation",
        ))
    }
}
