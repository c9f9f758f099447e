/// Security module for authentication and authorization
///
/// Provides core security primitives for idm-service:
/// - Password hashing and verification (Argon2id)
/// - JWT token issuance and validation (HS256 via crypto-core)
/// - Token revocation ledger with periodic sweep
///
/// ## Architecture
///
/// - **crypto-core::jwt**: Shared JWT codec
/// - **password**: Argon2id password hashing
/// - **token_revocation**: Revoked token ids, persisted through the credential store
// Re-export JWT functionality from shared crypto-core library
pub use crypto_core::jwt::{Claims, IssuedToken, JwtKeys, TokenError};

pub mod password;
pub mod token_revocation;

pub use password::{hash_password, verify_password};
pub use token_revocation::{spawn_revocation_sweeper, RevocationLedger};
