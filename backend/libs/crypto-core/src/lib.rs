//! Cryptographic primitives shared by platform services
//!
//! - `jwt`: HS256 bearer token codec (issue and verify)
//! - `hash`: SHA-256 helpers and token fingerprints
pub mod hash;
pub mod jwt;

pub use hash::{sha256, token_fingerprint};
pub use jwt::{Claims, IssuedToken, JwtKeys, TokenError};
