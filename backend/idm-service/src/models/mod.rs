/// Data models for identity and authentication
pub mod token_revocation;
pub mod user;

pub use token_revocation::{RevocationReason, TokenRevocation};
pub use user::{NewUser, Role, User};
