/// Service layer for idm-service
///
/// - Identity: login, token validation, logout, admin-managed accounts
/// - Bootstrap: first admin account at startup
pub mod bootstrap;
pub mod identity;

pub use bootstrap::{ensure_admin, BootstrapOutcome};
pub use identity::{IdentityService, Principal, TokenValidation};
