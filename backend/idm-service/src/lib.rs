/// IDM Service Library
///
/// Identity and access authority for the academic-records platform: issues,
/// validates and revokes role-tagged bearer tokens, and manages accounts.
///
/// ## Modules
///
/// - `bearer`: Helpers for services that consume ValidateToken
/// - `config`: Service configuration
/// - `db`: Credential store (PostgreSQL and in-memory)
/// - `error`: Error types
/// - `grpc`: gRPC server implementation
/// - `models`: Data models
/// - `security`: JWT, password hashing, token revocation ledger
/// - `services`: Business logic (identity operations, admin bootstrap)
/// - `validators`: Input validation
pub mod bearer;
pub mod config;
pub mod db;
pub mod error;
pub mod grpc;
pub mod models;
pub mod security;
pub mod services;
pub mod validators;

// Re-export commonly used types
pub use error::{IdentityError, Result};
pub use grpc::IdentityServiceServer;
pub use services::IdentityService;
