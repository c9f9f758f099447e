/// Database operations for idm-service
pub mod memory;
pub mod postgres;
pub mod store;
pub mod token_revocation;
pub mod users;

// Re-export commonly used types
pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;
pub use store::{CredentialStore, UserDeletion};
