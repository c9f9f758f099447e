use crypto_core::TokenError;
use thiserror::Error;
use tonic::{Code, Status};

pub type Result<T> = std::result::Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Authentication required")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("User already exists")]
    UserAlreadyExists,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid role: {0}")]
    InvalidRole(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("JWT error: {0}")]
    JwtError(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IdentityError {
    /// Convert to gRPC Status for wire protocol
    pub fn to_status(&self) -> Status {
        match self {
            IdentityError::InvalidCredentials => {
                Status::new(Code::Unauthenticated, "Invalid credentials")
            }
            IdentityError::MissingToken => {
                Status::new(Code::Unauthenticated, "Authentication required")
            }
            IdentityError::InvalidToken => {
                Status::new(Code::Unauthenticated, "Invalid, expired, or revoked token")
            }
            IdentityError::PermissionDenied => Status::new(
                Code::PermissionDenied,
                "Only admins can perform this operation",
            ),
            IdentityError::UserAlreadyExists => {
                Status::new(Code::AlreadyExists, "User already exists")
            }
            IdentityError::UserNotFound => Status::new(Code::NotFound, "User not found"),
            IdentityError::InvalidRole(_) => Status::new(Code::InvalidArgument, "Invalid role"),
            IdentityError::Validation(msg) => {
                Status::new(Code::InvalidArgument, format!("Validation error: {}", msg))
            }
            IdentityError::FailedPrecondition(msg) => {
                Status::new(Code::FailedPrecondition, msg.clone())
            }
            IdentityError::Database(_)
            | IdentityError::JwtError(_)
            | IdentityError::Config(_)
            | IdentityError::Internal(_) => {
                // Don't leak internal details to callers
                Status::new(Code::Internal, "Internal server error")
            }
        }
    }

    /// Whether this error is a server-side fault rather than a caller mistake
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            IdentityError::Database(_)
                | IdentityError::JwtError(_)
                | IdentityError::Config(_)
                | IdentityError::Internal(_)
        )
    }
}

/// True when the database rejected a write because of a unique constraint
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

// Conversions from external error types
impl From<sqlx::Error> for IdentityError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);
        IdentityError::Database(err.to_string())
    }
}

impl From<TokenError> for IdentityError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed(_) | TokenError::BadSignature | TokenError::Expired { .. } => {
                IdentityError::InvalidToken
            }
            TokenError::Signing(_) | TokenError::InvalidKey(_) => {
                tracing::error!("JWT error: {}", err);
                IdentityError::JwtError(err.to_string())
            }
        }
    }
}

impl From<tokio::task::JoinError> for IdentityError {
    fn from(err: tokio::task::JoinError) -> Self {
        tracing::error!("Blocking task failed: {}", err);
        IdentityError::Internal(err.to_string())
    }
}

// gRPC Status conversion
impl From<IdentityError> for Status {
    fn from(err: IdentityError) -> Self {
        err.to_status()
    }
}
