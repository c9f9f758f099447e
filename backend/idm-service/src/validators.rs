use crate::error::{IdentityError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Input validation utilities for idm service

// Hardcoded pattern; a failure here is a source bug, not a runtime condition
static IDENTITY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s\p{Cc}]+$").expect("hardcoded identity regex is invalid - fix source code")
});

const MAX_IDENTITY_LEN: usize = 254;
const MAX_PASSWORD_LEN: usize = 1024;

/// Validate an account identity (email-like login name)
///
/// Only the shape the store can hold is enforced: non-empty, at most 254
/// bytes, no whitespace or control characters.
pub fn validate_identity(identity: &str) -> bool {
    !identity.is_empty() && identity.len() <= MAX_IDENTITY_LEN && IDENTITY_REGEX.is_match(identity)
}

/// Validate a plaintext password before hashing
///
/// No strength policy; just non-empty and bounded so hashing cost stays bounded.
pub fn validate_password(password: &str) -> bool {
    !password.is_empty() && password.len() <= MAX_PASSWORD_LEN
}

/// Reject a new account's identity/password pair with `Validation`
pub fn check_new_credentials(identity: &str, password: &str) -> Result<()> {
    if !validate_identity(identity) {
        return Err(IdentityError::Validation("invalid username".to_string()));
    }
    if !validate_password(password) {
        return Err(IdentityError::Validation("invalid password".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_shapes() {
        assert!(validate_identity("admin@x"));
        assert!(validate_identity("t1@school.edu"));
        assert!(!validate_identity(""));
        assert!(!validate_identity("has space@x"));
        assert!(!validate_identity("tab\t@x"));
        assert!(!validate_identity(&"a".repeat(255)));
    }

    #[test]
    fn test_password_shapes() {
        assert!(validate_password("p"));
        assert!(!validate_password(""));
        assert!(!validate_password(&"a".repeat(1025)));
    }

    #[test]
    fn test_check_new_credentials() {
        assert!(check_new_credentials("t1@x", "pw1").is_ok());
        assert!(matches!(
            check_new_credentials("", "pw1"),
            Err(IdentityError::Validation(_))
        ));
        assert!(matches!(
            check_new_credentials("t1@x", ""),
            Err(IdentityError::Validation(_))
        ));
    }
}
