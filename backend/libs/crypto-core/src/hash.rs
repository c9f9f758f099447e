use sha2::{Digest, Sha256};

/// Compute SHA256 hash of input bytes
pub fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

/// Hex-encoded SHA-256 of a raw token string
///
/// Used as the revocation key for tokens whose `jti` cannot be read, so the
/// raw bearer value never has to be stored.
pub fn token_fingerprint(token: &str) -> String {
    hex::encode(sha256(token.as_bytes()))
}
