//! Operator password hashing via bcrypt.
//!
//! The salt is derived from the operator's username, so the same
//! username/password pair always hashes to the same string.

use sha2::{Digest, Sha256};

use super::AuthError;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

/// Lower-case the username and strip all whitespace.
fn normalize_username(username: &str) -> String {
    username
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// 16-byte bcrypt salt taken from SHA-256 of the normalised username.
fn operator_salt(username: &str) -> [u8; 16] {
    let digest = Sha256::digest(normalize_username(username).as_bytes());
    let mut salt = [0u8; 16];
    salt.copy_from_slice(&digest[..16]);
    salt
}

/// Hash an operator password (bcrypt, cost 10, username-derived salt).
pub fn hash_password(username: &str, password: &str) -> Result<String, AuthError> {
    bcrypt::hash_with_salt(password, BCRYPT_COST, operator_salt(username))
        .map(|parts| parts.to_string())
        .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash).map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashing_is_deterministic_per_username() {
        let a = hash_password("Admin User", "hunter22").unwrap();
        let b = hash_password("adminuser", "hunter22").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, hash_password("someone", "hunter22").unwrap());
    }

    #[test]
    fn verify_accepts_right_password_only() {
        let hash = hash_password("admin", "correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }
}
