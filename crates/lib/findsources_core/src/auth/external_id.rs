//! Keyed hashing of identity-provider subject ids.

use sha2::{Digest, Sha256};

/// Hash an external id so it is never stored in clear.
///
/// The key is mixed in so the stored value cannot be matched against a
/// provider's subject ids without it.
pub fn hash_external_id(key: &str, external_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(b":");
    hasher.update(external_id.as_bytes());
    format!("{:x}", hasher.finalize())
}
