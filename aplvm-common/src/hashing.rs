//! SHA-256 helpers shared by `app_id` derivation, cache keys, and checksum
//! manifests.

use sha2::{Digest, Sha256};

/// Full lower-case hex digest of `bytes`.
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    hex::encode(hasher.finalize())
}

/// First `len` hex characters of the SHA-256 digest of `bytes`.
///
/// Used for `app_id` (first 12 characters of the canonical program hash)
/// and for cache-key sharding prefixes (first 2 characters).
pub fn sha256_prefix(bytes: impl AsRef<[u8]>, len: usize) -> String {
    let full = sha256_hex(bytes);
    full[..len.min(full.len())].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
        );
    }

    #[test]
    fn prefix_is_stable() {
        let full = sha256_hex(b"hello");
        let prefix = sha256_prefix(b"hello", 12);
        assert_eq!(&full[..12], prefix);
    }
}
