//! Cache key derivation.

use sha2::{Digest, Sha256};

const FINGERPRINT_LEN: usize = 64;

/// Returns the lowercase hex SHA-256 of `identity`.
#[must_use]
pub fn fingerprint(identity: &str) -> String {
    format!("{:x}", Sha256::digest(identity.as_bytes()))
}

/// Returns true when `name` looks like a value produced by [`fingerprint`].
pub(super) fn is_fingerprint(name: &str) -> bool {
    name.len() == FINGERPRINT_LEN
        && name
            .bytes()
            .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte))
}
