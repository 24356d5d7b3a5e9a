use sha2::{Digest, Sha256};

/// Hex SHA-256 of snapshot content.
pub fn content_fingerprint(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}
