use sha2::{Digest, Sha256};

/// Prefix of every digest produced by this crate.
pub const SHA256_PREFIX: &str = "sha256:";

/// Compute the `sha256:<hex>` digest of `data`.
pub fn sha256_digest(data: &[u8]) -> String {
    format!("{}{}", SHA256_PREFIX, hex_digest(data))
}

/// Compute the lowercase SHA-256 hex digest of `data`.
pub fn hex_digest(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    hex_encode(&hash)
}

/// Extract the hex portion from a digest string like "sha256:abcdef…".
pub fn hex_from_digest(digest: &str) -> &str {
    digest.strip_prefix(SHA256_PREFIX).unwrap_or(digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
