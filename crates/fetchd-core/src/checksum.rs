//! SHA-256 digests for fetched bodies, reported alongside batch results so
//! clients can dedupe or verify content without re-downloading it.

use sha2::{Digest, Sha256};

/// SHA-256 of `data` as lowercase hex.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
