//! Checksum utilities for content fingerprinting
//!
//! Fingerprints are lowercase hex SHA-256 digests. Exact string equality is the
//! only comparison the ingest pipeline performs on them.

use sha2::{Digest, Sha256};

/// Length of a SHA-256 fingerprint in hex characters
pub const FINGERPRINT_LEN: usize = 64;

/// Compute the SHA-256 fingerprint of in-memory content
pub fn fingerprint(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Compute a truncated SHA-256 fingerprint (used for audit identifiers)
///
/// `len` is clamped to the full digest length.
pub fn short_fingerprint(data: &[u8], len: usize) -> String {
    let mut digest = fingerprint(data);
    digest.truncate(len.min(FINGERPRINT_LEN));
    digest
}
