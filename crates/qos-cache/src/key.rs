//! Cache keys binding a snapshot to one (account, credential) pair.

use sha2::{Digest, Sha256};
use std::fmt::Write as _;

const FINGERPRINT_LENGTH: usize = 16;

/// Fingerprint used when no credential material is available.
pub const NO_CREDENTIAL: &str = "none";

/// First 16 hex chars of SHA-256 over the credential, never the credential
/// itself. Empty input yields [`NO_CREDENTIAL`].
pub fn credential_fingerprint(secret: &str) -> String {
    if secret.is_empty() {
        return NO_CREDENTIAL.to_string();
    }
    let digest = Sha256::digest(secret.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        // Writing to String cannot fail.
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex[..FINGERPRINT_LENGTH].to_string()
}

/// `"<account>::<fingerprint>"`.
pub fn cache_key(account_id: &str, fingerprint: &str) -> String {
    format!("{account_id}::{fingerprint}")
}
