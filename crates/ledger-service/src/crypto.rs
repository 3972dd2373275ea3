//! API key token helpers.
//!
//! Tokens are `sk_` followed by 64 hex characters (32 random bytes). Only the
//! SHA-256 digest of a token is ever stored.

use rand::RngCore;
use sha2::{Digest, Sha256};

use ledger_core::API_KEY_PREFIX;

/// Random bytes in a token.
const TOKEN_BYTES: usize = 32;

/// Generate a fresh plaintext API key token.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("{API_KEY_PREFIX}{}", hex::encode(bytes))
}

/// Hex-encoded SHA-256 of a token, the form used for storage and lookup.
#[must_use]
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Constant-time string comparison to prevent timing attacks.
///
/// Used for the admin key, which is compared in plaintext against config.
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
