//! API key records.
//!
//! The plaintext token is shown to the user exactly once, at issue time.
//! Storage keeps only its SHA-256 digest (for lookup) and a masked form (for
//! listing).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ApiKeyId, UserId};

/// Prefix of every issued token.
pub const API_KEY_PREFIX: &str = "sk_";

/// Maximum length of a key's display name.
pub const MAX_KEY_NAME_LEN: usize = 100;

/// Characters kept at the front of a masked token.
const MASK_HEAD: usize = 8;

/// Characters kept at the end of a masked token.
const MASK_TAIL: usize = 4;

/// A stored API key, without its secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Public key id.
    pub id: ApiKeyId,

    /// Owner of the key.
    pub user_id: UserId,

    /// Display name chosen by the user.
    pub name: String,

    /// Optional origin the key is meant for.
    pub domain: Option<String>,

    /// Display-safe form of the token, e.g. `sk_1a2b3...9f0e`.
    pub key_masked: String,

    /// Revoked keys stay in the table with `is_active = false`.
    pub is_active: bool,

    /// Number of billed calls made with this key.
    pub usage_count: i64,

    /// When the key was issued.
    pub created_at: DateTime<Utc>,

    /// Last billed call, if any.
    pub last_used: Option<DateTime<Utc>>,
}

/// Mask a token for display: first 8 and last 4 characters.
///
/// Tokens too short to mask meaningfully are fully hidden.
#[must_use]
pub fn mask_token(token: &str) -> String {
    if token.len() <= MASK_HEAD + MASK_TAIL || !token.is_ascii() {
        return "*".repeat(token.chars().count());
    }
    format!(
        "{}...{}",
        &token[..MASK_HEAD],
        &token[token.len() - MASK_TAIL..]
    )
}
