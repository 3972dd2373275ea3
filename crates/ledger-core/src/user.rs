//! Ledger user records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{UserId, WalletAddress};

/// A ledger user, keyed by wallet address.
///
/// Users are created on their first authenticated request and never deleted;
/// `is_active = false` soft-disables them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Internal user id.
    pub id: UserId,

    /// Normalized wallet address (unique).
    pub address: WalletAddress,

    /// Current credit balance. Never negative.
    pub credits: i64,

    /// Lifetime amount paid for credits, in cents.
    pub total_spent_cents: i64,

    /// Whether the user may authenticate with API keys.
    pub is_active: bool,

    /// When the user was created.
    pub created_at: DateTime<Utc>,

    /// When the user record was last changed.
    pub updated_at: DateTime<Utc>,

    /// Last authenticated request from this address.
    pub last_login: DateTime<Utc>,
}

impl User {
    /// Create a new active user with zero balance.
    #[must_use]
    pub fn new(address: WalletAddress) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::generate(),
            address,
            credits: 0,
            total_spent_cents: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login: now,
        }
    }

    /// Check if the balance covers a debit of `credits`.
    #[must_use]
    pub fn has_sufficient_credits(&self, credits: i64) -> bool {
        self.credits >= credits
    }
}
