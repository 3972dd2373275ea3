//! API key gate.

use std::fmt;

use chrono::Utc;

use ledger_core::{mask_token, ApiKey, ApiKeyId, LedgerError, User, UserId, MAX_KEY_NAME_LEN};
use ledger_store::SqliteStore;

use crate::crypto::{generate_token, hash_token};

/// Longest accepted `domain` on a key.
const MAX_DOMAIN_LEN: usize = 253;

/// The caller behind a valid API key.
#[derive(Debug, Clone)]
pub struct ApiKeyContext {
    /// Key that authenticated the request.
    pub key_id: ApiKeyId,
    /// Its display name.
    pub key_name: String,
    /// The key's owner.
    pub user: User,
    /// Owner's balance at authentication time.
    pub balance: i64,
}

/// A newly issued key together with its one-time plaintext token.
#[derive(Clone)]
pub struct IssuedKey {
    /// The stored record.
    pub key: ApiKey,
    /// The token. Never stored, never logged.
    pub plaintext: String,
}

impl fmt::Debug for IssuedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedKey")
            .field("key", &self.key)
            .field("plaintext", &"<redacted>")
            .finish()
    }
}

/// Issues and checks API keys.
#[derive(Debug, Clone)]
pub struct KeyGate {
    store: SqliteStore,
    min_balance: i64,
}

impl KeyGate {
    /// Create a gate requiring `min_balance` credits to authenticate.
    #[must_use]
    pub const fn new(store: SqliteStore, min_balance: i64) -> Self {
        Self { store, min_balance }
    }

    /// Resolve a presented key to its owner.
    ///
    /// # Errors
    ///
    /// - `LedgerError::MissingKey` if no key (or a blank one) was presented.
    /// - `LedgerError::InvalidKey` if the key is unknown or revoked, or its
    ///   owner is disabled.
    /// - `LedgerError::InsufficientCredits` if the owner's balance is below
    ///   the minimum.
    pub async fn authenticate(&self, raw_key: Option<&str>) -> ledger_core::Result<ApiKeyContext> {
        let raw_key = raw_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(LedgerError::MissingKey)?;

        let key = self
            .store
            .find_api_key_by_hash(&hash_token(raw_key))
            .await?
            .filter(|k| k.is_active)
            .ok_or(LedgerError::InvalidKey)?;

        let user = match self.store.get_user(&key.user_id).await {
            Ok(user) if user.is_active => user,
            Ok(_) | Err(LedgerError::UserNotFound { .. }) => {
                tracing::debug!(key_id = %key.id, "API key owner missing or disabled");
                return Err(LedgerError::InvalidKey);
            }
            Err(err) => return Err(err),
        };

        if user.credits < self.min_balance {
            return Err(LedgerError::InsufficientCredits {
                balance: user.credits,
                required: self.min_balance,
            });
        }

        Ok(ApiKeyContext {
            key_id: key.id,
            key_name: key.name,
            balance: user.credits,
            user,
        })
    }

    /// Issue a new key for `user_id`.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidInput` if the name is blank or too long, or
    ///   the domain is too long.
    /// - `LedgerError::UserNotFound` if the user does not exist.
    pub async fn issue_key(
        &self,
        user_id: UserId,
        name: &str,
        domain: Option<&str>,
    ) -> ledger_core::Result<IssuedKey> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::InvalidInput("key name is required".into()));
        }
        if name.chars().count() > MAX_KEY_NAME_LEN {
            return Err(LedgerError::InvalidInput(format!(
                "key name exceeds {MAX_KEY_NAME_LEN} characters"
            )));
        }
        let domain = domain.map(str::trim).filter(|d| !d.is_empty());
        if domain.is_some_and(|d| d.len() > MAX_DOMAIN_LEN) {
            return Err(LedgerError::InvalidInput(format!(
                "domain exceeds {MAX_DOMAIN_LEN} characters"
            )));
        }

        // Fail with a clear error rather than a foreign key violation.
        self.store.get_user(&user_id).await?;

        let plaintext = generate_token();
        let key = ApiKey {
            id: ApiKeyId::generate(),
            user_id,
            name: name.to_string(),
            domain: domain.map(str::to_string),
            key_masked: mask_token(&plaintext),
            is_active: true,
            usage_count: 0,
            created_at: Utc::now(),
            last_used: None,
        };
        self.store
            .insert_api_key(&key, &hash_token(&plaintext))
            .await?;

        tracing::info!(user_id = %user_id, key_id = %key.id, "API key issued");

        Ok(IssuedKey { key, plaintext })
    }

    /// Revoke one of `user_id`'s keys. Revoking twice is not an error.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::KeyNotFound` if the key does not exist or
    /// belongs to another user.
    pub async fn revoke_key(&self, user_id: UserId, key_id: ApiKeyId) -> ledger_core::Result<()> {
        self.store.deactivate_api_key(&user_id, &key_id).await?;
        tracing::info!(user_id = %user_id, key_id = %key_id, "API key revoked");
        Ok(())
    }

    /// A user's keys, masked, newest first.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::StoreUnavailable` if the store fails.
    pub async fn list_keys(&self, user_id: UserId) -> ledger_core::Result<Vec<ApiKey>> {
        self.store.list_api_keys(&user_id).await
    }
}
