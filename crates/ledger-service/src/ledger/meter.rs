//! Usage metering for widget actions.

use ledger_core::{ActionCosts, LedgerError};
use ledger_store::SqliteStore;

use super::engine::{CreditEngine, UsageReceipt};
use super::gate::ApiKeyContext;

/// Prices widget actions and bills them to the key owner.
#[derive(Debug, Clone)]
pub struct UsageMeter {
    engine: CreditEngine,
    store: SqliteStore,
    costs: ActionCosts,
}

impl UsageMeter {
    /// Create a meter billing through `engine`.
    #[must_use]
    pub const fn new(engine: CreditEngine, store: SqliteStore, costs: ActionCosts) -> Self {
        Self {
            engine,
            store,
            costs,
        }
    }

    /// Bill one action for the authenticated key.
    ///
    /// An explicit `cost` overrides the table and is only for trusted
    /// in-process callers; the widget route always passes `None`. Without
    /// one the action must be priced in the table.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidInput` if the action is blank.
    /// - `LedgerError::UnknownAction` if there is no cost and no table entry.
    /// - Otherwise as [`CreditEngine::apply_key_usage`].
    pub async fn meter(
        &self,
        ctx: &ApiKeyContext,
        action: &str,
        cost: Option<i64>,
        idempotency_key: Option<String>,
    ) -> ledger_core::Result<UsageReceipt> {
        let action = action.trim();
        if action.is_empty() {
            return Err(LedgerError::InvalidInput("action is required".into()));
        }
        let credits = match cost {
            Some(credits) => credits,
            None => self.costs.cost_of(action)?,
        };

        let receipt = self
            .engine
            .apply_key_usage(
                ctx.key_id,
                ctx.user.id,
                credits,
                format!("Widget {action} via {}", ctx.key_name),
                idempotency_key,
            )
            .await?;

        // The debit is committed; a lost counter update only skews stats.
        if let Err(err) = self.store.record_api_key_use(&ctx.key_id).await {
            tracing::warn!(key_id = %ctx.key_id, error = %err, "Failed to record API key use");
        }

        Ok(receipt)
    }
}
