//! Read-only usage and ledger summaries.
//!
//! Nothing here touches a balance. Usage figures are derived from `usage`
//! ledger rows, so they always agree with the history.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ApiKeyId, CreditTransaction, LedgerError, User, WalletAddress};

/// Reporting window for usage charts, counted in whole UTC days ending today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UsagePeriod {
    /// Last 7 days.
    #[serde(rename = "7d")]
    Week,
    /// Last 30 days.
    #[default]
    #[serde(rename = "30d")]
    Month,
    /// Last 90 days.
    #[serde(rename = "90d")]
    Quarter,
}

impl UsagePeriod {
    /// Number of days covered, today included.
    #[must_use]
    pub const fn days(&self) -> u32 {
        match self {
            Self::Week => 7,
            Self::Month => 30,
            Self::Quarter => 90,
        }
    }

    /// The query-string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Week => "7d",
            Self::Month => "30d",
            Self::Quarter => "90d",
        }
    }

    /// First day of the window ending on `today`.
    #[must_use]
    pub fn start(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.days() - 1)))
            .unwrap_or(NaiveDate::MIN)
    }
}

impl fmt::Display for UsagePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UsagePeriod {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" => Ok(Self::Week),
            "30d" => Ok(Self::Month),
            "90d" => Ok(Self::Quarter),
            other => Err(LedgerError::InvalidInput(format!(
                "period must be 7d, 30d or 90d, got {other}"
            ))),
        }
    }
}

/// Billed usage on one UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    /// The day.
    pub date: NaiveDate,
    /// Usage rows written that day.
    pub requests: i64,
    /// Credits debited that day.
    pub credits: i64,
}

impl DailyUsage {
    /// A day with no usage.
    #[must_use]
    pub const fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            requests: 0,
            credits: 0,
        }
    }
}

/// One entry per day from `start` through `end`, days without usage zeroed.
///
/// `rows` may come in any order; rows outside the range are ignored.
#[must_use]
pub fn daily_series(start: NaiveDate, end: NaiveDate, rows: &[DailyUsage]) -> Vec<DailyUsage> {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|day| {
            rows.iter()
                .find(|row| row.date == day)
                .copied()
                .unwrap_or_else(|| DailyUsage::empty(day))
        })
        .collect()
}

/// Usage billed through one API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyUsage {
    /// The key.
    pub key_id: ApiKeyId,
    /// Display name.
    pub name: String,
    /// Masked token.
    pub key_masked: String,
    /// Whether the key is still accepted.
    pub is_active: bool,
    /// Billed calls in the window.
    pub requests: i64,
    /// Credits debited in the window.
    pub credits: i64,
}

/// Service-wide totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerStats {
    /// All users ever seen.
    pub total_users: i64,
    /// Users not disabled.
    pub active_users: i64,
    /// All keys ever issued.
    pub total_keys: i64,
    /// Keys not revoked.
    pub active_keys: i64,
    /// Net credits added by completed purchases.
    pub credits_sold: i64,
    /// Credits withheld as commission.
    pub commission_credits: i64,
    /// Money received, in cents.
    pub revenue_cents: i64,
    /// Credits debited for usage.
    pub credits_used: i64,
}

/// A user with their key count and lifetime usage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSummary {
    /// The user record.
    pub user: User,
    /// Keys issued, revoked ones included.
    pub key_count: i64,
    /// Credits debited for usage, all time.
    pub credits_used: i64,
}

/// A ledger row with its owner's address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// The ledger row.
    pub transaction: CreditTransaction,
    /// Owner's wallet address.
    pub address: WalletAddress,
}
