//! Pricing: the credit package catalog, purchase commission, and the
//! per-action cost table used by the usage meter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::LedgerError;

/// Basis points in one whole (100%).
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Default purchase commission: 2%.
pub const DEFAULT_COMMISSION_BPS: u32 = 200;

/// Commission withheld from purchased credits, in basis points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommissionRate(u32);

impl CommissionRate {
    /// Create a rate from basis points.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidAmount` if the rate exceeds 100%.
    pub fn from_bps(bps: u32) -> Result<Self, LedgerError> {
        if i64::from(bps) > BPS_DENOMINATOR {
            return Err(LedgerError::InvalidAmount(format!(
                "commission rate {bps} bps exceeds 100%"
            )));
        }
        Ok(Self(bps))
    }

    /// The rate in basis points.
    #[must_use]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// `floor(credits * rate)` using integer math only.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidAmount` if `credits * bps` overflows.
    pub fn commission_on(&self, credits: i64) -> Result<i64, LedgerError> {
        credits
            .checked_mul(i64::from(self.0))
            .map(|scaled| scaled / BPS_DENOMINATOR)
            .ok_or_else(|| {
                LedgerError::InvalidAmount(format!("{credits} credits is too large to price"))
            })
    }

    /// Split gross credits into `(net, commission)`.
    ///
    /// # Errors
    ///
    /// As [`CommissionRate::commission_on`].
    pub fn split(&self, credits: i64) -> Result<(i64, i64), LedgerError> {
        let commission = self.commission_on(credits)?;
        Ok((credits - commission, commission))
    }
}

impl Default for CommissionRate {
    fn default() -> Self {
        Self(DEFAULT_COMMISSION_BPS)
    }
}

/// A purchasable bundle of credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditPackage {
    /// Catalog id, e.g. `package_500`.
    pub id: String,
    /// Gross credits in the package (before commission).
    pub credits: i64,
    /// Price in cents.
    pub price_cents: i64,
}

/// The credit package catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageCatalog {
    packages: Vec<CreditPackage>,
}

impl PackageCatalog {
    /// Build a catalog from explicit packages.
    #[must_use]
    pub fn new(packages: Vec<CreditPackage>) -> Self {
        Self { packages }
    }

    /// Look up a package by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&CreditPackage> {
        self.packages.iter().find(|p| p.id == id)
    }

    /// All packages, cheapest first.
    #[must_use]
    pub fn packages(&self) -> &[CreditPackage] {
        &self.packages
    }
}

impl Default for PackageCatalog {
    fn default() -> Self {
        let package = |credits: i64, dollars: i64| CreditPackage {
            id: format!("package_{credits}"),
            credits,
            price_cents: dollars * 100,
        };
        Self::new(vec![
            package(500, 45),
            package(1_000, 85),
            package(2_500, 200),
            package(5_000, 375),
            package(10_000, 700),
        ])
    }
}

/// Credits charged per billable widget action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionCosts(BTreeMap<String, i64>);

impl ActionCosts {
    /// Cost of `action`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UnknownAction` if the action is not in the table.
    pub fn cost_of(&self, action: &str) -> Result<i64, LedgerError> {
        self.0
            .get(action)
            .copied()
            .ok_or_else(|| LedgerError::UnknownAction(action.to_string()))
    }

    /// Parse `name=cost` pairs separated by commas, e.g. `process=1,analyze=2`.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidInput` on a malformed pair or a
    /// non-positive cost.
    pub fn parse(raw: &str) -> Result<Self, LedgerError> {
        let mut table = BTreeMap::new();
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, cost) = pair
                .split_once('=')
                .ok_or_else(|| LedgerError::InvalidInput(format!("expected name=cost: {pair}")))?;
            let cost: i64 = cost
                .trim()
                .parse()
                .map_err(|_| LedgerError::InvalidInput(format!("invalid cost in: {pair}")))?;
            if cost <= 0 {
                return Err(LedgerError::InvalidInput(format!(
                    "cost must be positive: {pair}"
                )));
            }
            table.insert(name.trim().to_string(), cost);
        }
        Ok(Self(table))
    }
}

impl Default for ActionCosts {
    fn default() -> Self {
        Self(BTreeMap::from([
            ("process".to_string(), 1),
            ("analyze".to_string(), 2),
            ("generate".to_string(), 3),
        ]))
    }
}
