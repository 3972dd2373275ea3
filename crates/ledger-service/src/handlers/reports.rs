//! Usage reports for wallet holders and widgets.
//!
//! Both read the same `usage` ledger rows the balance was debited from, per
//! UTC day over a [`UsagePeriod`] ending today.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use ledger_core::{daily_series, DailyUsage, KeyUsage, UsagePeriod, UserId};

use crate::auth::{ApiKeyAuth, WalletAuth};
use crate::error::ApiError;
use crate::extract::Query;
use crate::state::AppState;

/// Report query parameters.
#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    /// `7d`, `30d` or `90d` (default: `30d`).
    #[serde(default)]
    pub period: UsagePeriod,
}

/// Sums over the whole window.
#[derive(Debug, Default, Serialize)]
pub struct UsageTotals {
    /// Billed calls.
    pub requests: i64,
    /// Credits debited.
    pub credits: i64,
}

/// A wallet holder's usage report.
#[derive(Debug, Serialize)]
pub struct UsageReportResponse {
    /// Window requested.
    pub period: UsagePeriod,
    /// First day covered.
    pub from: NaiveDate,
    /// Last day covered (today, UTC).
    pub to: NaiveDate,
    /// Window totals.
    pub totals: UsageTotals,
    /// One entry per day, idle days zeroed.
    pub daily: Vec<DailyUsage>,
    /// Per-key breakdown, heaviest first.
    pub keys: Vec<KeyUsage>,
}

/// Usage for the caller's wallet, by day and by key.
pub async fn usage_report(
    State(state): State<Arc<AppState>>,
    auth: WalletAuth,
    Query(query): Query<ReportQuery>,
) -> Result<Json<UsageReportResponse>, ApiError> {
    let window = Window::ending_today(query.period);
    let daily = window.daily(&state, &auth.user.id).await?;
    let keys = state
        .store
        .usage_by_key(&auth.user.id, window.from)
        .await?;

    Ok(Json(UsageReportResponse {
        period: query.period,
        from: window.from,
        to: window.to,
        totals: totals(&daily),
        daily,
        keys,
    }))
}

/// Usage summary for a widget.
#[derive(Debug, Serialize)]
pub struct WidgetStatsResponse {
    /// Window requested.
    pub period: UsagePeriod,
    /// First day covered.
    pub from: NaiveDate,
    /// Last day covered (today, UTC).
    pub to: NaiveDate,
    /// Window totals across all of the owner's keys.
    pub totals: UsageTotals,
    /// One entry per day, idle days zeroed.
    pub daily: Vec<DailyUsage>,
    /// Owner's balance.
    pub remaining_credits: i64,
}

/// Usage summary for the key owner.
pub async fn widget_stats(
    State(state): State<Arc<AppState>>,
    ApiKeyAuth(ctx): ApiKeyAuth,
    Query(query): Query<ReportQuery>,
) -> Result<Json<WidgetStatsResponse>, ApiError> {
    let window = Window::ending_today(query.period);
    let daily = window.daily(&state, &ctx.user.id).await?;

    Ok(Json(WidgetStatsResponse {
        period: query.period,
        from: window.from,
        to: window.to,
        totals: totals(&daily),
        daily,
        remaining_credits: ctx.balance,
    }))
}

struct Window {
    from: NaiveDate,
    to: NaiveDate,
}

impl Window {
    fn ending_today(period: UsagePeriod) -> Self {
        let to = Utc::now().date_naive();
        Self {
            from: period.start(to),
            to,
        }
    }

    async fn daily(&self, state: &AppState, user_id: &UserId) -> Result<Vec<DailyUsage>, ApiError> {
        let rows = state.store.daily_usage(user_id, self.from).await?;
        Ok(daily_series(self.from, self.to, &rows))
    }
}

fn totals(daily: &[DailyUsage]) -> UsageTotals {
    daily.iter().fold(UsageTotals::default(), |acc, day| UsageTotals {
        requests: acc.requests + day.requests,
        credits: acc.credits + day.credits,
    })
}
