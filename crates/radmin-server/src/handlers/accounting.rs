use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Extension,
};
use serde::Deserialize;

use crate::{
    auth::{Caller, Role},
    envelope::{ApiError, ApiResult, Envelope},
    store::{AccountingRecord, DailyUsage},
    AppState,
};

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const DEFAULT_WINDOW_DAYS: i64 = 30;
/// Upper bound for `days`; larger windows overflow the date arithmetic.
pub const MAX_WINDOW_DAYS: i64 = 36_500;

// ── History ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub username: Option<String>,
    pub limit: Option<i64>,
}

pub async fn history(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Vec<AccountingRecord>> {
    caller.require(Role::Viewer)?;
    let Query(q) = query?;
    let username = q
        .username
        .filter(|u| !u.is_empty())
        .ok_or_else(|| ApiError::validation("username is required"))?;
    let limit = q.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).max(0);

    let records = state.store.history(&username, limit).await?;
    Ok(Envelope::ok("history retrieved", records))
}

// ── Bandwidth ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BandwidthQuery {
    pub username: Option<String>,
    pub days: Option<i64>,
}

pub async fn bandwidth_stats(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    query: Result<Query<BandwidthQuery>, QueryRejection>,
) -> ApiResult<Vec<DailyUsage>> {
    caller.require(Role::Viewer)?;
    let Query(q) = query?;
    let username = q.username.filter(|u| !u.is_empty());
    let days = q.days.unwrap_or(DEFAULT_WINDOW_DAYS);
    let days = days.clamp(0, MAX_WINDOW_DAYS);

    let usage = state
        .store
        .bandwidth_stats(username.as_deref(), days)
        .await?;
    Ok(Envelope::ok("bandwidth statistics retrieved", usage))
}
