use axum::extract::State;
use chrono::{Datelike, Months, NaiveDate};
use serde_json::Value;

use crate::error::LedgerError;
use crate::handlers::today;
use crate::middleware::auth::AuthUser;
use crate::middleware::extract::Params;
use crate::router::LedgerState;
use crate::service::reports;
use crate::types::envelope::ApiResponse;
use crate::types::requests::{BalanceSheetQuery, CashFlowQuery};

/// First and last day of the month containing `day`.
fn month_bounds(day: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = day.with_day(1).unwrap_or(day);
    let end = start
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(day);
    (start, end)
}

/// GET /api/reports/balance-sheet?asOf
pub async fn balance_sheet(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Params(query): Params<BalanceSheetQuery>,
) -> Result<ApiResponse<Value>, LedgerError> {
    let as_of = query.as_of.unwrap_or_else(today);
    let storage = state.storage.clone();
    let user_id = auth.id().to_string();
    let report = state
        .cache
        .get_or_compute(auth.id(), "balance-sheet", as_of.to_string(), || async move {
            reports::balance_sheet(&storage, &user_id, as_of).await
        })
        .await?;
    Ok(ApiResponse::ok(report.as_ref().clone()))
}

/// GET /api/reports/cash-flow?startDate&endDate -> defaults to the current month.
pub async fn cash_flow(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Params(query): Params<CashFlowQuery>,
) -> Result<ApiResponse<Value>, LedgerError> {
    let (month_start, month_end) = month_bounds(today());
    let start = query.start_date.unwrap_or(month_start);
    let end = query.end_date.unwrap_or(month_end);
    if start > end {
        return Err(LedgerError::validation("endDate", "must not be before startDate"));
    }
    let storage = state.storage.clone();
    let user_id = auth.id().to_string();
    let report = state
        .cache
        .get_or_compute(auth.id(), "cash-flow", format!("{start}..{end}"), || async move {
            reports::cash_flow(&storage, &user_id, start, end).await
        })
        .await?;
    Ok(ApiResponse::ok(report.as_ref().clone()))
}
