use axum::extract::{Path, State};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::db::currencies::NewRate;
use crate::db::models::ExchangeRate;
use crate::error::LedgerError;
use crate::format::format_currency;
use crate::handlers::today;
use crate::middleware::auth::AuthUser;
use crate::middleware::extract::{Body, Params};
use crate::router::LedgerState;
use crate::service::currency_converter::{ConversionError, CurrencyConverter};
use crate::types::domain::RateType;
use crate::types::envelope::ApiResponse;
use crate::types::requests::{ConvertQuery, RateQuery, RateRequest};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversion {
    pub from: String,
    pub to: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub rate: Decimal,
    pub result: Decimal,
    pub formatted: String,
}

/// GET /api/exchange-rates?from&to
pub async fn list_rates(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Params(query): Params<RateQuery>,
) -> Result<ApiResponse<Vec<ExchangeRate>>, LedgerError> {
    let rates = state
        .storage
        .list_rates(auth.id(), query.from.as_deref(), query.to.as_deref())
        .await?;
    Ok(ApiResponse::ok(rates))
}

/// POST /api/exchange-rates -> insert or replace the user rate on (from, to, date).
pub async fn upsert_rate(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Body(req): Body<RateRequest>,
) -> Result<ApiResponse<ExchangeRate>, LedgerError> {
    req.validate()?;
    for (field, code) in [("fromCurrency", &req.from_currency), ("toCurrency", &req.to_currency)] {
        if state.storage.find_currency(auth.id(), code).await?.is_none() {
            return Err(LedgerError::validation(field, "unknown currency"));
        }
    }
    let rate = NewRate {
        from_currency: req.from_currency,
        to_currency: req.to_currency,
        rate: req.rate,
        effective_date: req.effective_date,
        rate_type: RateType::User,
        notes: req.notes.filter(|n| !n.trim().is_empty()),
    };
    let stored = state.storage.upsert_rate(auth.id(), &rate).await?;
    state.data_changed(auth.id()).await?;
    Ok(ApiResponse::ok(stored))
}

/// DELETE /api/exchange-rates/{id}
pub async fn delete_rate(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, LedgerError> {
    let rate = state.storage.get_rate(auth.id(), &id).await?;
    if rate.rate_type == RateType::Auto {
        return Err(LedgerError::Conflict(
            "Generated rates are managed by sync".to_string(),
        ));
    }
    state.storage.delete_rate(auth.id(), &id).await?;
    state.data_changed(auth.id()).await?;
    Ok(ApiResponse::empty())
}

/// GET /api/exchange-rates/convert?from&to&amount&date
pub async fn convert(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Params(query): Params<ConvertQuery>,
) -> Result<ApiResponse<Conversion>, LedgerError> {
    query.validate()?;
    let date = query.date.unwrap_or_else(today);
    let from = query.from.to_uppercase();
    let to = query.to.to_uppercase();
    let converter = CurrencyConverter::new(&state.storage.all_rates(auth.id()).await?);
    let out_of_range = || LedgerError::validation("amount", "is out of range for this conversion");
    let rate = converter.rate(&from, &to, date).map_err(|e| match e {
        ConversionError::Overflow { .. } => out_of_range(),
        missing => LedgerError::validation("to", format!("no exchange rate for {}", missing.pair())),
    })?;
    let result = query.amount.checked_mul(rate).ok_or_else(out_of_range)?;
    Ok(ApiResponse::ok(Conversion {
        formatted: format_currency(result, &to),
        from,
        to,
        date,
        amount: query.amount,
        rate,
        result,
    }))
}
