use axum::{
    extract::{Path, State},
    response::Response,
};
use serde::Serialize;
use std::collections::HashSet;

use crate::db::models::Currency;
use crate::error::LedgerError;
use crate::middleware::auth::AuthUser;
use crate::middleware::extract::Body;
use crate::router::LedgerState;
use crate::types::envelope::{ApiResponse, created};
use crate::types::requests::{EnableCurrencyRequest, NewCurrencyRequest};

#[derive(Debug, Serialize)]
pub struct CurrencyView {
    #[serde(flatten)]
    pub currency: Currency,
    pub enabled: bool,
}

/// GET /api/currencies
pub async fn list_currencies(
    State(state): State<LedgerState>,
    auth: AuthUser,
) -> Result<ApiResponse<Vec<CurrencyView>>, LedgerError> {
    let enabled: HashSet<String> = state
        .storage
        .enabled_currencies(auth.id())
        .await?
        .into_iter()
        .collect();
    let views = state
        .storage
        .list_currencies(auth.id())
        .await?
        .into_iter()
        .map(|currency| CurrencyView {
            enabled: enabled.contains(&currency.code),
            currency,
        })
        .collect();
    Ok(ApiResponse::ok(views))
}

/// POST /api/currencies -> custom currency, enabled right away.
pub async fn create_currency(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Body(req): Body<NewCurrencyRequest>,
) -> Result<Response, LedgerError> {
    req.validate()?;
    let currency = Currency {
        code: req.code,
        name: req.name.trim().to_string(),
        symbol: req.symbol.trim().to_string(),
        decimals: req.decimals.unwrap_or(2),
        created_by: Some(auth.id().to_string()),
    };
    state.storage.create_currency(auth.id(), &currency).await?;
    state.storage.enable_currency(auth.id(), &currency.code).await?;
    Ok(created(CurrencyView {
        currency,
        enabled: true,
    }))
}

/// POST /api/user/currencies
pub async fn enable_currency(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Body(req): Body<EnableCurrencyRequest>,
) -> Result<ApiResponse<Vec<String>>, LedgerError> {
    let code = req.code.trim().to_uppercase();
    if state.storage.find_currency(auth.id(), &code).await?.is_none() {
        return Err(LedgerError::NotFound("Currency"));
    }
    state.storage.enable_currency(auth.id(), &code).await?;
    // cross rates are derived for enabled currencies only
    state.data_changed(auth.id()).await?;
    Ok(ApiResponse::ok(state.storage.enabled_currencies(auth.id()).await?))
}

/// DELETE /api/user/currencies/{code}
pub async fn disable_currency(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Path(code): Path<String>,
) -> Result<ApiResponse<()>, LedgerError> {
    let code = code.to_uppercase();
    if state.storage.base_currency(auth.id()).await? == code {
        return Err(LedgerError::Conflict(
            "The base currency cannot be disabled".to_string(),
        ));
    }
    if state.storage.count_accounts_in_currency(auth.id(), &code).await? > 0 {
        return Err(LedgerError::Conflict(
            "Currency is used by existing accounts".to_string(),
        ));
    }
    if !state.storage.disable_currency(auth.id(), &code).await? {
        return Err(LedgerError::NotFound("Currency"));
    }
    state.data_changed(auth.id()).await?;
    Ok(ApiResponse::empty())
}
