use axum::{
    extract::{Path, State},
    response::Response,
};
use serde::Serialize;
use std::collections::HashMap;

use crate::db::accounts::AccountFields;
use crate::db::models::{Account, BalanceSnapshot};
use crate::error::LedgerError;
use crate::format::format_currency;
use crate::handlers::referenced;
use crate::middleware::auth::AuthUser;
use crate::middleware::extract::Body;
use crate::router::LedgerState;
use crate::types::envelope::{ApiResponse, created};
use crate::types::requests::AccountRequest;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    #[serde(flatten)]
    pub account: Account,
    pub is_stock: bool,
    /// Last balance computed by sync, if any.
    pub balance: Option<BalanceSnapshot>,
    pub formatted_balance: Option<String>,
}

impl AccountView {
    fn new(account: Account, balance: Option<BalanceSnapshot>) -> Self {
        let formatted_balance = balance
            .as_ref()
            .map(|b| format_currency(b.balance, &b.currency_code));
        Self {
            is_stock: account.category_type.is_stock(),
            account,
            balance,
            formatted_balance,
        }
    }
}

/// GET /api/accounts
pub async fn list_accounts(
    State(state): State<LedgerState>,
    auth: AuthUser,
) -> Result<ApiResponse<Vec<AccountView>>, LedgerError> {
    let mut snapshots: HashMap<String, BalanceSnapshot> = state
        .storage
        .list_snapshots(auth.id())
        .await?
        .into_iter()
        .map(|s| (s.account_id.clone(), s))
        .collect();
    let views = state
        .storage
        .list_accounts(auth.id())
        .await?
        .into_iter()
        .map(|a| {
            let snapshot = snapshots.remove(&a.id);
            AccountView::new(a, snapshot)
        })
        .collect();
    Ok(ApiResponse::ok(views))
}

/// GET /api/accounts/{id}
pub async fn get_account(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<AccountView>, LedgerError> {
    let account = state.storage.get_account(auth.id(), &id).await?;
    let snapshot = state
        .storage
        .list_snapshots(auth.id())
        .await?
        .into_iter()
        .find(|s| s.account_id == id);
    Ok(ApiResponse::ok(AccountView::new(account, snapshot)))
}

async fn resolve_fields(
    state: &LedgerState,
    user_id: &str,
    req: AccountRequest,
) -> Result<(AccountFields, crate::types::domain::CategoryType), LedgerError> {
    req.validate()?;
    let category = referenced(
        state.storage.get_category(user_id, &req.category_id).await,
        "categoryId",
        "unknown category",
    )?;
    if !state.storage.is_currency_enabled(user_id, &req.currency_code).await? {
        return Err(LedgerError::validation(
            "currencyCode",
            "currency is not enabled",
        ));
    }
    let fields = AccountFields {
        name: req.name.trim().to_string(),
        description: req.description(),
        category_id: req.category_id,
        currency_code: req.currency_code,
        color: req.color,
    };
    Ok((fields, category.category_type))
}

/// POST /api/accounts
pub async fn create_account(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Body(req): Body<AccountRequest>,
) -> Result<Response, LedgerError> {
    let (fields, _) = resolve_fields(&state, auth.id(), req).await?;
    let account = state.storage.insert_account(auth.id(), &fields).await?;
    state.data_changed(auth.id()).await?;
    Ok(created(AccountView::new(account, None)))
}

/// PUT /api/accounts/{id}
pub async fn update_account(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Body(req): Body<AccountRequest>,
) -> Result<ApiResponse<AccountView>, LedgerError> {
    let existing = state.storage.get_account(auth.id(), &id).await?;
    let (fields, category_type) = resolve_fields(&state, auth.id(), req).await?;

    let kind_changes = category_type.is_stock() != existing.category_type.is_stock()
        || category_type.flow_tx_type() != existing.category_type.flow_tx_type();
    let currency_changes = fields.currency_code != existing.currency_code;
    if (kind_changes || currency_changes)
        && state.storage.count_account_transactions(&id).await? > 0
    {
        let message = if currency_changes {
            "Cannot change the currency of an account with transactions"
        } else {
            "Cannot move an account with transactions to a category of another type"
        };
        return Err(LedgerError::Conflict(message.to_string()));
    }

    let account = state.storage.update_account(auth.id(), &id, &fields).await?;
    state.data_changed(auth.id()).await?;
    Ok(ApiResponse::ok(AccountView::new(account, None)))
}

/// DELETE /api/accounts/{id}
pub async fn delete_account(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, LedgerError> {
    state.storage.get_account(auth.id(), &id).await?;
    if state.storage.count_account_transactions(&id).await? > 0 {
        return Err(LedgerError::Conflict("Account has transactions".to_string()));
    }
    state.storage.delete_account(auth.id(), &id).await?;
    state.data_changed(auth.id()).await?;
    Ok(ApiResponse::empty())
}
