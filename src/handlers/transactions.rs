use axum::{
    extract::{Path, State},
    response::Response,
};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::db::models::{Tag, Transaction};
use crate::db::transactions::{TransactionFields, TransactionFilter};
use crate::error::LedgerError;
use crate::handlers::referenced;
use crate::middleware::auth::AuthUser;
use crate::middleware::extract::{Body, Params};
use crate::router::LedgerState;
use crate::types::domain::TxType;
use crate::types::envelope::{ApiResponse, created};
use crate::types::requests::{TagRequest, TransactionQuery, TransactionRequest};

#[derive(Debug, Serialize)]
pub struct TransactionPage {
    pub items: Vec<Transaction>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

fn tx_type_name(tx_type: TxType) -> &'static str {
    match tx_type {
        TxType::Income => "INCOME",
        TxType::Expense => "EXPENSE",
        TxType::Balance => "BALANCE",
    }
}

/// Validate against the target account and the user's tags.
async fn resolve_fields(
    state: &LedgerState,
    user_id: &str,
    req: TransactionRequest,
) -> Result<TransactionFields, LedgerError> {
    req.validate()?;
    let account = referenced(
        state.storage.get_account(user_id, &req.account_id).await,
        "accountId",
        "unknown account",
    )?;
    if !account.category_type.accepts(req.tx_type) {
        let expected = account
            .category_type
            .flow_tx_type()
            .map(tx_type_name)
            .unwrap_or("BALANCE");
        return Err(LedgerError::validation(
            "type",
            format!("this account only accepts {expected} transactions"),
        ));
    }

    let tag_ids: Vec<String> = req
        .tag_ids
        .iter()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if state.storage.count_owned_tags(user_id, &tag_ids).await? != tag_ids.len() as i64 {
        return Err(LedgerError::validation("tagIds", "unknown tag"));
    }

    Ok(TransactionFields {
        notes: req.notes(),
        account_id: account.id,
        tx_type: req.tx_type,
        amount: req.amount,
        currency_code: account.currency_code,
        date: req.date,
        description: req.description.trim().to_string(),
        tag_ids,
    })
}

/// GET /api/transactions
pub async fn list_transactions(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Params(query): Params<TransactionQuery>,
) -> Result<ApiResponse<TransactionPage>, LedgerError> {
    let (page, limit) = query.paging();
    let filter = TransactionFilter {
        account_id: query.account_id,
        category_id: query.category_id,
        tx_type: query.tx_type,
        start_date: query.start_date,
        end_date: query.end_date,
        tag_id: query.tag_id,
        search: query.search.filter(|s| !s.trim().is_empty()),
    };
    let (items, total) = state
        .storage
        .list_transactions(auth.id(), &filter, limit, (page - 1).saturating_mul(limit))
        .await?;
    Ok(ApiResponse::ok(TransactionPage {
        items,
        total,
        page,
        limit,
    }))
}

/// GET /api/transactions/{id}
pub async fn get_transaction(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<Transaction>, LedgerError> {
    Ok(ApiResponse::ok(state.storage.get_transaction(auth.id(), &id).await?))
}

/// POST /api/transactions
pub async fn create_transaction(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Body(req): Body<TransactionRequest>,
) -> Result<Response, LedgerError> {
    let fields = resolve_fields(&state, auth.id(), req).await?;
    let tx = state.storage.insert_transaction(auth.id(), &fields).await?;
    state.data_changed(auth.id()).await?;
    Ok(created(tx))
}

/// PUT /api/transactions/{id}
pub async fn update_transaction(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Body(req): Body<TransactionRequest>,
) -> Result<ApiResponse<Transaction>, LedgerError> {
    state.storage.get_transaction(auth.id(), &id).await?;
    let fields = resolve_fields(&state, auth.id(), req).await?;
    let tx = state.storage.update_transaction(auth.id(), &id, &fields).await?;
    state.data_changed(auth.id()).await?;
    Ok(ApiResponse::ok(tx))
}

/// DELETE /api/transactions/{id}
pub async fn delete_transaction(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, LedgerError> {
    state.storage.get_transaction(auth.id(), &id).await?;
    state.storage.delete_transaction(auth.id(), &id).await?;
    state.data_changed(auth.id()).await?;
    Ok(ApiResponse::empty())
}

/// GET /api/tags
pub async fn list_tags(
    State(state): State<LedgerState>,
    auth: AuthUser,
) -> Result<ApiResponse<Vec<Tag>>, LedgerError> {
    Ok(ApiResponse::ok(state.storage.list_tags(auth.id()).await?))
}

/// POST /api/tags
pub async fn create_tag(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Body(req): Body<TagRequest>,
) -> Result<Response, LedgerError> {
    req.validate()?;
    let tag = state
        .storage
        .insert_tag(auth.id(), req.name.trim(), req.color.as_deref())
        .await?;
    Ok(created(tag))
}

/// PUT /api/tags/{id}
pub async fn update_tag(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Body(req): Body<TagRequest>,
) -> Result<ApiResponse<Tag>, LedgerError> {
    req.validate()?;
    state.storage.get_tag(auth.id(), &id).await?;
    let tag = state
        .storage
        .update_tag(auth.id(), &id, req.name.trim(), req.color.as_deref())
        .await?;
    Ok(ApiResponse::ok(tag))
}

/// DELETE /api/tags/{id} -> detaches the tag from every transaction.
pub async fn delete_tag(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, LedgerError> {
    state.storage.get_tag(auth.id(), &id).await?;
    state.storage.delete_tag(auth.id(), &id).await?;
    Ok(ApiResponse::empty())
}
