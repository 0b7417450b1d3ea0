use axum::{
    extract::{Path, State},
    response::Response,
};

use crate::db::models::RecurringTransaction;
use crate::db::transactions::{RecurringFields, ScheduleState};
use crate::error::LedgerError;
use crate::handlers::referenced;
use crate::middleware::auth::AuthUser;
use crate::middleware::extract::Body;
use crate::router::LedgerState;
use crate::types::envelope::{ApiResponse, created};
use crate::types::requests::RecurringRequest;

async fn resolve_fields(
    state: &LedgerState,
    user_id: &str,
    req: RecurringRequest,
) -> Result<RecurringFields, LedgerError> {
    req.validate()?;
    let account = referenced(
        state.storage.get_account(user_id, &req.account_id).await,
        "accountId",
        "unknown account",
    )?;
    if !account.category_type.accepts(req.tx_type) {
        return Err(LedgerError::validation(
            "type",
            "must match the account's income or expense category",
        ));
    }
    Ok(RecurringFields {
        account_id: account.id,
        tx_type: req.tx_type,
        amount: req.amount,
        description: req.description.trim().to_string(),
        frequency: req.frequency,
        interval_count: req.interval_count.unwrap_or(1),
        start_date: req.start_date,
        end_date: req.end_date,
        max_occurrences: req.max_occurrences,
    })
}

/// GET /api/recurring-transactions
pub async fn list_recurring(
    State(state): State<LedgerState>,
    auth: AuthUser,
) -> Result<ApiResponse<Vec<RecurringTransaction>>, LedgerError> {
    Ok(ApiResponse::ok(state.storage.list_recurring(auth.id()).await?))
}

/// POST /api/recurring-transactions -> occurrences are generated by the next sync.
pub async fn create_recurring(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Body(req): Body<RecurringRequest>,
) -> Result<Response, LedgerError> {
    let fields = resolve_fields(&state, auth.id(), req).await?;
    let item = state.storage.insert_recurring(auth.id(), &fields).await?;
    state.data_changed(auth.id()).await?;
    Ok(created(item))
}

/// PUT /api/recurring-transactions/{id}
///
/// The schedule restarts from the (possibly new) start date. Dates already
/// generated for this item are not generated twice.
pub async fn update_recurring(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Path(id): Path<String>,
    Body(req): Body<RecurringRequest>,
) -> Result<ApiResponse<RecurringTransaction>, LedgerError> {
    state.storage.get_recurring(auth.id(), &id).await?;
    let fields = resolve_fields(&state, auth.id(), req).await?;
    let restart = ScheduleState {
        next_date: Some(fields.start_date),
        occurrences: 0,
        active: true,
    };
    let item = state
        .storage
        .update_recurring(auth.id(), &id, &fields, &restart)
        .await?;
    state.data_changed(auth.id()).await?;
    Ok(ApiResponse::ok(item))
}

/// DELETE /api/recurring-transactions/{id} -> generated transactions are kept.
pub async fn delete_recurring(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<()>, LedgerError> {
    state.storage.get_recurring(auth.id(), &id).await?;
    state.storage.delete_recurring(auth.id(), &id).await?;
    Ok(ApiResponse::empty())
}
