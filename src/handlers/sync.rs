use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::LedgerError;
use crate::middleware::auth::AuthUser;
use crate::middleware::extract::Params;
use crate::router::LedgerState;
use crate::service::sync_actor::SyncTrigger;
use crate::types::envelope::ApiResponse;
use crate::types::requests::TriggerQuery;
use crate::types::sync::{SyncCheck, SyncStatusView, SyncSummary, TriggerStarted};

/// GET /api/sync/check
pub async fn check(
    State(state): State<LedgerState>,
    auth: AuthUser,
) -> Result<ApiResponse<SyncCheck>, LedgerError> {
    let needs_sync = state.sync.service().status().needs_sync(auth.id()).await?;
    Ok(ApiResponse::ok(SyncCheck { needs_sync }))
}

/// GET /api/sync/status
pub async fn status(
    State(state): State<LedgerState>,
    auth: AuthUser,
) -> Result<ApiResponse<SyncStatusView>, LedgerError> {
    let view = state.sync.service().status().get_sync_status(auth.id()).await?;
    Ok(ApiResponse::ok(view))
}

/// GET /api/sync/summary
pub async fn summary(
    State(state): State<LedgerState>,
    auth: AuthUser,
) -> Result<ApiResponse<SyncSummary>, LedgerError> {
    Ok(ApiResponse::ok(state.sync.service().get_sync_summary(auth.id()).await?))
}

/// POST /api/sync/trigger?wait=bool
///
/// 202 once started; with `wait=true`, 200 and the finished run unless the
/// configured wait elapses first.
pub async fn trigger(
    State(state): State<LedgerState>,
    auth: AuthUser,
    Params(query): Params<TriggerQuery>,
) -> Result<Response, LedgerError> {
    let (run_id, done) = match state.sync.trigger(auth.id()).await? {
        SyncTrigger::Started { run_id, done } => (run_id, done),
        SyncTrigger::AlreadyRunning { run_id } => {
            info!(user_id = %auth.id(), run_id, "sync trigger rejected, run in flight");
            return Err(LedgerError::Conflict("Sync already running".to_string()));
        }
    };

    let started = |run_id: String| {
        (
            StatusCode::ACCEPTED,
            ApiResponse::ok(TriggerStarted {
                started: true,
                run_id,
            }),
        )
            .into_response()
    };
    if !query.wait {
        return Ok(started(run_id));
    }

    let wait = Duration::from_secs(state.config.sync.wait_timeout_secs);
    match tokio::time::timeout(wait, done).await {
        Ok(Ok(run)) => Ok(ApiResponse::ok(run?).into_response()),
        Ok(Err(_)) => Err(LedgerError::RactorError(
            "sync actor dropped the completion channel".to_string(),
        )),
        Err(_) => {
            warn!(user_id = %auth.id(), run_id, "sync still running after wait timeout");
            Ok(started(run_id))
        }
    }
}
