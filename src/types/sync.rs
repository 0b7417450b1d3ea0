use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::models::SyncRun;
use crate::types::domain::SyncState;

/// Why derived data is considered out of date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NeedsSyncReason {
    NeverSynced,
    LastRunFailed,
    Stale,
    DataChanged,
    RecurringDue,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCheck {
    pub needs_sync: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusView {
    pub status: SyncState,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub data_changed_at: Option<DateTime<Utc>>,
    pub needs_sync: bool,
    pub reasons: Vec<NeedsSyncReason>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingWork {
    pub due_recurring: i64,
    pub stale_balances: i64,
    pub accounts: i64,
    pub exchange_rates: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    #[serde(flatten)]
    pub status: SyncStatusView,
    pub pending: PendingWork,
    pub last_run: Option<SyncRun>,
    pub recent_runs: Vec<SyncRun>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerStarted {
    pub started: bool,
    pub run_id: String,
}
