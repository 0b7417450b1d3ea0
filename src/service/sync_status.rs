use crate::db::Storage;
use crate::db::models::SyncStatusRecord;
use crate::error::LedgerError;
use crate::types::domain::SyncState;
use crate::types::sync::{NeedsSyncReason, SyncStatusView};
use chrono::{DateTime, Duration, Utc};

/// Answers whether a user's derived data (generated entries, rates, balances) is current.
#[derive(Clone)]
pub struct SyncStatusService {
    storage: Storage,
    stale_after: Duration,
}

/// Reasons a sync is needed; empty while a run is in progress.
pub fn needs_sync_reasons(
    record: Option<&SyncStatusRecord>,
    due_recurring: i64,
    now: DateTime<Utc>,
    stale_after: Duration,
) -> Vec<NeedsSyncReason> {
    let mut reasons = Vec::new();
    if record.is_some_and(|r| r.state == SyncState::Processing) {
        return reasons;
    }

    match record.and_then(|r| r.last_sync_at) {
        None => reasons.push(NeedsSyncReason::NeverSynced),
        Some(last) => {
            if now - last > stale_after {
                reasons.push(NeedsSyncReason::Stale);
            }
            if record
                .and_then(|r| r.data_changed_at)
                .is_some_and(|changed| changed > last)
            {
                reasons.push(NeedsSyncReason::DataChanged);
            }
        }
    }
    if record.is_some_and(|r| r.state == SyncState::Failed) {
        reasons.push(NeedsSyncReason::LastRunFailed);
    }
    if due_recurring > 0 {
        reasons.push(NeedsSyncReason::RecurringDue);
    }
    reasons
}

impl SyncStatusService {
    pub fn new(storage: Storage, stale_after_hours: i64) -> Self {
        Self {
            storage,
            stale_after: Duration::hours(stale_after_hours),
        }
    }

    pub async fn needs_sync(&self, user_id: &str) -> Result<bool, LedgerError> {
        Ok(!self.get_sync_status(user_id).await?.reasons.is_empty())
    }

    pub async fn get_sync_status(&self, user_id: &str) -> Result<SyncStatusView, LedgerError> {
        let now = Utc::now();
        let record = self.storage.get_sync_status(user_id).await?;
        let due = self
            .storage
            .count_due_recurring(user_id, now.date_naive())
            .await?;
        let reasons = needs_sync_reasons(record.as_ref(), due, now, self.stale_after);

        Ok(match record {
            Some(r) => SyncStatusView {
                status: r.state,
                last_sync_at: r.last_sync_at,
                last_error: r.last_error,
                data_changed_at: r.data_changed_at,
                needs_sync: !reasons.is_empty(),
                reasons,
            },
            None => SyncStatusView {
                status: SyncState::Idle,
                last_sync_at: None,
                last_error: None,
                data_changed_at: None,
                needs_sync: !reasons.is_empty(),
                reasons,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(state: SyncState, last_sync_at: Option<DateTime<Utc>>) -> SyncStatusRecord {
        SyncStatusRecord {
            state,
            last_sync_at,
            last_error: None,
            data_changed_at: None,
            updated_at: Utc::now(),
        }
    }

    fn day() -> Duration {
        Duration::hours(24)
    }

    #[test]
    fn never_synced_needs_sync() {
        let reasons = needs_sync_reasons(None, 0, Utc::now(), day());
        assert_eq!(reasons, vec![NeedsSyncReason::NeverSynced]);
    }

    #[test]
    fn fresh_completed_sync_is_current() {
        let now = Utc::now();
        let r = record(SyncState::Completed, Some(now - Duration::hours(1)));
        assert!(needs_sync_reasons(Some(&r), 0, now, day()).is_empty());
    }

    #[test]
    fn old_sync_is_stale() {
        let now = Utc::now();
        let r = record(SyncState::Completed, Some(now - Duration::hours(25)));
        assert_eq!(needs_sync_reasons(Some(&r), 0, now, day()), vec![NeedsSyncReason::Stale]);
    }

    #[test]
    fn processing_never_needs_sync() {
        let r = record(SyncState::Processing, None);
        assert!(needs_sync_reasons(Some(&r), 5, Utc::now(), day()).is_empty());
    }

    #[test]
    fn failure_change_and_due_items_all_count() {
        let now = Utc::now();
        let mut r = record(SyncState::Failed, Some(now - Duration::hours(2)));
        r.data_changed_at = Some(now - Duration::hours(1));
        let reasons = needs_sync_reasons(Some(&r), 2, now, day());
        assert_eq!(
            reasons,
            vec![
                NeedsSyncReason::DataChanged,
                NeedsSyncReason::LastRunFailed,
                NeedsSyncReason::RecurringDue
            ]
        );
    }

    #[test]
    fn change_before_last_sync_is_ignored() {
        let now = Utc::now();
        let mut r = record(SyncState::Completed, Some(now - Duration::hours(1)));
        r.data_changed_at = Some(now - Duration::hours(3));
        assert!(needs_sync_reasons(Some(&r), 0, now, day()).is_empty());
    }
}
