use crate::db::models::{BalanceSnapshot, SyncRun, SyncStatusRecord};
use crate::db::sqlite::{Storage, decimal_col, new_id, now, opt_decimal_col};
use crate::error::LedgerError;
use crate::types::domain::SyncState;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

/// Counters reported by one sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub processed_recurring: i64,
    pub generated_rates: i64,
    pub fetched_rates: i64,
    pub refreshed_balances: i64,
}

const RUN_COLUMNS: &str = "id, state, started_at, finished_at, processed_recurring, generated_rates, \
     fetched_rates, refreshed_balances, error";

impl Storage {
    pub async fn get_sync_status(&self, user_id: &str) -> Result<Option<SyncStatusRecord>, LedgerError> {
        let row = sqlx::query(
            r#"SELECT state, last_sync_at, last_error, data_changed_at, updated_at
               FROM sync_status WHERE user_id = ?"#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        row.map(|row| {
            Ok(SyncStatusRecord {
                state: row.try_get("state")?,
                last_sync_at: row.try_get("last_sync_at")?,
                last_error: row.try_get("last_error")?,
                data_changed_at: row.try_get("data_changed_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }

    /// Mark the user's sync as in progress and open a run row. Returns the run id.
    pub async fn begin_sync_run(&self, user_id: &str) -> Result<String, LedgerError> {
        let run_id = new_id();
        let ts = now();
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"INSERT INTO sync_status (user_id, state, updated_at) VALUES (?, 'PROCESSING', ?)
               ON CONFLICT(user_id) DO UPDATE SET state = 'PROCESSING', updated_at = excluded.updated_at"#,
        )
        .bind(user_id)
        .bind(ts)
        .execute(&mut *tx)
        .await?;
        sqlx::query("INSERT INTO sync_runs (id, user_id, state, started_at) VALUES (?, ?, 'PROCESSING', ?)")
            .bind(&run_id)
            .bind(user_id)
            .bind(ts)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(run_id)
    }

    /// Close a run and update the user's status to `COMPLETED` or `FAILED`.
    pub async fn finish_sync_run(
        &self,
        user_id: &str,
        run_id: &str,
        outcome: Result<RunCounters, String>,
    ) -> Result<(), LedgerError> {
        let ts = now();
        let (state, counters, error) = match outcome {
            Ok(c) => (SyncState::Completed, c, None),
            Err(e) => (SyncState::Failed, RunCounters::default(), Some(e)),
        };
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"UPDATE sync_runs SET state = ?, finished_at = ?, processed_recurring = ?,
                   generated_rates = ?, fetched_rates = ?, refreshed_balances = ?, error = ?
               WHERE id = ?"#,
        )
        .bind(state)
        .bind(ts)
        .bind(counters.processed_recurring)
        .bind(counters.generated_rates)
        .bind(counters.fetched_rates)
        .bind(counters.refreshed_balances)
        .bind(&error)
        .bind(run_id)
        .execute(&mut *tx)
        .await?;

        // a completed run counts from when it started, so writes made during the
        // run still read as changed; a failed run keeps the previous last_sync_at
        sqlx::query(
            r#"UPDATE sync_status SET state = ?, last_error = ?, updated_at = ?,
                   last_sync_at = CASE WHEN ? = 'COMPLETED'
                       THEN (SELECT started_at FROM sync_runs WHERE id = ?)
                       ELSE last_sync_at END
               WHERE user_id = ?"#,
        )
        .bind(state)
        .bind(&error)
        .bind(ts)
        .bind(state)
        .bind(run_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Fail every run left in progress by a previous process. Returns affected users.
    pub async fn fail_interrupted_runs(&self) -> Result<u64, LedgerError> {
        let ts = now();
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            "UPDATE sync_runs SET state = 'FAILED', finished_at = ?, error = 'interrupted' WHERE state = 'PROCESSING'",
        )
        .bind(ts)
        .execute(&mut *tx)
        .await?;
        let res = sqlx::query(
            r#"UPDATE sync_status SET state = 'FAILED', last_error = 'interrupted', updated_at = ?
               WHERE state = 'PROCESSING'"#,
        )
        .bind(ts)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(res.rows_affected())
    }

    pub async fn recent_sync_runs(&self, user_id: &str, limit: i64) -> Result<Vec<SyncRun>, LedgerError> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM sync_runs WHERE user_id = ? ORDER BY started_at DESC LIMIT ?"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(Self::row_to_run).collect()
    }

    pub async fn get_sync_run(&self, user_id: &str, run_id: &str) -> Result<SyncRun, LedgerError> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM sync_runs WHERE user_id = ? AND id = ?");
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(run_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(LedgerError::NotFound("Sync run"))?;
        Self::row_to_run(&row)
    }

    /// Replace the user's balance snapshots in one transaction.
    pub async fn replace_snapshots(
        &self,
        user_id: &str,
        snapshots: &[BalanceSnapshot],
    ) -> Result<u64, LedgerError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM balance_snapshots WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        for snap in snapshots {
            sqlx::query(
                r#"INSERT INTO balance_snapshots (
                       account_id, user_id, balance, currency_code, base_balance, base_currency, as_of, computed_at
                   ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&snap.account_id)
            .bind(user_id)
            .bind(snap.balance.to_string())
            .bind(&snap.currency_code)
            .bind(snap.base_balance.map(|b| b.to_string()))
            .bind(&snap.base_currency)
            .bind(snap.as_of)
            .bind(snap.computed_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(snapshots.len() as u64)
    }

    pub async fn list_snapshots(&self, user_id: &str) -> Result<Vec<BalanceSnapshot>, LedgerError> {
        let rows = sqlx::query(
            r#"SELECT account_id, balance, currency_code, base_balance, base_currency, as_of, computed_at
               FROM balance_snapshots WHERE user_id = ?"#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        rows.iter()
            .map(|row| {
                Ok(BalanceSnapshot {
                    account_id: row.try_get("account_id")?,
                    balance: decimal_col(row, "balance")?,
                    currency_code: row.try_get("currency_code")?,
                    base_balance: opt_decimal_col(row, "base_balance")?,
                    base_currency: row.try_get("base_currency")?,
                    as_of: row.try_get("as_of")?,
                    computed_at: row.try_get("computed_at")?,
                })
            })
            .collect()
    }

    /// Accounts with no snapshot, or one computed before `changed_since`.
    pub async fn count_stale_snapshots(
        &self,
        user_id: &str,
        changed_since: Option<DateTime<Utc>>,
    ) -> Result<i64, LedgerError> {
        let (n,): (i64,) = sqlx::query_as(
            r#"SELECT COUNT(*) FROM accounts a
               LEFT JOIN balance_snapshots b ON b.account_id = a.id
               WHERE a.user_id = ?
                 AND (b.account_id IS NULL OR (? IS NOT NULL AND b.computed_at < ?))"#,
        )
        .bind(user_id)
        .bind(changed_since)
        .bind(changed_since)
        .fetch_one(self.pool())
        .await?;
        Ok(n)
    }

    pub async fn count_accounts(&self, user_id: &str) -> Result<i64, LedgerError> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool())
            .await?;
        Ok(n)
    }

    fn row_to_run(row: &SqliteRow) -> Result<SyncRun, LedgerError> {
        Ok(SyncRun {
            id: row.try_get("id")?,
            state: row.try_get("state")?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
            processed_recurring: row.try_get("processed_recurring")?,
            generated_rates: row.try_get("generated_rates")?,
            fetched_rates: row.try_get("fetched_rates")?,
            refreshed_balances: row.try_get("refreshed_balances")?,
            error: row.try_get("error")?,
        })
    }
}
