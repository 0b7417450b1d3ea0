use crate::db::schema::SQLITE_INIT;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::info;

pub type SqlitePool = Pool<Sqlite>;

/// Repository over the ledger database. Entity-specific queries live in sibling modules.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

/// Open (creating if needed) the database at `database_url` and apply the schema.
pub async fn connect(database_url: &str) -> Result<Storage, LedgerError> {
    let connect_opts = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(connect_opts)
        .await?;
    let storage = Storage::new(pool);
    storage.init_schema().await?;
    info!(database_url, "database ready");
    Ok(storage)
}

impl Storage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL as one script.
    pub async fn init_schema(&self) -> Result<(), LedgerError> {
        sqlx::raw_sql(SQLITE_INIT).execute(&self.pool).await?;
        Ok(())
    }

    /// Record that ledger data changed, so the next sync check reports stale derived data.
    pub async fn touch_data_changed(&self, user_id: &str) -> Result<(), LedgerError> {
        let now = Utc::now();
        sqlx::query(
            r#"INSERT INTO sync_status (user_id, state, data_changed_at, updated_at)
               VALUES (?, 'IDLE', ?, ?)
               ON CONFLICT(user_id) DO UPDATE SET
                   data_changed_at = excluded.data_changed_at,
                   updated_at = excluded.updated_at"#,
        )
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Read a TEXT column holding a decimal.
pub(crate) fn decimal_col(row: &SqliteRow, col: &str) -> Result<Decimal, LedgerError> {
    let raw: String = row.try_get(col)?;
    Decimal::from_str(&raw).map_err(|e| LedgerError::CorruptValue(format!("{col}={raw}: {e}")))
}

pub(crate) fn opt_decimal_col(row: &SqliteRow, col: &str) -> Result<Option<Decimal>, LedgerError> {
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|s| {
        Decimal::from_str(&s).map_err(|e| LedgerError::CorruptValue(format!("{col}={s}: {e}")))
    })
    .transpose()
}

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Map a UNIQUE violation to a 409 with `message`; pass everything else through.
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: &str) -> LedgerError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_unique_violation()
    {
        return LedgerError::Conflict(message.to_string());
    }
    LedgerError::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_initializes_a_fresh_file_and_reopens_it() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("fresh.db").display());

        let storage = connect(&url).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM currencies WHERE created_by IS NULL")
            .fetch_one(storage.pool())
            .await
            .unwrap();
        assert!(count > 0);
        let (indexes,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_transactions_recurring_date'",
        )
        .fetch_one(storage.pool())
        .await
        .unwrap();
        assert_eq!(indexes, 1);
        storage.pool().close().await;

        // the DDL is idempotent
        connect(&url).await.unwrap();
    }
}
