use crate::db::models::{Currency, ExchangeRate};
use crate::db::sqlite::{Storage, conflict_on_unique, decimal_col, new_id, now};
use crate::error::LedgerError;
use crate::types::domain::RateType;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

/// A rate about to be written.
#[derive(Debug, Clone)]
pub struct NewRate {
    pub from_currency: String,
    pub to_currency: String,
    pub rate: Decimal,
    pub effective_date: NaiveDate,
    pub rate_type: RateType,
    pub notes: Option<String>,
}

const RATE_COLUMNS: &str = "id, from_currency, to_currency, rate, effective_date, rate_type, notes, created_at";

impl Storage {
    /// Built-in currencies plus the ones this user created.
    pub async fn list_currencies(&self, user_id: &str) -> Result<Vec<Currency>, LedgerError> {
        let rows = sqlx::query(
            r#"SELECT code, name, symbol, decimals, created_by FROM currencies
               WHERE created_by IS NULL OR created_by = ? ORDER BY code"#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(Self::row_to_currency).collect()
    }

    /// A currency visible to the user.
    pub async fn find_currency(&self, user_id: &str, code: &str) -> Result<Option<Currency>, LedgerError> {
        let row = sqlx::query(
            r#"SELECT code, name, symbol, decimals, created_by FROM currencies
               WHERE code = ? AND (created_by IS NULL OR created_by = ?)"#,
        )
        .bind(code)
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(Self::row_to_currency).transpose()
    }

    pub async fn create_currency(&self, user_id: &str, currency: &Currency) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO currencies (code, name, symbol, decimals, created_by) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&currency.code)
        .bind(&currency.name)
        .bind(&currency.symbol)
        .bind(currency.decimals)
        .bind(user_id)
        .execute(self.pool())
        .await
        .map_err(|e| conflict_on_unique(e, "Currency code already exists"))?;
        Ok(())
    }

    pub async fn enabled_currencies(&self, user_id: &str) -> Result<Vec<String>, LedgerError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT code FROM user_currencies WHERE user_id = ? ORDER BY code")
                .bind(user_id)
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    pub async fn is_currency_enabled(&self, user_id: &str, code: &str) -> Result<bool, LedgerError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM user_currencies WHERE user_id = ? AND code = ?")
                .bind(user_id)
                .bind(code)
                .fetch_optional(self.pool())
                .await?;
        Ok(row.is_some())
    }

    pub async fn enable_currency(&self, user_id: &str, code: &str) -> Result<(), LedgerError> {
        sqlx::query("INSERT OR IGNORE INTO user_currencies (user_id, code) VALUES (?, ?)")
            .bind(user_id)
            .bind(code)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn disable_currency(&self, user_id: &str, code: &str) -> Result<bool, LedgerError> {
        let res = sqlx::query("DELETE FROM user_currencies WHERE user_id = ? AND code = ?")
            .bind(user_id)
            .bind(code)
            .execute(self.pool())
            .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn count_accounts_in_currency(&self, user_id: &str, code: &str) -> Result<i64, LedgerError> {
        let (n,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM accounts WHERE user_id = ? AND currency_code = ?")
                .bind(user_id)
                .bind(code)
                .fetch_one(self.pool())
                .await?;
        Ok(n)
    }

    pub async fn list_rates(
        &self,
        user_id: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Vec<ExchangeRate>, LedgerError> {
        let sql = format!(
            r#"SELECT {RATE_COLUMNS} FROM exchange_rates
               WHERE user_id = ?
                 AND (? IS NULL OR from_currency = ?)
                 AND (? IS NULL OR to_currency = ?)
               ORDER BY effective_date DESC, from_currency, to_currency"#
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(from)
            .bind(from)
            .bind(to)
            .bind(to)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(Self::row_to_rate).collect()
    }

    /// All rates of the user, oldest first; input for the conversion graph.
    pub async fn all_rates(&self, user_id: &str) -> Result<Vec<ExchangeRate>, LedgerError> {
        self.rates_of_types(user_id, &[RateType::User, RateType::Api, RateType::Auto])
            .await
    }

    pub async fn rates_of_types(
        &self,
        user_id: &str,
        types: &[RateType],
    ) -> Result<Vec<ExchangeRate>, LedgerError> {
        let sql = format!(
            "SELECT {RATE_COLUMNS} FROM exchange_rates WHERE user_id = ? ORDER BY effective_date, created_at"
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(self.pool()).await?;
        let rates = rows
            .iter()
            .map(Self::row_to_rate)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rates
            .into_iter()
            .filter(|r| types.contains(&r.rate_type))
            .collect())
    }

    pub async fn get_rate(&self, user_id: &str, id: &str) -> Result<ExchangeRate, LedgerError> {
        let sql = format!("SELECT {RATE_COLUMNS} FROM exchange_rates WHERE user_id = ? AND id = ?");
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(LedgerError::NotFound("Exchange rate"))?;
        Self::row_to_rate(&row)
    }

    /// Insert or replace the rate on (from, to, date). Returns the stored row.
    /// Only a USER rate may replace an existing USER rate.
    pub async fn upsert_rate(&self, user_id: &str, rate: &NewRate) -> Result<ExchangeRate, LedgerError> {
        sqlx::query(
            r#"INSERT INTO exchange_rates (
                   id, user_id, from_currency, to_currency, rate, effective_date, rate_type, notes, created_at
               ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(user_id, from_currency, to_currency, effective_date) DO UPDATE SET
                   rate = excluded.rate,
                   rate_type = excluded.rate_type,
                   notes = excluded.notes
               WHERE excluded.rate_type = 'USER' OR exchange_rates.rate_type <> 'USER'"#,
        )
        .bind(new_id())
        .bind(user_id)
        .bind(&rate.from_currency)
        .bind(&rate.to_currency)
        .bind(rate.rate.to_string())
        .bind(rate.effective_date)
        .bind(rate.rate_type)
        .bind(&rate.notes)
        .bind(now())
        .execute(self.pool())
        .await?;

        let sql = format!(
            r#"SELECT {RATE_COLUMNS} FROM exchange_rates
               WHERE user_id = ? AND from_currency = ? AND to_currency = ? AND effective_date = ?"#
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(&rate.from_currency)
            .bind(&rate.to_currency)
            .bind(rate.effective_date)
            .fetch_one(self.pool())
            .await?;
        Self::row_to_rate(&row)
    }

    pub async fn delete_rate(&self, user_id: &str, id: &str) -> Result<(), LedgerError> {
        sqlx::query("DELETE FROM exchange_rates WHERE user_id = ? AND id = ?")
            .bind(user_id)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Replace every AUTO rate of the user with `generated` in one transaction.
    /// Rows colliding with a USER/API rate on the same key are skipped. Returns rows written.
    pub async fn replace_auto_rates(
        &self,
        user_id: &str,
        generated: &[NewRate],
    ) -> Result<u64, LedgerError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM exchange_rates WHERE user_id = ? AND rate_type = 'AUTO'")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let ts = now();
        let mut written = 0;
        for rate in generated {
            let res = sqlx::query(
                r#"INSERT OR IGNORE INTO exchange_rates (
                       id, user_id, from_currency, to_currency, rate, effective_date, rate_type, notes, created_at
                   ) VALUES (?, ?, ?, ?, ?, ?, 'AUTO', ?, ?)"#,
            )
            .bind(new_id())
            .bind(user_id)
            .bind(&rate.from_currency)
            .bind(&rate.to_currency)
            .bind(rate.rate.to_string())
            .bind(rate.effective_date)
            .bind(&rate.notes)
            .bind(ts)
            .execute(&mut *tx)
            .await?;
            written += res.rows_affected();
        }
        tx.commit().await?;
        Ok(written)
    }

    pub async fn count_rates(&self, user_id: &str) -> Result<i64, LedgerError> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM exchange_rates WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool())
            .await?;
        Ok(n)
    }

    fn row_to_currency(row: &SqliteRow) -> Result<Currency, LedgerError> {
        Ok(Currency {
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            symbol: row.try_get("symbol")?,
            decimals: row.try_get("decimals")?,
            created_by: row.try_get("created_by")?,
        })
    }

    fn row_to_rate(row: &SqliteRow) -> Result<ExchangeRate, LedgerError> {
        Ok(ExchangeRate {
            id: row.try_get("id")?,
            from_currency: row.try_get("from_currency")?,
            to_currency: row.try_get("to_currency")?,
            rate: decimal_col(row, "rate")?,
            effective_date: row.try_get("effective_date")?,
            rate_type: row.try_get("rate_type")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
