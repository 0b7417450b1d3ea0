use crate::db::models::{RecurringTransaction, Tag, Transaction};
use crate::db::sqlite::{Storage, conflict_on_unique, decimal_col, new_id, now};
use crate::error::LedgerError;
use crate::types::domain::{Frequency, TxType};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct TransactionFields {
    pub account_id: String,
    pub tx_type: TxType,
    pub amount: Decimal,
    pub currency_code: String,
    pub date: NaiveDate,
    pub description: String,
    pub notes: Option<String>,
    pub tag_ids: Vec<String>,
}

/// Filters for listing; every field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account_id: Option<String>,
    pub category_id: Option<String>,
    pub tx_type: Option<TxType>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub tag_id: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RecurringFields {
    pub account_id: String,
    pub tx_type: TxType,
    pub amount: Decimal,
    pub description: String,
    pub frequency: Frequency,
    pub interval_count: i64,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub max_occurrences: Option<i64>,
}

/// Position of a recurring item in its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleState {
    pub next_date: Option<NaiveDate>,
    pub occurrences: i64,
    pub active: bool,
}

/// Amount-only view used by balance and report computations.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub account_id: String,
    pub tx_type: TxType,
    pub amount: Decimal,
    pub currency_code: String,
    pub date: NaiveDate,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

const TX_COLUMNS: &str = "t.id, t.account_id, t.tx_type, t.amount, t.currency_code, t.date, \
     t.description, t.notes, t.recurring_id, t.created_at, t.updated_at";

const RECURRING_COLUMNS: &str = "id, account_id, tx_type, amount, description, frequency, \
     interval_count, start_date, end_date, max_occurrences, occurrences, next_date, active, created_at";

impl Storage {
    /// Page through transactions, newest first. Returns the page and the total match count.
    pub async fn list_transactions(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Transaction>, i64), LedgerError> {
        let mut count_qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM transactions t JOIN accounts a ON a.id = t.account_id");
        push_filter(&mut count_qb, user_id, filter);
        let (total,): (i64,) = count_qb.build_query_as().fetch_one(self.pool()).await?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {TX_COLUMNS} FROM transactions t JOIN accounts a ON a.id = t.account_id"
        ));
        push_filter(&mut qb, user_id, filter);
        qb.push(" ORDER BY t.date DESC, t.created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows = qb.build().fetch_all(self.pool()).await?;

        let mut items = rows
            .iter()
            .map(Self::row_to_transaction)
            .collect::<Result<Vec<_>, _>>()?;
        self.attach_tags(&mut items).await?;
        Ok((items, total))
    }

    pub async fn get_transaction(&self, user_id: &str, id: &str) -> Result<Transaction, LedgerError> {
        let sql = format!("SELECT {TX_COLUMNS} FROM transactions t WHERE t.user_id = ? AND t.id = ?");
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(LedgerError::NotFound("Transaction"))?;
        let mut items = vec![Self::row_to_transaction(&row)?];
        self.attach_tags(&mut items).await?;
        Ok(items.remove(0))
    }

    pub async fn insert_transaction(
        &self,
        user_id: &str,
        fields: &TransactionFields,
    ) -> Result<Transaction, LedgerError> {
        let id = new_id();
        let ts = now();
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"INSERT INTO transactions (
                   id, user_id, account_id, tx_type, amount, currency_code, date,
                   description, notes, recurring_id, created_at, updated_at
               ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)"#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(&fields.account_id)
        .bind(fields.tx_type)
        .bind(fields.amount.to_string())
        .bind(&fields.currency_code)
        .bind(fields.date)
        .bind(&fields.description)
        .bind(&fields.notes)
        .bind(ts)
        .bind(ts)
        .execute(&mut *tx)
        .await?;
        for tag_id in &fields.tag_ids {
            sqlx::query("INSERT OR IGNORE INTO transaction_tags (transaction_id, tag_id) VALUES (?, ?)")
                .bind(&id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        self.get_transaction(user_id, &id).await
    }

    pub async fn update_transaction(
        &self,
        user_id: &str,
        id: &str,
        fields: &TransactionFields,
    ) -> Result<Transaction, LedgerError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"UPDATE transactions SET account_id = ?, tx_type = ?, amount = ?, currency_code = ?,
                   date = ?, description = ?, notes = ?, updated_at = ?
               WHERE user_id = ? AND id = ?"#,
        )
        .bind(&fields.account_id)
        .bind(fields.tx_type)
        .bind(fields.amount.to_string())
        .bind(&fields.currency_code)
        .bind(fields.date)
        .bind(&fields.description)
        .bind(&fields.notes)
        .bind(now())
        .bind(user_id)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "A recurring entry already exists on this date"))?;
        sqlx::query("DELETE FROM transaction_tags WHERE transaction_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for tag_id in &fields.tag_ids {
            sqlx::query("INSERT OR IGNORE INTO transaction_tags (transaction_id, tag_id) VALUES (?, ?)")
                .bind(id)
                .bind(tag_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        self.get_transaction(user_id, id).await
    }

    pub async fn delete_transaction(&self, user_id: &str, id: &str) -> Result<(), LedgerError> {
        sqlx::query("DELETE FROM transactions WHERE user_id = ? AND id = ?")
            .bind(user_id)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn count_account_transactions(&self, account_id: &str) -> Result<i64, LedgerError> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM transactions WHERE account_id = ?")
            .bind(account_id)
            .fetch_one(self.pool())
            .await?;
        Ok(n)
    }

    /// Every entry of the user dated on or before `until`, oldest first.
    pub async fn ledger_entries(
        &self,
        user_id: &str,
        since: Option<NaiveDate>,
        until: NaiveDate,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let rows = sqlx::query(
            r#"SELECT account_id, tx_type, amount, currency_code, date, created_at
               FROM transactions
               WHERE user_id = ? AND (? IS NULL OR date >= ?) AND date <= ?
               ORDER BY date, created_at"#,
        )
        .bind(user_id)
        .bind(since)
        .bind(since)
        .bind(until)
        .fetch_all(self.pool())
        .await?;
        rows.iter()
            .map(|row| {
                Ok(LedgerEntry {
                    account_id: row.try_get("account_id")?,
                    tx_type: row.try_get("tx_type")?,
                    amount: decimal_col(row, "amount")?,
                    currency_code: row.try_get("currency_code")?,
                    date: row.try_get("date")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    pub async fn list_tags(&self, user_id: &str) -> Result<Vec<Tag>, LedgerError> {
        let rows = sqlx::query("SELECT id, name, color, created_at FROM tags WHERE user_id = ? ORDER BY name")
            .bind(user_id)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(Self::row_to_tag).collect()
    }

    pub async fn get_tag(&self, user_id: &str, id: &str) -> Result<Tag, LedgerError> {
        let row = sqlx::query("SELECT id, name, color, created_at FROM tags WHERE user_id = ? AND id = ?")
            .bind(user_id)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(LedgerError::NotFound("Tag"))?;
        Self::row_to_tag(&row)
    }

    /// How many of `ids` are tags owned by the user.
    pub async fn count_owned_tags(&self, user_id: &str, ids: &[String]) -> Result<i64, LedgerError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM tags WHERE user_id = ");
        qb.push_bind(user_id).push(" AND id IN (");
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(id.as_str());
        }
        sep.push_unseparated(")");
        let (n,): (i64,) = qb.build_query_as().fetch_one(self.pool()).await?;
        Ok(n)
    }

    pub async fn insert_tag(&self, user_id: &str, name: &str, color: Option<&str>) -> Result<Tag, LedgerError> {
        let id = new_id();
        sqlx::query("INSERT INTO tags (id, user_id, name, color, created_at) VALUES (?, ?, ?, ?, ?)")
            .bind(&id)
            .bind(user_id)
            .bind(name)
            .bind(color)
            .bind(now())
            .execute(self.pool())
            .await
            .map_err(|e| conflict_on_unique(e, "A tag with this name already exists"))?;
        self.get_tag(user_id, &id).await
    }

    pub async fn update_tag(
        &self,
        user_id: &str,
        id: &str,
        name: &str,
        color: Option<&str>,
    ) -> Result<Tag, LedgerError> {
        sqlx::query("UPDATE tags SET name = ?, color = ? WHERE user_id = ? AND id = ?")
            .bind(name)
            .bind(color)
            .bind(user_id)
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| conflict_on_unique(e, "A tag with this name already exists"))?;
        self.get_tag(user_id, id).await
    }

    pub async fn delete_tag(&self, user_id: &str, id: &str) -> Result<(), LedgerError> {
        sqlx::query("DELETE FROM tags WHERE user_id = ? AND id = ?")
            .bind(user_id)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_recurring(&self, user_id: &str) -> Result<Vec<RecurringTransaction>, LedgerError> {
        let sql = format!(
            "SELECT {RECURRING_COLUMNS} FROM recurring_transactions WHERE user_id = ? ORDER BY next_date IS NULL, next_date, created_at"
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(self.pool()).await?;
        rows.iter().map(Self::row_to_recurring).collect()
    }

    /// Active items whose next occurrence is on or before `today`.
    pub async fn due_recurring(
        &self,
        user_id: &str,
        today: NaiveDate,
    ) -> Result<Vec<RecurringTransaction>, LedgerError> {
        let sql = format!(
            r#"SELECT {RECURRING_COLUMNS} FROM recurring_transactions
               WHERE user_id = ? AND active = 1 AND next_date <= ? ORDER BY next_date"#
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(today)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(Self::row_to_recurring).collect()
    }

    pub async fn count_due_recurring(&self, user_id: &str, today: NaiveDate) -> Result<i64, LedgerError> {
        let (n,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM recurring_transactions WHERE user_id = ? AND active = 1 AND next_date <= ?",
        )
        .bind(user_id)
        .bind(today)
        .fetch_one(self.pool())
        .await?;
        Ok(n)
    }

    pub async fn get_recurring(&self, user_id: &str, id: &str) -> Result<RecurringTransaction, LedgerError> {
        let sql = format!("SELECT {RECURRING_COLUMNS} FROM recurring_transactions WHERE user_id = ? AND id = ?");
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(LedgerError::NotFound("Recurring transaction"))?;
        Self::row_to_recurring(&row)
    }

    pub async fn insert_recurring(
        &self,
        user_id: &str,
        fields: &RecurringFields,
    ) -> Result<RecurringTransaction, LedgerError> {
        let id = new_id();
        sqlx::query(
            r#"INSERT INTO recurring_transactions (
                   id, user_id, account_id, tx_type, amount, description, frequency, interval_count,
                   start_date, end_date, max_occurrences, occurrences, next_date, active, created_at
               ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, 1, ?)"#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(&fields.account_id)
        .bind(fields.tx_type)
        .bind(fields.amount.to_string())
        .bind(&fields.description)
        .bind(fields.frequency)
        .bind(fields.interval_count)
        .bind(fields.start_date)
        .bind(fields.end_date)
        .bind(fields.max_occurrences)
        .bind(fields.start_date)
        .bind(now())
        .execute(self.pool())
        .await?;
        self.get_recurring(user_id, &id).await
    }

    /// Replace the template; the schedule restarts from the new start date.
    pub async fn update_recurring(
        &self,
        user_id: &str,
        id: &str,
        fields: &RecurringFields,
        schedule: &ScheduleState,
    ) -> Result<RecurringTransaction, LedgerError> {
        sqlx::query(
            r#"UPDATE recurring_transactions SET account_id = ?, tx_type = ?, amount = ?, description = ?,
                   frequency = ?, interval_count = ?, start_date = ?, end_date = ?, max_occurrences = ?,
                   occurrences = ?, next_date = ?, active = ?
               WHERE user_id = ? AND id = ?"#,
        )
        .bind(&fields.account_id)
        .bind(fields.tx_type)
        .bind(fields.amount.to_string())
        .bind(&fields.description)
        .bind(fields.frequency)
        .bind(fields.interval_count)
        .bind(fields.start_date)
        .bind(fields.end_date)
        .bind(fields.max_occurrences)
        .bind(schedule.occurrences)
        .bind(schedule.next_date)
        .bind(schedule.active)
        .bind(user_id)
        .bind(id)
        .execute(self.pool())
        .await?;
        self.get_recurring(user_id, id).await
    }

    pub async fn delete_recurring(&self, user_id: &str, id: &str) -> Result<(), LedgerError> {
        sqlx::query("DELETE FROM recurring_transactions WHERE user_id = ? AND id = ?")
            .bind(user_id)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Write the generated occurrences of one recurring item and advance its schedule atomically.
    /// Dates already materialized are skipped. Returns the number of new transactions.
    pub async fn materialize_recurring(
        &self,
        user_id: &str,
        item: &RecurringTransaction,
        currency_code: &str,
        dates: &[NaiveDate],
        advance: &ScheduleState,
    ) -> Result<u64, LedgerError> {
        let mut tx = self.pool().begin().await?;
        let ts = now();
        let mut created = 0;
        for date in dates {
            let res = sqlx::query(
                r#"INSERT OR IGNORE INTO transactions (
                       id, user_id, account_id, tx_type, amount, currency_code, date,
                       description, notes, recurring_id, created_at, updated_at
                   ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, NULL, ?, ?, ?)"#,
            )
            .bind(new_id())
            .bind(user_id)
            .bind(&item.account_id)
            .bind(item.tx_type)
            .bind(item.amount.to_string())
            .bind(currency_code)
            .bind(date)
            .bind(&item.description)
            .bind(&item.id)
            .bind(ts)
            .bind(ts)
            .execute(&mut *tx)
            .await?;
            created += res.rows_affected();
        }
        sqlx::query(
            "UPDATE recurring_transactions SET next_date = ?, occurrences = ?, active = ? WHERE id = ?",
        )
        .bind(advance.next_date)
        .bind(advance.occurrences)
        .bind(advance.active)
        .bind(&item.id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn attach_tags(&self, items: &mut [Transaction]) -> Result<(), LedgerError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            r#"SELECT tt.transaction_id, g.id, g.name, g.color, g.created_at
               FROM transaction_tags tt JOIN tags g ON g.id = tt.tag_id
               WHERE tt.transaction_id IN ("#,
        );
        let mut sep = qb.separated(", ");
        for item in items.iter() {
            sep.push_bind(item.id.clone());
        }
        sep.push_unseparated(") ORDER BY g.name");
        let rows = qb.build().fetch_all(self.pool()).await?;

        let mut by_tx: HashMap<String, Vec<Tag>> = HashMap::new();
        for row in &rows {
            let tx_id: String = row.try_get("transaction_id")?;
            by_tx.entry(tx_id).or_default().push(Self::row_to_tag(row)?);
        }
        for item in items.iter_mut() {
            item.tags = by_tx.remove(&item.id).unwrap_or_default();
        }
        Ok(())
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<Transaction, LedgerError> {
        Ok(Transaction {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            tx_type: row.try_get("tx_type")?,
            amount: decimal_col(row, "amount")?,
            currency_code: row.try_get("currency_code")?,
            date: row.try_get("date")?,
            description: row.try_get("description")?,
            notes: row.try_get("notes")?,
            recurring_id: row.try_get("recurring_id")?,
            tags: Vec::new(),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_tag(row: &SqliteRow) -> Result<Tag, LedgerError> {
        Ok(Tag {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            color: row.try_get("color")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_recurring(row: &SqliteRow) -> Result<RecurringTransaction, LedgerError> {
        Ok(RecurringTransaction {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            tx_type: row.try_get("tx_type")?,
            amount: decimal_col(row, "amount")?,
            description: row.try_get("description")?,
            frequency: row.try_get("frequency")?,
            interval_count: row.try_get("interval_count")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            max_occurrences: row.try_get("max_occurrences")?,
            occurrences: row.try_get("occurrences")?,
            next_date: row.try_get("next_date")?,
            active: row.try_get("active")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

fn push_filter<'a>(qb: &mut QueryBuilder<'a, Sqlite>, user_id: &'a str, filter: &'a TransactionFilter) {
    qb.push(" WHERE t.user_id = ").push_bind(user_id);
    if let Some(account_id) = &filter.account_id {
        qb.push(" AND t.account_id = ").push_bind(account_id.as_str());
    }
    if let Some(category_id) = &filter.category_id {
        // the category and its whole subtree
        qb.push(
            " AND a.category_id IN (WITH RECURSIVE subtree(id) AS (SELECT id FROM categories WHERE id = ",
        )
        .push_bind(category_id.as_str())
        .push(
            " UNION SELECT c.id FROM categories c JOIN subtree s ON c.parent_id = s.id) SELECT id FROM subtree)",
        );
    }
    if let Some(tx_type) = filter.tx_type {
        qb.push(" AND t.tx_type = ").push_bind(tx_type);
    }
    if let Some(start) = filter.start_date {
        qb.push(" AND t.date >= ").push_bind(start);
    }
    if let Some(end) = filter.end_date {
        qb.push(" AND t.date <= ").push_bind(end);
    }
    if let Some(tag_id) = &filter.tag_id {
        qb.push(" AND EXISTS (SELECT 1 FROM transaction_tags tt WHERE tt.transaction_id = t.id AND tt.tag_id = ")
            .push_bind(tag_id.as_str())
            .push(")");
    }
    if let Some(search) = &filter.search {
        qb.push(" AND (t.description LIKE ")
            .push_bind(format!("%{search}%"))
            .push(" OR t.notes LIKE ")
            .push_bind(format!("%{search}%"))
            .push(")");
    }
}
