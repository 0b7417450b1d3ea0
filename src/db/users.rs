use crate::db::models::{DbUser, UserSettings};
use crate::db::sqlite::{Storage, conflict_on_unique, new_id, now};
use crate::error::LedgerError;
use crate::types::domain::CategoryType;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

/// Top-level categories every new user starts with.
const DEFAULT_CATEGORIES: [(&str, CategoryType); 4] = [
    ("Assets", CategoryType::Asset),
    ("Liabilities", CategoryType::Liability),
    ("Income", CategoryType::Income),
    ("Expenses", CategoryType::Expense),
];

impl Storage {
    /// Create a user with settings, the enabled base currency and default categories, atomically.
    pub async fn create_user(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
        base_currency: &str,
    ) -> Result<DbUser, LedgerError> {
        let mut tx = self.pool().begin().await?;
        let id = new_id();
        let ts = now();

        sqlx::query(
            r#"INSERT INTO users (id, email, name, password_hash, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(email)
        .bind(name)
        .bind(password_hash)
        .bind(ts)
        .bind(ts)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "Email is already registered"))?;

        sqlx::query(
            r#"INSERT INTO user_settings (user_id, base_currency, updated_at) VALUES (?, ?, ?)"#,
        )
        .bind(&id)
        .bind(base_currency)
        .bind(ts)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO user_currencies (user_id, code) VALUES (?, ?)")
            .bind(&id)
            .bind(base_currency)
            .execute(&mut *tx)
            .await?;

        for (order, (cat_name, cat_type)) in DEFAULT_CATEGORIES.iter().enumerate() {
            sqlx::query(
                r#"INSERT INTO categories (id, user_id, name, parent_id, category_type, sort_order, created_at)
                   VALUES (?, ?, ?, NULL, ?, ?, ?)"#,
            )
            .bind(new_id())
            .bind(&id)
            .bind(*cat_name)
            .bind(*cat_type)
            .bind(order as i64)
            .bind(ts)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(DbUser {
            id,
            email: email.to_string(),
            name: name.to_string(),
            password_hash: password_hash.to_string(),
            created_at: ts,
            updated_at: ts,
        })
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<DbUser>, LedgerError> {
        let row = sqlx::query(
            "SELECT id, email, name, password_hash, created_at, updated_at FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(self.pool())
        .await?;
        row.map(|r| Self::row_to_user(&r)).transpose()
    }

    pub async fn get_user(&self, id: &str) -> Result<DbUser, LedgerError> {
        let row = sqlx::query(
            "SELECT id, email, name, password_hash, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(LedgerError::NotFound("User"))?;
        Self::row_to_user(&row)
    }

    pub async fn list_user_ids(&self) -> Result<Vec<String>, LedgerError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM users ORDER BY created_at")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    pub async fn update_password(&self, user_id: &str, password_hash: &str) -> Result<(), LedgerError> {
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(now())
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn create_session(
        &self,
        token: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        sqlx::query("INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
            .bind(token)
            .bind(user_id)
            .bind(now())
            .bind(expires_at)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Resolve a live session to its user; expired sessions are removed on sight.
    pub async fn user_for_session(&self, token: &str) -> Result<Option<DbUser>, LedgerError> {
        let row = sqlx::query(
            r#"SELECT u.id, u.email, u.name, u.password_hash, u.created_at, u.updated_at,
                      s.expires_at
               FROM sessions s JOIN users u ON u.id = s.user_id
               WHERE s.token = ?"#,
        )
        .bind(token)
        .fetch_optional(self.pool())
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let expires_at: DateTime<Utc> = row.try_get("expires_at")?;
        if expires_at <= now() {
            self.delete_session(token).await?;
            return Ok(None);
        }
        Self::row_to_user(&row).map(Some)
    }

    pub async fn delete_session(&self, token: &str) -> Result<(), LedgerError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Drop every session of the user except `keep`.
    pub async fn delete_other_sessions(&self, user_id: &str, keep: &str) -> Result<u64, LedgerError> {
        let res = sqlx::query("DELETE FROM sessions WHERE user_id = ? AND token <> ?")
            .bind(user_id)
            .bind(keep)
            .execute(self.pool())
            .await?;
        Ok(res.rows_affected())
    }

    pub async fn get_settings(&self, user_id: &str) -> Result<UserSettings, LedgerError> {
        let row = sqlx::query(
            r#"SELECT base_currency, language, theme, date_format, updated_at
               FROM user_settings WHERE user_id = ?"#,
        )
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(LedgerError::NotFound("Settings"))?;
        Ok(UserSettings {
            base_currency: row.try_get("base_currency")?,
            language: row.try_get("language")?,
            theme: row.try_get("theme")?,
            date_format: row.try_get("date_format")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    pub async fn base_currency(&self, user_id: &str) -> Result<String, LedgerError> {
        Ok(self.get_settings(user_id).await?.base_currency)
    }

    /// Persist settings; a new base currency is enabled for the user in the same transaction.
    pub async fn save_settings(&self, user_id: &str, settings: &UserSettings) -> Result<(), LedgerError> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(
            r#"UPDATE user_settings SET base_currency = ?, language = ?, theme = ?,
                   date_format = ?, updated_at = ?
               WHERE user_id = ?"#,
        )
        .bind(&settings.base_currency)
        .bind(&settings.language)
        .bind(&settings.theme)
        .bind(&settings.date_format)
        .bind(settings.updated_at)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("INSERT OR IGNORE INTO user_currencies (user_id, code) VALUES (?, ?)")
            .bind(user_id)
            .bind(&settings.base_currency)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    fn row_to_user(row: &SqliteRow) -> Result<DbUser, LedgerError> {
        Ok(DbUser {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            password_hash: row.try_get("password_hash")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
