use crate::db::models::{Account, Category};
use crate::db::sqlite::{Storage, conflict_on_unique, new_id, now};
use crate::error::LedgerError;
use crate::types::domain::CategoryType;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

/// Column values for inserting or updating a category.
#[derive(Debug, Clone)]
pub struct CategoryFields {
    pub name: String,
    pub parent_id: Option<String>,
    pub category_type: CategoryType,
    pub sort_order: i64,
}

#[derive(Debug, Clone)]
pub struct AccountFields {
    pub name: String,
    pub category_id: String,
    pub currency_code: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

const ACCOUNT_SELECT: &str = r#"SELECT a.id, a.name, a.category_id, c.category_type, a.currency_code,
       a.description, a.color, a.created_at, a.updated_at
   FROM accounts a JOIN categories c ON c.id = a.category_id"#;

impl Storage {
    pub async fn list_categories(&self, user_id: &str) -> Result<Vec<Category>, LedgerError> {
        let rows = sqlx::query(
            r#"SELECT id, name, parent_id, category_type, sort_order, created_at
               FROM categories WHERE user_id = ? ORDER BY sort_order, name"#,
        )
        .bind(user_id)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(Self::row_to_category).collect()
    }

    pub async fn get_category(&self, user_id: &str, id: &str) -> Result<Category, LedgerError> {
        let row = sqlx::query(
            r#"SELECT id, name, parent_id, category_type, sort_order, created_at
               FROM categories WHERE user_id = ? AND id = ?"#,
        )
        .bind(user_id)
        .bind(id)
        .fetch_optional(self.pool())
        .await?
        .ok_or(LedgerError::NotFound("Category"))?;
        Self::row_to_category(&row)
    }

    pub async fn insert_category(
        &self,
        user_id: &str,
        fields: &CategoryFields,
    ) -> Result<Category, LedgerError> {
        let id = new_id();
        sqlx::query(
            r#"INSERT INTO categories (id, user_id, name, parent_id, category_type, sort_order, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(&fields.name)
        .bind(&fields.parent_id)
        .bind(fields.category_type)
        .bind(fields.sort_order)
        .bind(now())
        .execute(self.pool())
        .await
        .map_err(|e| conflict_on_unique(e, "A category with this name already exists here"))?;
        self.get_category(user_id, &id).await
    }

    pub async fn update_category(
        &self,
        user_id: &str,
        id: &str,
        fields: &CategoryFields,
    ) -> Result<Category, LedgerError> {
        sqlx::query(
            r#"UPDATE categories SET name = ?, parent_id = ?, category_type = ?, sort_order = ?
               WHERE user_id = ? AND id = ?"#,
        )
        .bind(&fields.name)
        .bind(&fields.parent_id)
        .bind(fields.category_type)
        .bind(fields.sort_order)
        .bind(user_id)
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(|e| conflict_on_unique(e, "A category with this name already exists here"))?;
        self.get_category(user_id, id).await
    }

    pub async fn delete_category(&self, user_id: &str, id: &str) -> Result<(), LedgerError> {
        sqlx::query("DELETE FROM categories WHERE user_id = ? AND id = ?")
            .bind(user_id)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn count_child_categories(&self, id: &str) -> Result<i64, LedgerError> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM categories WHERE parent_id = ?")
            .bind(id)
            .fetch_one(self.pool())
            .await?;
        Ok(n)
    }

    pub async fn count_accounts_in_category(&self, id: &str) -> Result<i64, LedgerError> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts WHERE category_id = ?")
            .bind(id)
            .fetch_one(self.pool())
            .await?;
        Ok(n)
    }

    /// Accounts under `category_id` that already hold transactions.
    pub async fn count_used_accounts_in_category(&self, category_id: &str) -> Result<i64, LedgerError> {
        let (n,): (i64,) = sqlx::query_as(
            r#"SELECT COUNT(DISTINCT a.id) FROM accounts a
               JOIN transactions t ON t.account_id = a.id
               WHERE a.category_id = ?"#,
        )
        .bind(category_id)
        .fetch_one(self.pool())
        .await?;
        Ok(n)
    }

    pub async fn list_accounts(&self, user_id: &str) -> Result<Vec<Account>, LedgerError> {
        let sql = format!("{ACCOUNT_SELECT} WHERE a.user_id = ? ORDER BY c.sort_order, a.name");
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(self.pool()).await?;
        rows.iter().map(Self::row_to_account).collect()
    }

    pub async fn get_account(&self, user_id: &str, id: &str) -> Result<Account, LedgerError> {
        let sql = format!("{ACCOUNT_SELECT} WHERE a.user_id = ? AND a.id = ?");
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or(LedgerError::NotFound("Account"))?;
        Self::row_to_account(&row)
    }

    pub async fn insert_account(&self, user_id: &str, fields: &AccountFields) -> Result<Account, LedgerError> {
        let id = new_id();
        let ts = now();
        sqlx::query(
            r#"INSERT INTO accounts (id, user_id, category_id, name, currency_code, description, color, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(&fields.category_id)
        .bind(&fields.name)
        .bind(&fields.currency_code)
        .bind(&fields.description)
        .bind(&fields.color)
        .bind(ts)
        .bind(ts)
        .execute(self.pool())
        .await
        .map_err(|e| conflict_on_unique(e, "An account with this name already exists"))?;
        self.get_account(user_id, &id).await
    }

    pub async fn update_account(
        &self,
        user_id: &str,
        id: &str,
        fields: &AccountFields,
    ) -> Result<Account, LedgerError> {
        sqlx::query(
            r#"UPDATE accounts SET category_id = ?, name = ?, currency_code = ?, description = ?,
                   color = ?, updated_at = ?
               WHERE user_id = ? AND id = ?"#,
        )
        .bind(&fields.category_id)
        .bind(&fields.name)
        .bind(&fields.currency_code)
        .bind(&fields.description)
        .bind(&fields.color)
        .bind(now())
        .bind(user_id)
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(|e| conflict_on_unique(e, "An account with this name already exists"))?;
        self.get_account(user_id, id).await
    }

    pub async fn delete_account(&self, user_id: &str, id: &str) -> Result<(), LedgerError> {
        sqlx::query("DELETE FROM accounts WHERE user_id = ? AND id = ?")
            .bind(user_id)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    fn row_to_category(row: &SqliteRow) -> Result<Category, LedgerError> {
        Ok(Category {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            parent_id: row.try_get("parent_id")?,
            category_type: row.try_get("category_type")?,
            sort_order: row.try_get("sort_order")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account, LedgerError> {
        Ok(Account {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            category_id: row.try_get("category_id")?,
            category_type: row.try_get("category_type")?,
            currency_code: row.try_get("currency_code")?,
            description: row.try_get("description")?,
            color: row.try_get("color")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
