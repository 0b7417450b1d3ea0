use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CategoryType {
    Asset,
    Liability,
    Income,
    Expense,
}

impl CategoryType {
    /// Stock accounts carry a balance; flow accounts accumulate income or expense.
    pub fn is_stock(self) -> bool {
        matches!(self, CategoryType::Asset | CategoryType::Liability)
    }

    /// The only transaction type a flow account of this kind accepts.
    pub fn flow_tx_type(self) -> Option<TxType> {
        match self {
            CategoryType::Income => Some(TxType::Income),
            CategoryType::Expense => Some(TxType::Expense),
            CategoryType::Asset | CategoryType::Liability => None,
        }
    }

    pub fn accepts(self, tx_type: TxType) -> bool {
        if self.is_stock() {
            tx_type == TxType::Balance
        } else {
            self.flow_tx_type() == Some(tx_type)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxType {
    Income,
    Expense,
    Balance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateType {
    /// Entered by the user.
    User,
    /// Fetched from the configured rate provider.
    Api,
    /// Derived by sync (inverse and cross rates).
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    Idle,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::Idle => "idle",
            SyncState::Processing => "processing",
            SyncState::Completed => "completed",
            SyncState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stock_accounts_only_take_balance_updates() {
        assert!(CategoryType::Asset.accepts(TxType::Balance));
        assert!(!CategoryType::Liability.accepts(TxType::Expense));
        assert!(CategoryType::Expense.accepts(TxType::Expense));
        assert!(!CategoryType::Expense.accepts(TxType::Income));
        assert!(!CategoryType::Income.accepts(TxType::Balance));
    }
}
