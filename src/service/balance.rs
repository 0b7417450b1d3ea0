use crate::db::models::{Account, BalanceSnapshot};
use crate::db::transactions::LedgerEntry;
use crate::error::LedgerError;
use crate::service::currency_converter::CurrencyConverter;
use crate::types::domain::TxType;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Checked running total; a sum outside the decimal range is an error rather than a panic.
pub fn add_checked(total: Decimal, amount: Decimal) -> Result<Decimal, LedgerError> {
    total
        .checked_add(amount)
        .ok_or_else(|| LedgerError::validation("amount", "total exceeds the supported range"))
}

/// Native-currency balance of every account as of `as_of`.
///
/// Stock accounts take the latest balance update on or before the date (ties broken by
/// insertion order); flow accounts sum their entries up to the date. `entries` must be
/// ordered by date, then creation time.
pub fn balances_as_of(
    accounts: &[Account],
    entries: &[LedgerEntry],
    as_of: NaiveDate,
) -> Result<HashMap<String, Decimal>, LedgerError> {
    let stock: HashMap<&str, bool> = accounts
        .iter()
        .map(|a| (a.id.as_str(), a.category_type.is_stock()))
        .collect();
    let mut balances: HashMap<String, Decimal> = accounts
        .iter()
        .map(|a| (a.id.clone(), Decimal::ZERO))
        .collect();

    for entry in entries.iter().filter(|e| e.date <= as_of) {
        let Some(is_stock) = stock.get(entry.account_id.as_str()) else {
            continue;
        };
        let Some(slot) = balances.get_mut(&entry.account_id) else {
            continue;
        };
        match (is_stock, entry.tx_type) {
            (true, TxType::Balance) => *slot = entry.amount,
            (false, TxType::Income | TxType::Expense) => *slot = add_checked(*slot, entry.amount)?,
            // mismatched rows cannot be written through the API; ignore them
            _ => {}
        }
    }
    Ok(balances)
}

/// Snapshot every account as of `today`, valuing it in `base_currency` when a rate path exists.
pub fn build_snapshots(
    accounts: &[Account],
    entries: &[LedgerEntry],
    converter: &CurrencyConverter,
    base_currency: &str,
    today: NaiveDate,
) -> Result<Vec<BalanceSnapshot>, LedgerError> {
    let balances = balances_as_of(accounts, entries, today)?;
    let computed_at = Utc::now();
    let snapshots = accounts
        .iter()
        .map(|account| {
            let balance = balances.get(&account.id).copied().unwrap_or_default();
            let base_balance = converter
                .convert(balance, &account.currency_code, base_currency, today)
                .ok();
            BalanceSnapshot {
                account_id: account.id.clone(),
                balance,
                currency_code: account.currency_code.clone(),
                base_balance,
                base_currency: base_currency.to_string(),
                as_of: today,
                computed_at,
            }
        })
        .collect();
    Ok(snapshots)
}
