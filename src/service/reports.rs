use crate::db::Storage;
use crate::db::models::{Account, Category};
use crate::error::LedgerError;
use crate::format::format_currency;
use crate::service::balance::{add_checked, balances_as_of};
use crate::service::currency_converter::CurrencyConverter;
use crate::types::domain::{CategoryType, TxType};
use crate::types::reports::{
    AccountLine, BalanceSheet, BalanceSheetTotals, CashFlow, CashFlowTotals, ReportSection,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};

/// Walk up to the top-level ancestor of `category_id`.
fn root_of<'a>(by_id: &'a HashMap<&str, &'a Category>, category_id: &str) -> Option<&'a Category> {
    let mut current = *by_id.get(category_id)?;
    // bounded by the number of categories; parents never form a cycle
    for _ in 0..by_id.len() {
        match current.parent_id.as_deref().and_then(|p| by_id.get(p)) {
            Some(parent) => current = *parent,
            None => break,
        }
    }
    Some(current)
}

/// Group account lines under their top-level category, in category order.
fn group_sections(
    categories: &[Category],
    lines: Vec<(Account, AccountLine)>,
    base_currency: &str,
) -> Result<Vec<ReportSection>, LedgerError> {
    let by_id: HashMap<&str, &Category> = categories.iter().map(|c| (c.id.as_str(), c)).collect();
    let mut sections: Vec<ReportSection> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (account, line) in lines {
        let Some(root) = root_of(&by_id, &account.category_id) else {
            continue;
        };
        let idx = *index.entry(root.id.clone()).or_insert_with(|| {
            sections.push(ReportSection {
                category_id: root.id.clone(),
                category_name: root.name.clone(),
                category_type: root.category_type,
                accounts: Vec::new(),
                total: Decimal::ZERO,
                formatted_total: String::new(),
            });
            sections.len() - 1
        });
        let section = &mut sections[idx];
        section.total = add_checked(section.total, line.base_amount.unwrap_or_default())?;
        section.accounts.push(line);
    }

    let order: HashMap<&str, (i64, &str)> = categories
        .iter()
        .map(|c| (c.id.as_str(), (c.sort_order, c.name.as_str())))
        .collect();
    sections.sort_by_key(|s| order.get(s.category_id.as_str()).copied());
    for section in &mut sections {
        section.formatted_total = format_currency(section.total, base_currency);
    }
    Ok(sections)
}

pub async fn balance_sheet(
    storage: &Storage,
    user_id: &str,
    as_of: NaiveDate,
) -> Result<BalanceSheet, LedgerError> {
    let base_currency = storage.base_currency(user_id).await?;
    let categories = storage.list_categories(user_id).await?;
    let accounts: Vec<Account> = storage
        .list_accounts(user_id)
        .await?
        .into_iter()
        .filter(|a| a.category_type.is_stock())
        .collect();
    let entries = storage.ledger_entries(user_id, None, as_of).await?;
    let converter = CurrencyConverter::new(&storage.all_rates(user_id).await?);

    let balances = balances_as_of(&accounts, &entries, as_of)?;
    let mut missing = BTreeSet::new();
    let mut assets = Decimal::ZERO;
    let mut liabilities = Decimal::ZERO;
    let mut lines = Vec::with_capacity(accounts.len());

    for account in accounts {
        let amount = balances.get(&account.id).copied().unwrap_or_default();
        let base_amount = match converter.convert(amount, &account.currency_code, &base_currency, as_of) {
            Ok(v) => Some(v),
            Err(e) => {
                missing.insert(e.pair());
                None
            }
        };
        let value = base_amount.unwrap_or_default();
        match account.category_type {
            CategoryType::Liability => liabilities = add_checked(liabilities, value)?,
            _ => assets = add_checked(assets, value)?,
        }
        let line = AccountLine {
            account_id: account.id.clone(),
            name: account.name.clone(),
            currency: account.currency_code.clone(),
            amount,
            formatted: format_currency(amount, &account.currency_code),
            base_amount,
        };
        lines.push((account, line));
    }

    let net_worth = add_checked(assets, -liabilities)?;
    Ok(BalanceSheet {
        as_of,
        sections: group_sections(&categories, lines, &base_currency)?,
        totals: BalanceSheetTotals {
            assets,
            liabilities,
            net_worth,
            formatted_net_worth: format_currency(net_worth, &base_currency),
        },
        base_currency,
        missing_rates: missing.into_iter().collect(),
    })
}

pub async fn cash_flow(
    storage: &Storage,
    user_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<CashFlow, LedgerError> {
    let base_currency = storage.base_currency(user_id).await?;
    let categories = storage.list_categories(user_id).await?;
    let accounts: Vec<Account> = storage
        .list_accounts(user_id)
        .await?
        .into_iter()
        .filter(|a| !a.category_type.is_stock())
        .collect();
    let entries = storage.ledger_entries(user_id, Some(start), end).await?;
    let converter = CurrencyConverter::new(&storage.all_rates(user_id).await?);

    // each entry converts at its own date
    let mut native: HashMap<&str, Decimal> = HashMap::new();
    let mut base: HashMap<&str, Option<Decimal>> = HashMap::new();
    let mut missing = BTreeSet::new();
    for entry in entries.iter().filter(|e| e.tx_type != TxType::Balance) {
        let total = native.entry(entry.account_id.as_str()).or_default();
        *total = add_checked(*total, entry.amount)?;
        let slot = base
            .entry(entry.account_id.as_str())
            .or_insert(Some(Decimal::ZERO));
        match converter.convert(entry.amount, &entry.currency_code, &base_currency, entry.date) {
            Ok(v) => {
                if let Some(total) = slot {
                    *total = add_checked(*total, v)?;
                }
            }
            Err(e) => {
                missing.insert(e.pair());
                *slot = None;
            }
        }
    }

    let mut income = Decimal::ZERO;
    let mut expense = Decimal::ZERO;
    let mut lines = Vec::new();
    for account in accounts {
        let Some(amount) = native.get(account.id.as_str()).copied() else {
            continue;
        };
        let base_amount = base.get(account.id.as_str()).copied().flatten();
        match account.category_type {
            CategoryType::Income => income = add_checked(income, base_amount.unwrap_or_default())?,
            _ => expense = add_checked(expense, base_amount.unwrap_or_default())?,
        }
        let line = AccountLine {
            account_id: account.id.clone(),
            name: account.name.clone(),
            currency: account.currency_code.clone(),
            amount,
            formatted: format_currency(amount, &account.currency_code),
            base_amount,
        };
        lines.push((account, line));
    }

    let net = add_checked(income, -expense)?;
    Ok(CashFlow {
        start_date: start,
        end_date: end,
        sections: group_sections(&categories, lines, &base_currency)?,
        totals: CashFlowTotals {
            income,
            expense,
            net,
            formatted_net: format_currency(net, &base_currency),
        },
        base_currency,
        missing_rates: missing.into_iter().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn category(id: &str, parent: Option<&str>, order: i64) -> Category {
        Category {
            id: id.into(),
            name: id.into(),
            parent_id: parent.map(Into::into),
            category_type: CategoryType::Asset,
            sort_order: order,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn nested_categories_roll_up_to_root() {
        let cats = vec![
            category("assets", None, 0),
            category("bank", Some("assets"), 0),
            category("checking", Some("bank"), 0),
        ];
        let by_id: HashMap<&str, &Category> = cats.iter().map(|c| (c.id.as_str(), c)).collect();
        assert_eq!(root_of(&by_id, "checking").map(|c| c.id.as_str()), Some("assets"));
        assert_eq!(root_of(&by_id, "missing").map(|c| c.id.as_str()), None);
    }
}
