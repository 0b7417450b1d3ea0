use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::types::domain::CategoryType;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLine {
    pub account_id: String,
    pub name: String,
    pub currency: String,
    pub amount: Decimal,
    pub formatted: String,
    /// `None` when no rate path to the base currency exists.
    pub base_amount: Option<Decimal>,
}

/// Accounts grouped under one top-level category.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSection {
    pub category_id: String,
    pub category_name: String,
    pub category_type: CategoryType,
    pub accounts: Vec<AccountLine>,
    pub total: Decimal,
    pub formatted_total: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSheetTotals {
    pub assets: Decimal,
    pub liabilities: Decimal,
    pub net_worth: Decimal,
    pub formatted_net_worth: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSheet {
    pub as_of: NaiveDate,
    pub base_currency: String,
    pub sections: Vec<ReportSection>,
    pub totals: BalanceSheetTotals,
    pub missing_rates: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowTotals {
    pub income: Decimal,
    pub expense: Decimal,
    pub net: Decimal,
    pub formatted_net: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub base_currency: String,
    pub sections: Vec<ReportSection>,
    pub totals: CashFlowTotals,
    pub missing_rates: Vec<String>,
}
