//! Request bodies and query strings, with field-level validation.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{FieldError, LedgerError};
use crate::types::domain::{CategoryType, Frequency, TxType};

const MAX_NAME: usize = 100;
const MAX_TEXT: usize = 500;

/// Largest accepted money magnitude, 10^15.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(2_764_472_320, 232_830, 0, false, 0);
/// Largest accepted exchange rate, 10^12.
pub const MAX_RATE: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

fn limit_amount(details: &mut Vec<FieldError>, field: &str, amount: Decimal) {
    if amount.abs() > MAX_AMOUNT {
        details.push(FieldError::new(field, format!("must not exceed {MAX_AMOUNT} in magnitude")));
    }
}

fn require_name(details: &mut Vec<FieldError>, field: &str, value: &str) {
    let len = value.trim().chars().count();
    if len == 0 {
        details.push(FieldError::new(field, "is required"));
    } else if len > MAX_NAME {
        details.push(FieldError::new(field, format!("must be at most {MAX_NAME} characters")));
    }
}

fn limit_text(details: &mut Vec<FieldError>, field: &str, value: Option<&str>) {
    if value.is_some_and(|v| v.chars().count() > MAX_TEXT) {
        details.push(FieldError::new(field, format!("must be at most {MAX_TEXT} characters")));
    }
}

fn is_currency_code(code: &str) -> bool {
    (3..=10).contains(&code.len())
        && code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

fn check_code(details: &mut Vec<FieldError>, field: &str, code: &str) {
    if !is_currency_code(code) {
        details.push(FieldError::new(
            field,
            "must be 3-10 upper-case letters or digits",
        ));
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        let mut details = Vec::new();
        let email = self.email.trim();
        if email.len() > 254 || !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
            details.push(FieldError::new("email", "must be a valid email address"));
        }
        require_name(&mut details, "name", &self.name);
        check_password(&mut details, "password", &self.password);
        LedgerError::check(details)
    }
}

fn check_password(details: &mut Vec<FieldError>, field: &str, password: &str) {
    let len = password.chars().count();
    if !(8..=128).contains(&len) {
        details.push(FieldError::new(field, "must be 8-128 characters"));
    }
}

/// Emails are stored and compared lower-cased.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl ChangePasswordRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        let mut details = Vec::new();
        check_password(&mut details, "newPassword", &self.new_password);
        LedgerError::check(details)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub base_currency: Option<String>,
    pub language: Option<String>,
    pub theme: Option<String>,
    pub date_format: Option<String>,
}

impl SettingsUpdate {
    pub fn validate(&self) -> Result<(), LedgerError> {
        let mut details = Vec::new();
        if let Some(code) = &self.base_currency {
            check_code(&mut details, "baseCurrency", code);
        }
        if let Some(lang) = &self.language
            && !matches!(lang.as_str(), "zh" | "en")
        {
            details.push(FieldError::new("language", "must be zh or en"));
        }
        if let Some(theme) = &self.theme
            && !matches!(theme.as_str(), "light" | "dark" | "system")
        {
            details.push(FieldError::new("theme", "must be light, dark or system"));
        }
        if let Some(fmt) = &self.date_format
            && (fmt.trim().is_empty() || fmt.len() > 20)
        {
            details.push(FieldError::new("dateFormat", "must be 1-20 characters"));
        }
        LedgerError::check(details)
    }
}

#[derive(Debug, Deserialize)]
pub struct NewCurrencyRequest {
    pub code: String,
    pub name: String,
    pub symbol: String,
    pub decimals: Option<i64>,
}

impl NewCurrencyRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        let mut details = Vec::new();
        check_code(&mut details, "code", &self.code);
        require_name(&mut details, "name", &self.name);
        let symbol_len = self.symbol.trim().chars().count();
        if symbol_len == 0 || symbol_len > 10 {
            details.push(FieldError::new("symbol", "must be 1-10 characters"));
        }
        if self.decimals.is_some_and(|d| !(0..=8).contains(&d)) {
            details.push(FieldError::new("decimals", "must be between 0 and 8"));
        }
        LedgerError::check(details)
    }
}

#[derive(Debug, Deserialize)]
pub struct EnableCurrencyRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRequest {
    pub name: String,
    pub parent_id: Option<String>,
    /// Required for top-level categories; children inherit the parent's type.
    #[serde(rename = "type")]
    pub category_type: Option<CategoryType>,
    pub sort_order: Option<i64>,
}

impl CategoryRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        let mut details = Vec::new();
        require_name(&mut details, "name", &self.name);
        if self.parent_id.is_none() && self.category_type.is_none() {
            details.push(FieldError::new("type", "is required for a top-level category"));
        }
        LedgerError::check(details)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRequest {
    pub name: String,
    pub category_id: String,
    pub currency_code: String,
    pub description: Option<String>,
    pub color: Option<String>,
}

impl AccountRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        let mut details = Vec::new();
        require_name(&mut details, "name", &self.name);
        if self.category_id.trim().is_empty() {
            details.push(FieldError::new("categoryId", "is required"));
        }
        check_code(&mut details, "currencyCode", &self.currency_code);
        limit_text(&mut details, "description", self.description.as_deref());
        if let Some(color) = &self.color
            && !is_hex_color(color)
        {
            details.push(FieldError::new("color", "must be a #rrggbb color"));
        }
        LedgerError::check(details)
    }

    pub fn description(&self) -> Option<String> {
        trimmed(self.description.clone())
    }
}

fn is_hex_color(value: &str) -> bool {
    value.len() == 7
        && value.starts_with('#')
        && value[1..].chars().all(|c| c.is_ascii_hexdigit())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub account_id: String,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub amount: Decimal,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
    pub notes: Option<String>,
    #[serde(default)]
    pub tag_ids: Vec<String>,
}

impl TransactionRequest {
    /// Shape checks; account-dependent rules run once the account is loaded.
    pub fn validate(&self) -> Result<(), LedgerError> {
        let mut details = Vec::new();
        if self.account_id.trim().is_empty() {
            details.push(FieldError::new("accountId", "is required"));
        }
        if self.description.chars().count() > MAX_NAME * 2 {
            details.push(FieldError::new("description", "must be at most 200 characters"));
        }
        limit_text(&mut details, "notes", self.notes.as_deref());
        if self.tx_type != TxType::Balance && self.amount <= Decimal::ZERO {
            details.push(FieldError::new("amount", "must be greater than 0"));
        }
        limit_amount(&mut details, "amount", self.amount);
        LedgerError::check(details)
    }

    pub fn notes(&self) -> Option<String> {
        trimmed(self.notes.clone())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionQuery {
    pub account_id: Option<String>,
    pub category_id: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: Option<TxType>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub tag_id: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

impl TransactionQuery {
    /// `(page, limit)` with page ≥ 1 and limit clamped to `1..=100`.
    pub fn paging(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        (page, limit)
    }
}

#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub name: String,
    pub color: Option<String>,
}

impl TagRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        let mut details = Vec::new();
        require_name(&mut details, "name", &self.name);
        if let Some(color) = &self.color
            && !is_hex_color(color)
        {
            details.push(FieldError::new("color", "must be a #rrggbb color"));
        }
        LedgerError::check(details)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringRequest {
    pub account_id: String,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub amount: Decimal,
    #[serde(default)]
    pub description: String,
    pub frequency: Frequency,
    pub interval_count: Option<i64>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub max_occurrences: Option<i64>,
}

impl RecurringRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        let mut details = Vec::new();
        if self.account_id.trim().is_empty() {
            details.push(FieldError::new("accountId", "is required"));
        }
        if self.tx_type == TxType::Balance {
            details.push(FieldError::new("type", "must be INCOME or EXPENSE"));
        }
        if self.amount <= Decimal::ZERO {
            details.push(FieldError::new("amount", "must be greater than 0"));
        }
        limit_amount(&mut details, "amount", self.amount);
        if self.interval_count.is_some_and(|n| !(1..=1000).contains(&n)) {
            details.push(FieldError::new("intervalCount", "must be between 1 and 1000"));
        }
        if self.end_date.is_some_and(|end| end < self.start_date) {
            details.push(FieldError::new("endDate", "must not be before startDate"));
        }
        if self.max_occurrences.is_some_and(|n| n < 1) {
            details.push(FieldError::new("maxOccurrences", "must be at least 1"));
        }
        LedgerError::check(details)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateRequest {
    pub from_currency: String,
    pub to_currency: String,
    pub rate: Decimal,
    pub effective_date: NaiveDate,
    pub notes: Option<String>,
}

impl RateRequest {
    pub fn validate(&self) -> Result<(), LedgerError> {
        let mut details = Vec::new();
        check_code(&mut details, "fromCurrency", &self.from_currency);
        check_code(&mut details, "toCurrency", &self.to_currency);
        if self.from_currency == self.to_currency {
            details.push(FieldError::new("toCurrency", "must differ from fromCurrency"));
        }
        if self.rate <= Decimal::ZERO {
            details.push(FieldError::new("rate", "must be greater than 0"));
        } else if self.rate > MAX_RATE {
            details.push(FieldError::new("rate", format!("must not exceed {MAX_RATE}")));
        }
        limit_text(&mut details, "notes", self.notes.as_deref());
        LedgerError::check(details)
    }
}

#[derive(Debug, Deserialize)]
pub struct RateQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConvertQuery {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
    pub date: Option<NaiveDate>,
}

impl ConvertQuery {
    pub fn validate(&self) -> Result<(), LedgerError> {
        let mut details = Vec::new();
        limit_amount(&mut details, "amount", self.amount);
        LedgerError::check(details)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSheetQuery {
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashFlowQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TriggerQuery {
    #[serde(default)]
    pub wait: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fields_of(err: LedgerError) -> Vec<String> {
        match err {
            LedgerError::Validation { details, .. } => details.into_iter().map(|d| d.field).collect(),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn register_reports_every_bad_field() {
        let req = RegisterRequest {
            email: "nope".into(),
            name: " ".into(),
            password: "short".into(),
        };
        assert_eq!(fields_of(req.validate().unwrap_err()), vec!["email", "name", "password"]);
    }

    #[test]
    fn flow_amount_must_be_positive_but_balance_may_be_negative() {
        let mut req = TransactionRequest {
            account_id: "a".into(),
            tx_type: TxType::Expense,
            amount: dec!(0),
            date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            description: String::new(),
            notes: None,
            tag_ids: vec![],
        };
        assert_eq!(fields_of(req.validate().unwrap_err()), vec!["amount"]);
        req.tx_type = TxType::Balance;
        req.amount = dec!(-250.00);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn currency_codes_are_upper_alnum() {
        assert!(is_currency_code("USD"));
        assert!(is_currency_code("USDT0"));
        assert!(!is_currency_code("usd"));
        assert!(!is_currency_code("US"));
    }

    #[test]
    fn paging_is_clamped() {
        let q = TransactionQuery {
            page: Some(0),
            limit: Some(1000),
            ..Default::default()
        };
        assert_eq!(q.paging(), (1, MAX_PAGE_SIZE));
        assert_eq!(TransactionQuery::default().paging(), (1, DEFAULT_PAGE_SIZE));
    }

    #[test]
    fn same_currency_rate_is_rejected() {
        let req = RateRequest {
            from_currency: "USD".into(),
            to_currency: "USD".into(),
            rate: dec!(1),
            effective_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            notes: None,
        };
        assert_eq!(fields_of(req.validate().unwrap_err()), vec!["toCurrency"]);
    }

    #[test]
    fn amounts_and_rates_are_bounded() {
        assert_eq!(MAX_AMOUNT, dec!(1_000_000_000_000_000));
        assert_eq!(MAX_RATE, dec!(1_000_000_000_000));

        let mut req = TransactionRequest {
            account_id: "a".into(),
            tx_type: TxType::Balance,
            amount: MAX_AMOUNT,
            date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            description: String::new(),
            notes: None,
            tag_ids: vec![],
        };
        assert!(req.validate().is_ok());
        req.amount = -(MAX_AMOUNT + dec!(0.01));
        assert_eq!(fields_of(req.validate().unwrap_err()), vec!["amount"]);

        let query = ConvertQuery {
            from: "USD".into(),
            to: "CNY".into(),
            amount: Decimal::MAX,
            date: None,
        };
        assert_eq!(fields_of(query.validate().unwrap_err()), vec!["amount"]);

        let rate = RateRequest {
            from_currency: "USD".into(),
            to_currency: "VND".into(),
            rate: MAX_RATE + dec!(1),
            effective_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            notes: None,
        };
        assert_eq!(fields_of(rate.validate().unwrap_err()), vec!["rate"]);
    }
}
