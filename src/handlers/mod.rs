pub mod accounts;
pub mod auth;
pub mod categories;
pub mod currencies;
pub mod dev;
pub mod exchange_rates;
pub mod recurring;
pub mod reports;
pub mod settings;
pub mod sync;
pub mod transactions;

use crate::error::LedgerError;
use chrono::{NaiveDate, Utc};

/// A referenced row that does not exist is a bad field, not a missing resource.
pub(crate) fn referenced<T>(
    res: Result<T, LedgerError>,
    field: &str,
    message: &str,
) -> Result<T, LedgerError> {
    match res {
        Err(LedgerError::NotFound(_)) => Err(LedgerError::validation(field, message)),
        other => other,
    }
}

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}
