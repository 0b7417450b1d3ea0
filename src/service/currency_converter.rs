use crate::db::models::ExchangeRate;
use crate::error::LedgerError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use thiserror::Error as ThisError;

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ConversionError {
    #[error("no exchange rate path {from} -> {to} near {date}")]
    MissingRate {
        from: String,
        to: String,
        date: NaiveDate,
    },
    #[error("converting {from} -> {to} exceeds the decimal range")]
    Overflow { from: String, to: String },
}

impl ConversionError {
    /// `USD->CNY`, the form reports list unconvertible pairs in.
    pub fn pair(&self) -> String {
        match self {
            ConversionError::MissingRate { from, to, .. } | ConversionError::Overflow { from, to } => {
                format!("{from}->{to}")
            }
        }
    }
}

impl From<ConversionError> for LedgerError {
    fn from(e: ConversionError) -> Self {
        LedgerError::Fx(e.to_string())
    }
}

/// Currency graph over dated rates.
///
/// Every pair keeps its own date-ordered series. Inverse edges are implied unless
/// an explicit rate exists for the inverse pair on the same date. Conversions walk
/// the graph breadth-first, so the path with the fewest hops wins.
#[derive(Debug, Default)]
pub struct CurrencyConverter {
    adj: HashMap<String, HashSet<String>>,
    series: HashMap<(String, String), BTreeMap<NaiveDate, Decimal>>,
}

impl CurrencyConverter {
    pub fn new(rates: &[ExchangeRate]) -> Self {
        let mut converter = Self::default();
        // explicit rates first so implied inverses never shadow them
        for rate in rates {
            if rate.from_currency == rate.to_currency || rate.rate <= Decimal::ZERO {
                continue;
            }
            converter.insert_edge(&rate.from_currency, &rate.to_currency, rate.effective_date, rate.rate, true);
        }
        for rate in rates {
            if rate.from_currency == rate.to_currency || rate.rate <= Decimal::ZERO {
                continue;
            }
            let Some(inverse) = Decimal::ONE.checked_div(rate.rate) else {
                continue;
            };
            converter.insert_edge(&rate.to_currency, &rate.from_currency, rate.effective_date, inverse, false);
        }
        converter
    }

    fn insert_edge(&mut self, from: &str, to: &str, date: NaiveDate, rate: Decimal, overwrite: bool) {
        let series = self
            .series
            .entry((from.to_string(), to.to_string()))
            .or_default();
        if overwrite {
            series.insert(date, rate);
        } else {
            series.entry(date).or_insert(rate);
        }
        self.adj
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    pub fn currencies(&self) -> impl Iterator<Item = &String> {
        self.adj.keys()
    }

    /// Dates on which any explicit or implied rate is recorded, ascending.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self
            .series
            .values()
            .flat_map(|s| s.keys().copied())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        dates.sort();
        dates
    }

    /// Latest rate on or before `date`; if the pair only has later rates, the earliest of those.
    fn direct_rate(&self, from: &str, to: &str, date: NaiveDate) -> Option<Decimal> {
        let history = self.series.get(&(from.to_string(), to.to_string()))?;
        history
            .range(..=date)
            .next_back()
            .or_else(|| history.range(date..).next())
            .map(|(_, r)| *r)
    }

    /// Whether the pair has a rate recorded exactly on `date`, without path search.
    pub fn has_direct_on(&self, from: &str, to: &str, date: NaiveDate) -> bool {
        self.series
            .get(&(from.to_string(), to.to_string()))
            .is_some_and(|s| s.contains_key(&date))
    }

    pub fn convert(
        &self,
        amount: Decimal,
        from: &str,
        to: &str,
        date: NaiveDate,
    ) -> Result<Decimal, ConversionError> {
        if from == to {
            return Ok(amount);
        }

        let mut queue: VecDeque<(&str, Decimal)> = VecDeque::new();
        let mut visited: HashSet<&str> = HashSet::new();
        queue.push_back((from, Decimal::ONE));
        visited.insert(from);

        while let Some((current, acc)) = queue.pop_front() {
            if current == to {
                return amount.checked_mul(acc).ok_or_else(|| ConversionError::Overflow {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
            let Some(neighbors) = self.adj.get(current) else {
                continue;
            };
            for next in neighbors {
                if visited.contains(next.as_str()) {
                    continue;
                }
                // a hop whose cumulative rate leaves the decimal range is not a usable path
                if let Some(acc) = self
                    .direct_rate(current, next, date)
                    .and_then(|rate| acc.checked_mul(rate))
                {
                    visited.insert(next.as_str());
                    queue.push_back((next.as_str(), acc));
                }
            }
        }

        Err(ConversionError::MissingRate {
            from: from.to_string(),
            to: to.to_string(),
            date,
        })
    }

    pub fn rate(&self, from: &str, to: &str, date: NaiveDate) -> Result<Decimal, ConversionError> {
        self.convert(Decimal::ONE, from, to, date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::domain::RateType;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn rate(from: &str, to: &str, r: Decimal, day: u32) -> ExchangeRate {
        ExchangeRate {
            id: format!("{from}{to}{day}"),
            from_currency: from.to_string(),
            to_currency: to.to_string(),
            rate: r,
            effective_date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            rate_type: RateType::User,
            notes: None,
            created_at: Utc::now(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    #[test]
    fn same_currency_is_identity() {
        let conv = CurrencyConverter::new(&[]);
        assert_eq!(conv.convert(dec!(12.5), "CNY", "CNY", day(1)).unwrap(), dec!(12.5));
    }

    #[test]
    fn uses_latest_rate_on_or_before_date() {
        let conv = CurrencyConverter::new(&[
            rate("USD", "CNY", dec!(7.0), 1),
            rate("USD", "CNY", dec!(7.2), 10),
        ]);
        assert_eq!(conv.rate("USD", "CNY", day(9)).unwrap(), dec!(7.0));
        assert_eq!(conv.rate("USD", "CNY", day(10)).unwrap(), dec!(7.2));
        assert_eq!(conv.rate("USD", "CNY", day(20)).unwrap(), dec!(7.2));
    }

    #[test]
    fn falls_back_to_earliest_later_rate() {
        let conv = CurrencyConverter::new(&[rate("USD", "CNY", dec!(7.1), 15)]);
        assert_eq!(conv.rate("USD", "CNY", day(2)).unwrap(), dec!(7.1));
    }

    #[test]
    fn inverse_is_implied_but_explicit_wins() {
        let conv = CurrencyConverter::new(&[
            rate("USD", "CNY", dec!(8), 1),
            rate("CNY", "USD", dec!(0.2), 1),
        ]);
        assert_eq!(conv.rate("CNY", "USD", day(1)).unwrap(), dec!(0.2));

        let conv = CurrencyConverter::new(&[rate("USD", "CNY", dec!(8), 1)]);
        assert_eq!(conv.rate("CNY", "USD", day(1)).unwrap(), dec!(0.125));
    }

    #[test]
    fn converts_across_hops() {
        let conv = CurrencyConverter::new(&[
            rate("EUR", "USD", dec!(1.1), 1),
            rate("USD", "CNY", dec!(7), 1),
        ]);
        assert_eq!(conv.convert(dec!(100), "EUR", "CNY", day(1)).unwrap(), dec!(770.0));
    }

    #[test]
    fn reports_missing_path() {
        let conv = CurrencyConverter::new(&[rate("USD", "CNY", dec!(7), 1)]);
        let err = conv.convert(dec!(1), "JPY", "CNY", day(1)).unwrap_err();
        assert_eq!(err.pair(), "JPY->CNY");
    }

    #[test]
    fn overflowing_amount_is_an_error_not_a_panic() {
        let conv = CurrencyConverter::new(&[rate("USD", "CNY", dec!(7), 1)]);
        let err = conv.convert(Decimal::MAX, "USD", "CNY", day(1)).unwrap_err();
        assert_eq!(
            err,
            ConversionError::Overflow {
                from: "USD".into(),
                to: "CNY".into()
            }
        );
        assert!(conv.convert(Decimal::MAX, "CNY", "USD", day(1)).is_ok());
    }
}
