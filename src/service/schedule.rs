//! Date arithmetic for recurring transactions.

use crate::db::models::RecurringTransaction;
use crate::db::transactions::ScheduleState;
use crate::types::domain::Frequency;
use chrono::{Days, Months, NaiveDate};

/// Upper bound on occurrences materialized for one item in one pass.
const MAX_PER_PASS: usize = 3660;

/// The `n`-th occurrence (0-based), always computed from `start` so month ends do not drift.
pub fn nth_occurrence(start: NaiveDate, frequency: Frequency, interval: i64, n: i64) -> Option<NaiveDate> {
    let steps = u32::try_from(interval.checked_mul(n)?).ok()?;
    match frequency {
        Frequency::Daily => start.checked_add_days(Days::new(u64::from(steps))),
        Frequency::Weekly => start.checked_add_days(Days::new(u64::from(steps) * 7)),
        Frequency::Monthly => start.checked_add_months(Months::new(steps)),
        Frequency::Yearly => start.checked_add_months(Months::new(steps.checked_mul(12)?)),
    }
}

/// Occurrences due up to and including `today`, and the schedule position afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuePlan {
    pub dates: Vec<NaiveDate>,
    pub state: ScheduleState,
}

/// An exhausted schedule comes back inactive with no next date.
pub fn plan_due(item: &RecurringTransaction, today: NaiveDate) -> DuePlan {
    let mut dates = Vec::new();
    let mut n = item.occurrences;
    let mut next_date = item.next_date;
    let mut active = item.active;

    while active {
        if item.max_occurrences.is_some_and(|max| n >= max) {
            active = false;
            break;
        }
        let Some(date) = nth_occurrence(item.start_date, item.frequency, item.interval_count, n) else {
            active = false;
            break;
        };
        if item.end_date.is_some_and(|end| date > end) {
            active = false;
            break;
        }
        next_date = Some(date);
        if date > today || dates.len() >= MAX_PER_PASS {
            break;
        }
        dates.push(date);
        n += 1;
    }
    if !active {
        next_date = None;
    }

    DuePlan {
        dates,
        state: ScheduleState {
            next_date,
            occurrences: n,
            active,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::domain::TxType;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn item(frequency: Frequency, start: NaiveDate) -> RecurringTransaction {
        RecurringTransaction {
            id: "r1".into(),
            account_id: "a1".into(),
            tx_type: TxType::Expense,
            amount: dec!(10),
            description: "rent".into(),
            frequency,
            interval_count: 1,
            start_date: start,
            end_date: None,
            max_occurrences: None,
            occurrences: 0,
            next_date: Some(start),
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn monthly_schedule_clamps_without_drifting() {
        let start = ymd(2026, 1, 31);
        assert_eq!(nth_occurrence(start, Frequency::Monthly, 1, 1), Some(ymd(2026, 2, 28)));
        assert_eq!(nth_occurrence(start, Frequency::Monthly, 1, 2), Some(ymd(2026, 3, 31)));
    }

    #[test]
    fn weekly_and_yearly_steps() {
        let start = ymd(2024, 2, 29);
        assert_eq!(nth_occurrence(start, Frequency::Weekly, 2, 1), Some(ymd(2024, 3, 14)));
        assert_eq!(nth_occurrence(start, Frequency::Yearly, 1, 1), Some(ymd(2025, 2, 28)));
    }

    #[test]
    fn plans_every_due_date_through_today() {
        let plan = plan_due(&item(Frequency::Daily, ymd(2026, 3, 1)), ymd(2026, 3, 4));
        assert_eq!(plan.dates.len(), 4);
        assert_eq!(plan.state.next_date, Some(ymd(2026, 3, 5)));
        assert_eq!(plan.state.occurrences, 4);
        assert!(plan.state.active);
    }

    #[test]
    fn future_start_plans_nothing() {
        let plan = plan_due(&item(Frequency::Monthly, ymd(2026, 6, 1)), ymd(2026, 3, 4));
        assert!(plan.dates.is_empty());
        assert_eq!(plan.state.next_date, Some(ymd(2026, 6, 1)));
    }

    #[test]
    fn stops_at_end_date_and_deactivates() {
        let mut it = item(Frequency::Daily, ymd(2026, 3, 1));
        it.end_date = Some(ymd(2026, 3, 2));
        let plan = plan_due(&it, ymd(2026, 3, 10));
        assert_eq!(plan.dates, vec![ymd(2026, 3, 1), ymd(2026, 3, 2)]);
        assert!(!plan.state.active);
        assert_eq!(plan.state.next_date, None);
    }

    #[test]
    fn stops_at_max_occurrences() {
        let mut it = item(Frequency::Weekly, ymd(2026, 1, 1));
        it.max_occurrences = Some(3);
        let plan = plan_due(&it, ymd(2026, 12, 31));
        assert_eq!(plan.dates.len(), 3);
        assert_eq!(plan.state.occurrences, 3);
        assert!(!plan.state.active);
        assert_eq!(plan.state.next_date, None);
    }

    #[test]
    fn last_allowed_occurrence_today_finishes_the_schedule() {
        let mut it = item(Frequency::Monthly, ymd(2026, 1, 15));
        it.max_occurrences = Some(2);
        it.occurrences = 1;
        it.next_date = Some(ymd(2026, 2, 15));
        let plan = plan_due(&it, ymd(2026, 2, 15));
        assert_eq!(plan.dates, vec![ymd(2026, 2, 15)]);
        assert_eq!(plan.state.next_date, None);
        assert!(!plan.state.active);

        // a finished item plans nothing on later passes
        let mut done = it.clone();
        done.occurrences = plan.state.occurrences;
        done.next_date = plan.state.next_date;
        done.active = plan.state.active;
        let again = plan_due(&done, ymd(2027, 1, 1));
        assert!(again.dates.is_empty());
        assert_eq!(again.state.next_date, None);
    }

    #[test]
    fn resumes_from_stored_position() {
        let mut it = item(Frequency::Daily, ymd(2026, 3, 1));
        it.occurrences = 2;
        it.next_date = Some(ymd(2026, 3, 3));
        let plan = plan_due(&it, ymd(2026, 3, 3));
        assert_eq!(plan.dates, vec![ymd(2026, 3, 3)]);
    }
}
