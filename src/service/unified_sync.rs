//! One sync pass per user: recurring materialization, rate refresh, derived
//! AUTO rates and balance snapshots, in that order.

use crate::db::Storage;
use crate::db::currencies::NewRate;
use crate::db::models::ExchangeRate;
use crate::db::sync::RunCounters;
use crate::error::LedgerError;
use crate::service::balance::build_snapshots;
use crate::service::currency_converter::CurrencyConverter;
use crate::service::fx_provider::FxProvider;
use crate::service::schedule::plan_due;
use crate::service::sync_status::SyncStatusService;
use crate::types::domain::RateType;
use crate::types::sync::{PendingWork, SyncSummary};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Decimal places kept on generated rates.
const AUTO_RATE_DP: u32 = 10;
const RECENT_RUNS: i64 = 5;

#[derive(Clone)]
pub struct UnifiedSyncService {
    storage: Storage,
    provider: Option<FxProvider>,
    status: SyncStatusService,
}

/// AUTO rates derived from explicit (USER/API) ones.
///
/// Every explicit rate gets its inverse on the same date unless an explicit inverse
/// exists. On every date that carries a rate, the base currency gets a cross rate to
/// each enabled currency (and back) when no direct rate is recorded on that date.
pub fn derive_auto_rates(explicit: &[ExchangeRate], base: &str, enabled: &[String]) -> Vec<NewRate> {
    let mut taken: HashSet<(String, String, NaiveDate)> = explicit
        .iter()
        .map(|r| (r.from_currency.clone(), r.to_currency.clone(), r.effective_date))
        .collect();
    let mut out = Vec::new();
    let mut push = |from: &str, to: &str, date: NaiveDate, rate: Decimal, note: &str, out: &mut Vec<NewRate>| {
        let rate = rate.round_dp(AUTO_RATE_DP);
        if from == to || rate <= Decimal::ZERO {
            return;
        }
        if !taken.insert((from.to_string(), to.to_string(), date)) {
            return;
        }
        out.push(NewRate {
            from_currency: from.to_string(),
            to_currency: to.to_string(),
            rate,
            effective_date: date,
            rate_type: RateType::Auto,
            notes: Some(note.to_string()),
        });
    };

    for r in explicit {
        if let Some(inverse) = Decimal::ONE.checked_div(r.rate) {
            push(&r.to_currency, &r.from_currency, r.effective_date, inverse, "inverse", &mut out);
        }
    }

    let converter = CurrencyConverter::new(explicit);
    for date in converter.dates() {
        for code in enabled.iter().filter(|c| c.as_str() != base) {
            if converter.has_direct_on(base, code, date) {
                continue;
            }
            let Ok(rate) = converter.rate(base, code, date) else {
                continue;
            };
            push(base, code, date, rate, "cross", &mut out);
            if let Some(inverse) = Decimal::ONE.checked_div(rate) {
                push(code, base, date, inverse, "cross", &mut out);
            }
        }
    }
    out
}

impl UnifiedSyncService {
    pub fn new(storage: Storage, provider: Option<FxProvider>, stale_after_hours: i64) -> Self {
        let status = SyncStatusService::new(storage.clone(), stale_after_hours);
        Self {
            storage,
            provider,
            status,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn status(&self) -> &SyncStatusService {
        &self.status
    }

    /// Run every step for `user_id`. A provider failure is logged and skipped.
    pub async fn run(&self, user_id: &str, today: NaiveDate) -> Result<RunCounters, LedgerError> {
        let mut counters = RunCounters {
            processed_recurring: self.process_recurring(user_id, today).await?,
            ..RunCounters::default()
        };

        let base = self.storage.base_currency(user_id).await?;
        let enabled = self.storage.enabled_currencies(user_id).await?;

        if let Some(provider) = &self.provider {
            match self.fetch_rates(provider, user_id, &base, &enabled, today).await {
                Ok(n) => counters.fetched_rates = n,
                Err(e) => warn!(user_id, "fx fetch skipped: {}", e),
            }
        }

        let explicit = self
            .storage
            .rates_of_types(user_id, &[RateType::User, RateType::Api])
            .await?;
        let generated = derive_auto_rates(&explicit, &base, &enabled);
        counters.generated_rates = self.storage.replace_auto_rates(user_id, &generated).await? as i64;

        let accounts = self.storage.list_accounts(user_id).await?;
        let entries = self.storage.ledger_entries(user_id, None, today).await?;
        let converter = CurrencyConverter::new(&self.storage.all_rates(user_id).await?);
        let snapshots = build_snapshots(&accounts, &entries, &converter, &base, today)?;
        counters.refreshed_balances = self.storage.replace_snapshots(user_id, &snapshots).await? as i64;

        info!(
            user_id,
            recurring = counters.processed_recurring,
            fetched = counters.fetched_rates,
            generated = counters.generated_rates,
            balances = counters.refreshed_balances,
            "sync pass finished"
        );
        Ok(counters)
    }

    async fn process_recurring(&self, user_id: &str, today: NaiveDate) -> Result<i64, LedgerError> {
        let mut created = 0;
        for item in self.storage.due_recurring(user_id, today).await? {
            let account = self.storage.get_account(user_id, &item.account_id).await?;
            let plan = plan_due(&item, today);
            let n = self
                .storage
                .materialize_recurring(user_id, &item, &account.currency_code, &plan.dates, &plan.state)
                .await?;
            debug!(recurring_id = %item.id, created = n, next = ?plan.state.next_date, "recurring advanced");
            created += n as i64;
        }
        Ok(created)
    }

    async fn fetch_rates(
        &self,
        provider: &FxProvider,
        user_id: &str,
        base: &str,
        enabled: &[String],
        today: NaiveDate,
    ) -> Result<i64, LedgerError> {
        let wanted: Vec<String> = enabled.iter().filter(|c| c.as_str() != base).cloned().collect();
        if wanted.is_empty() {
            return Ok(0);
        }
        let quotes = provider.latest(base, &wanted).await?;
        let mut stored = 0;
        for (code, rate) in quotes {
            let new = NewRate {
                from_currency: base.to_string(),
                to_currency: code,
                rate,
                effective_date: today,
                rate_type: RateType::Api,
                notes: None,
            };
            self.storage.upsert_rate(user_id, &new).await?;
            stored += 1;
        }
        Ok(stored)
    }

    pub async fn get_sync_summary(&self, user_id: &str) -> Result<SyncSummary, LedgerError> {
        let status = self.status.get_sync_status(user_id).await?;
        let today = chrono::Utc::now().date_naive();
        let pending = PendingWork {
            due_recurring: self.storage.count_due_recurring(user_id, today).await?,
            stale_balances: self
                .storage
                .count_stale_snapshots(user_id, status.data_changed_at)
                .await?,
            accounts: self.storage.count_accounts(user_id).await?,
            exchange_rates: self.storage.count_rates(user_id).await?,
        };
        let recent_runs = self.storage.recent_sync_runs(user_id, RECENT_RUNS).await?;
        Ok(SyncSummary {
            status,
            pending,
            last_run: recent_runs.first().cloned(),
            recent_runs,
        })
    }
}
