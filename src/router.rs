use axum::{
    Router,
    extract::FromRef,
    routing::{delete, get, post, put},
};
use axum_extra::extract::cookie::Key;
use governor::DefaultKeyedRateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Storage;
use crate::handlers::{
    accounts, auth, categories, currencies, dev, exchange_rates, recurring, reports, settings, sync,
    transactions,
};
use crate::middleware::auth::login_limiter;
use crate::service::report_cache::ReportCache;
use crate::service::sync_actor::SyncHandle;

#[derive(Clone)]
pub struct LedgerState {
    pub storage: Storage,
    pub sync: SyncHandle,
    pub cache: Arc<ReportCache>,
    pub config: Arc<Config>,
    pub login_limiter: Arc<DefaultKeyedRateLimiter<String>>,
    key: Key,
}

impl LedgerState {
    pub fn new(storage: Storage, sync: SyncHandle, cache: Arc<ReportCache>, config: Arc<Config>) -> Self {
        let key = Key::derive_from(config.basic.cookie_secret.as_bytes());
        let login_limiter = Arc::new(login_limiter(config.auth.login_attempts_per_minute));
        Self {
            storage,
            sync,
            cache,
            config,
            login_limiter,
            key,
        }
    }

    pub fn key(&self) -> Key {
        self.key.clone()
    }

    /// Stamp the user's data as changed and drop their cached reports.
    pub async fn data_changed(&self, user_id: &str) -> Result<(), crate::error::LedgerError> {
        self.storage.touch_data_changed(user_id).await?;
        self.cache.invalidate_user(user_id);
        Ok(())
    }
}

impl FromRef<LedgerState> for Key {
    fn from_ref(state: &LedgerState) -> Self {
        state.key.clone()
    }
}

/// Default report cache built from configuration.
pub fn report_cache(config: &Config) -> Arc<ReportCache> {
    Arc::new(ReportCache::new(Duration::from_secs(config.cache.ttl_secs)))
}

pub fn ledger_router(state: LedgerState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me))
        .route("/change-password", post(auth::change_password));

    let user_routes = Router::new()
        .route("/settings", get(settings::get_settings).put(settings::update_settings))
        .route("/currencies", post(currencies::enable_currency))
        .route("/currencies/{code}", delete(currencies::disable_currency));

    let sync_routes = Router::new()
        .route("/check", get(sync::check))
        .route("/status", get(sync::status))
        .route("/summary", get(sync::summary))
        .route("/trigger", post(sync::trigger));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/user", user_routes)
        .nest("/api/sync", sync_routes)
        .route(
            "/api/currencies",
            get(currencies::list_currencies).post(currencies::create_currency),
        )
        .route(
            "/api/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/api/categories/{id}",
            put(categories::update_category).delete(categories::delete_category),
        )
        .route(
            "/api/accounts",
            get(accounts::list_accounts).post(accounts::create_account),
        )
        .route(
            "/api/accounts/{id}",
            get(accounts::get_account)
                .put(accounts::update_account)
                .delete(accounts::delete_account),
        )
        .route(
            "/api/transactions",
            get(transactions::list_transactions).post(transactions::create_transaction),
        )
        .route(
            "/api/transactions/{id}",
            get(transactions::get_transaction)
                .put(transactions::update_transaction)
                .delete(transactions::delete_transaction),
        )
        .route("/api/tags", get(transactions::list_tags).post(transactions::create_tag))
        .route(
            "/api/tags/{id}",
            put(transactions::update_tag).delete(transactions::delete_tag),
        )
        .route(
            "/api/recurring-transactions",
            get(recurring::list_recurring).post(recurring::create_recurring),
        )
        .route(
            "/api/recurring-transactions/{id}",
            put(recurring::update_recurring).delete(recurring::delete_recurring),
        )
        .route(
            "/api/exchange-rates",
            get(exchange_rates::list_rates).post(exchange_rates::upsert_rate),
        )
        .route("/api/exchange-rates/convert", get(exchange_rates::convert))
        .route(
            "/api/exchange-rates/{id}",
            delete(exchange_rates::delete_rate),
        )
        .route("/api/reports/balance-sheet", get(reports::balance_sheet))
        .route("/api/reports/cash-flow", get(reports::cash_flow))
        .route("/api/dev/cache-analysis", get(dev::cache_analysis))
        .route("/api/health", get(dev::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
