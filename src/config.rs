use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use url::Url;

use crate::error::LedgerError;

/// Process-wide configuration, loaded once from defaults, `config.toml` and `LEDGER_*` env vars.
pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    let cfg = Config::load().expect("FATAL: failed to load configuration");
    if let Err(e) = cfg.validate() {
        panic!("FATAL: invalid configuration: {e}");
    }
    cfg
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
    Test,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BasicConfig {
    pub listen_addr: String,
    pub database_url: String,
    pub loglevel: String,
    pub environment: Environment,
    /// Master secret for the private session cookie; at least 32 bytes.
    pub cookie_secret: String,
    pub insecure_cookie: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub session_ttl_days: i64,
    pub login_attempts_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub default_base_currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub stale_after_hours: i64,
    pub sweep_interval_secs: u64,
    pub wait_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FxConfig {
    /// Latest-rates endpoint; `{base}` is replaced by the user's base currency.
    pub provider_url: Option<Url>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub basic: BasicConfig,
    pub auth: AuthConfig,
    pub ledger: LedgerConfig,
    pub sync: SyncConfig,
    pub fx: FxConfig,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            basic: BasicConfig {
                listen_addr: "0.0.0.0:8000".to_string(),
                database_url: "sqlite://ledgerflow.sqlite".to_string(),
                loglevel: "info".to_string(),
                environment: Environment::Production,
                cookie_secret: "change-me-change-me-change-me-change-me-change-me-change-me"
                    .to_string(),
                insecure_cookie: false,
            },
            auth: AuthConfig {
                session_ttl_days: 30,
                login_attempts_per_minute: 10,
            },
            ledger: LedgerConfig {
                default_base_currency: "CNY".to_string(),
            },
            sync: SyncConfig {
                stale_after_hours: 24,
                sweep_interval_secs: 0,
                wait_timeout_secs: 30,
            },
            fx: FxConfig::default(),
            cache: CacheConfig { ttl_secs: 300 },
        }
    }
}

impl Config {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("LEDGER_").split("__"))
    }

    pub fn load() -> Result<Self, LedgerError> {
        Self::figment()
            .extract()
            .map_err(|e| LedgerError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.basic.cookie_secret.len() < 32 {
            return Err(LedgerError::Config(
                "basic.cookie_secret must be at least 32 bytes".to_string(),
            ));
        }
        if self.basic.database_url.trim().is_empty() {
            return Err(LedgerError::Config(
                "basic.database_url must not be empty".to_string(),
            ));
        }
        if self.auth.login_attempts_per_minute == 0 {
            return Err(LedgerError::Config(
                "auth.login_attempts_per_minute must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.basic.environment == Environment::Development
    }
}
