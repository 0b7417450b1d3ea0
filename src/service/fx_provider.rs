use crate::config::FxConfig;
use crate::error::{IsRetryable, LedgerError};
use backon::{ExponentialBuilder, Retryable};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;
use url::Url;

fn default_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(3)
        .with_jitter()
}

/// Payload of a latest-rates endpoint: `1 base = rates[code] code`.
#[derive(Debug, Deserialize)]
struct LatestRates {
    rates: HashMap<String, Decimal>,
}

/// Client for an external latest-rates API.
#[derive(Clone)]
pub struct FxProvider {
    client: reqwest::Client,
    url_template: Url,
}

impl FxProvider {
    /// `None` when no provider is configured.
    pub fn from_config(cfg: &FxConfig) -> Result<Option<Self>, LedgerError> {
        let Some(url_template) = cfg.provider_url.clone() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .user_agent("ledgerflow-fx/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Some(Self {
            client,
            url_template,
        }))
    }

    fn url_for(&self, base: &str) -> Result<Url, LedgerError> {
        // braces are percent-encoded once the template went through `Url`
        let raw = self
            .url_template
            .as_str()
            .replace("%7Bbase%7D", base)
            .replace("{base}", base);
        Url::parse(&raw).map_err(|e| LedgerError::Config(format!("fx.provider_url: {e}")))
    }

    /// Latest rates quoted against `base`, restricted to `wanted` codes.
    pub async fn latest(
        &self,
        base: &str,
        wanted: &[String],
    ) -> Result<HashMap<String, Decimal>, LedgerError> {
        let url = self.url_for(base)?;
        let payload = (|| async {
            let resp = self.client.get(url.clone()).send().await?;
            if !resp.status().is_success() {
                return Err(LedgerError::UpstreamStatus(resp.status()));
            }
            Ok(resp.json::<LatestRates>().await?)
        })
        .retry(default_retry_policy())
        .when(|e: &LedgerError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!("fx provider retrying after error {}, sleeping {:?}", err, dur);
        })
        .await?;

        Ok(payload
            .rates
            .into_iter()
            .filter(|(code, rate)| code != base && *rate > Decimal::ZERO && wanted.contains(code))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_provider_is_none() {
        assert!(FxProvider::from_config(&FxConfig::default()).unwrap().is_none());
    }

    #[test]
    fn base_placeholder_is_substituted() {
        let cfg = FxConfig {
            provider_url: Some(Url::parse("https://rates.example.com/v6/latest/{base}").unwrap()),
        };
        let provider = FxProvider::from_config(&cfg).unwrap().unwrap();
        assert_eq!(
            provider.url_for("CNY").unwrap().as_str(),
            "https://rates.example.com/v6/latest/CNY"
        );
    }
}
