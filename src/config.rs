use anyhow::{bail, Context, Result};

use crate::collector::{CollectorOptions, EstimateMode};
use crate::comed;

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub provider: String,
    pub refresh_interval_secs: u64,
    pub http_timeout_secs: u64,
    pub reference_price: Option<f64>,
    pub estimate_mode: EstimateMode,
    pub emit_hourly_actuals: bool,
    pub spot_feed_url: String,
    pub prediction_feed_url: String,
    pub actual_feed_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let refresh_interval_secs: u64 = get("REFRESH_INTERVAL_SECS", "300")
            .parse()
            .context("REFRESH_INTERVAL_SECS must be a number of seconds")?;
        if refresh_interval_secs == 0 {
            bail!("REFRESH_INTERVAL_SECS must be greater than zero");
        }

        Ok(Config {
            port: get("PORT", "8000")
                .parse()
                .context("PORT must be a valid port number")?,
            provider: get("PROVIDER", "comed"),
            refresh_interval_secs,
            http_timeout_secs: get("HTTP_TIMEOUT_SECS", "30")
                .parse()
                .context("HTTP_TIMEOUT_SECS must be a number of seconds")?,
            reference_price: parse_reference_price(&get("REFERENCE_PRICE", "6.85"))?,
            estimate_mode: parse_estimate_mode(&get("ESTIMATE_MODE", "minute-gated"))?,
            emit_hourly_actuals: get("EMIT_HOURLY_ACTUALS", "true")
                .parse()
                .context("EMIT_HOURLY_ACTUALS must be true or false")?,
            spot_feed_url: get("SPOT_FEED_URL", comed::SPOT_FEED_URL),
            prediction_feed_url: get("PREDICTION_FEED_URL", comed::PREDICTION_FEED_URL),
            actual_feed_url: get("ACTUAL_FEED_URL", comed::ACTUAL_FEED_URL),
        })
    }

    #[cfg(test)]
    pub fn defaults() -> Self {
        Self::from_lookup(|_| None).unwrap()
    }

    pub fn collector_options(&self) -> CollectorOptions {
        CollectorOptions {
            estimate_mode: self.estimate_mode,
            reference_price: self.reference_price,
            emit_hourly_actuals: self.emit_hourly_actuals,
        }
    }
}

fn parse_reference_price(raw: &str) -> Result<Option<f64>> {
    if raw.eq_ignore_ascii_case("off") {
        return Ok(None);
    }
    let price: f64 = raw
        .parse()
        .context("REFERENCE_PRICE must be a price in cents or \"off\"")?;
    if !price.is_finite() {
        bail!("REFERENCE_PRICE must be finite");
    }
    Ok(Some(price))
}

fn parse_estimate_mode(raw: &str) -> Result<EstimateMode> {
    match raw {
        "minute-gated" => Ok(EstimateMode::MinuteGated),
        "legacy" => Ok(EstimateMode::Legacy),
        other => bail!("ESTIMATE_MODE must be minute-gated or legacy, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.refresh_interval_secs, 300);
        assert_eq!(config.reference_price, Some(6.85));
        assert_eq!(config.estimate_mode, EstimateMode::MinuteGated);
        assert!(config.emit_hourly_actuals);
        assert_eq!(config.spot_feed_url, comed::SPOT_FEED_URL);
    }

    #[test]
    fn overrides() {
        let config = load(&[
            ("PORT", "9100"),
            ("REFRESH_INTERVAL_SECS", "180"),
            ("REFERENCE_PRICE", "off"),
            ("ESTIMATE_MODE", "legacy"),
            ("EMIT_HOURLY_ACTUALS", "false"),
        ])
        .unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.refresh_interval_secs, 180);
        assert_eq!(config.reference_price, None);
        assert_eq!(config.estimate_mode, EstimateMode::Legacy);
        assert!(!config.emit_hourly_actuals);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(load(&[("PORT", "eighty")]).is_err());
        assert!(load(&[("REFRESH_INTERVAL_SECS", "0")]).is_err());
        assert!(load(&[("ESTIMATE_MODE", "average")]).is_err());
        assert!(load(&[("REFERENCE_PRICE", "NaN")]).is_err());
    }
}
