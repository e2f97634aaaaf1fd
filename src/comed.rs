use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{de, Deserialize, Deserializer};
use thiserror::Error;

use crate::collector::{PriceSource, Snapshot};
use crate::config::Config;
use crate::date::{self, DateError};

pub const SPOT_FEED_URL: &str = "https://hourlypricing.comed.com/api?type=5minutefeed";
pub const PREDICTION_FEED_URL: &str =
    "https://hourlypricing.comed.com/rrtp/ServletFeed?type=daynexttoday";
pub const ACTUAL_FEED_URL: &str = "https://hourlypricing.comed.com/rrtp/ServletFeed?type=day";

static DATE_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Date\.UTC\([^)]*\)").unwrap());

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("malformed payload from {url}: {source}")]
    Payload {
        url: String,
        #[source]
        source: PayloadError,
    },
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("feed no longer sends Date.UTC tokens: {0}")]
    DateShape(#[from] DateError),
}

/// One 5-minute real-time price point.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpotSample {
    #[serde(rename = "millisUTC", deserialize_with = "lenient_i64")]
    pub timestamp_millis_utc: i64,
    #[serde(rename = "price", deserialize_with = "lenient_f64")]
    pub price_cents: f64,
}

/// A `[Date.UTC(...), price]` pair from the hourly feeds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawDated")]
pub struct DatedValue {
    pub raw_date_token: String,
    pub value_cents: f64,
}

#[derive(Deserialize)]
struct RawDated(String, #[serde(deserialize_with = "lenient_f64")] f64);

impl From<RawDated> for DatedValue {
    fn from(RawDated(raw_date_token, value_cents): RawDated) -> Self {
        Self {
            raw_date_token,
            value_cents,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Int(i64),
    Float(f64),
    Text(String),
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    match Lenient::deserialize(d)? {
        Lenient::Int(v) => Ok(v),
        Lenient::Float(v) => Ok(v as i64),
        Lenient::Text(s) => s.trim().parse().map_err(de::Error::custom),
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    match Lenient::deserialize(d)? {
        Lenient::Int(v) => Ok(v as f64),
        Lenient::Float(v) => Ok(v),
        Lenient::Text(s) => s.trim().parse().map_err(de::Error::custom),
    }
}

/// Quotes the bare `Date.UTC(...)` constructors so the payload is JSON.
///
/// A payload that already quotes its dates comes out doubly quoted and fails
/// to parse, which is the failure we want if upstream changes shape.
pub fn repair_json(body: &str) -> String {
    DATE_TOKEN.replace_all(body, "\"$0\"").into_owned()
}

pub fn parse_spot(body: &str) -> Result<Vec<SpotSample>, PayloadError> {
    Ok(serde_json::from_str(body)?)
}

/// Repairs and parses an hourly feed. Every date must still be a
/// `Date.UTC(...)` token; calendar validity is left to collection.
pub fn parse_dated(body: &str) -> Result<Vec<DatedValue>, PayloadError> {
    let values: Vec<DatedValue> = serde_json::from_str(&repair_json(body))?;
    for value in &values {
        date::check_shape(&value.raw_date_token)?;
    }
    Ok(values)
}

#[derive(Clone)]
pub struct ComedClient {
    client: reqwest::Client,
    spot_url: String,
    prediction_url: String,
    actual_url: Option<String>,
}

impl ComedClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            spot_url: config.spot_feed_url.clone(),
            prediction_url: config.prediction_feed_url.clone(),
            actual_url: config
                .emit_hourly_actuals
                .then(|| config.actual_feed_url.clone()),
        })
    }

    async fn get_text(&self, url: &str) -> Result<String, FeedError> {
        tracing::debug!("ComEd request: {url}");
        let transport = |source: reqwest::Error| FeedError::Transport {
            url: url.to_string(),
            source,
        };
        let resp = self.client.get(url).send().await.map_err(transport)?;
        if !resp.status().is_success() {
            return Err(FeedError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }
        let body = resp.text().await.map_err(transport)?;
        tracing::trace!("ComEd response: {} bytes from {url}", body.len());
        Ok(body)
    }

    async fn fetch_dated(&self, url: &str) -> Result<Vec<DatedValue>, FeedError> {
        let body = self.get_text(url).await?;
        parse_dated(&body).map_err(|source| FeedError::Payload {
            url: url.to_string(),
            source,
        })
    }

    pub async fn fetch_spot(&self) -> Result<Vec<SpotSample>, FeedError> {
        let body = self.get_text(&self.spot_url).await?;
        parse_spot(&body).map_err(|source| FeedError::Payload {
            url: self.spot_url.clone(),
            source,
        })
    }
}

impl PriceSource for ComedClient {
    async fn fetch(&self) -> Result<Snapshot, FeedError> {
        let spot_samples = self.fetch_spot().await?;
        let predicted_today = self.fetch_dated(&self.prediction_url).await?;
        let actual_today = match &self.actual_url {
            Some(url) => Some(self.fetch_dated(url).await?),
            None => None,
        };

        Ok(Snapshot {
            spot_samples,
            predicted_today,
            actual_today,
            fetched_at: chrono::Utc::now(),
        })
    }
}
