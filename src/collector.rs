//! The price cache and the scrape-time projection of its snapshot into
//! `kwh_price` samples.

use std::future::Future;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Timelike, Utc};
use thiserror::Error;

use crate::comed::{DatedValue, FeedError, SpotSample};
use crate::date;

pub const METRIC_NAME: &str = "kwh_price";

/// Sub-intervals an hourly price is replicated across.
const SLOTS_PER_HOUR: i64 = 12;
const SLOT_SECS: i64 = 300;
const HOUR_SECS: i64 = 3600;
/// Minute of the hour from which the current hour is considered settled.
const GATE_MINUTE: u32 = 55;

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub spot_samples: Vec<SpotSample>,
    pub predicted_today: Vec<DatedValue>,
    pub actual_today: Option<Vec<DatedValue>>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceType {
    Spot,
    Predicted,
    Actual,
    Reference,
}

impl PriceType {
    pub fn as_str(self) -> &'static str {
        match self {
            PriceType::Spot => "spot",
            PriceType::Predicted => "predicted",
            PriceType::Actual => "actual",
            PriceType::Reference => "reference",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub kind: PriceType,
    pub value: f64,
    pub timestamp_seconds: f64,
}

/// How the estimate for the still-running hour is synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateMode {
    /// One sample at `now - 55min`, averaged from the current hour once it is
    /// nearly complete and from the previous hour otherwise.
    MinuteGated,
    /// Average of everything from the top of the hour on, repeated across the
    /// hour's twelve 5-minute slots.
    Legacy,
}

#[derive(Debug, Clone)]
pub struct CollectorOptions {
    pub estimate_mode: EstimateMode,
    pub reference_price: Option<f64>,
    pub emit_hourly_actuals: bool,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            estimate_mode: EstimateMode::MinuteGated,
            reference_price: Some(6.85),
            emit_hourly_actuals: true,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CollectError {
    #[error("no price data has been fetched yet")]
    NotReady,
}

pub trait PriceSource {
    fn fetch(&self) -> impl Future<Output = Result<Snapshot, FeedError>> + Send;
}

pub struct PriceCache {
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    options: CollectorOptions,
}

impl PriceCache {
    pub fn new(options: CollectorOptions) -> Self {
        Self {
            snapshot: RwLock::new(None),
            options,
        }
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn store(&self, snapshot: Snapshot) {
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(snapshot));
    }

    /// Fetches every feed and swaps the snapshot in. On failure the previous
    /// snapshot stays in place.
    pub async fn refresh<S: PriceSource>(&self, source: &S) -> Result<(), FeedError> {
        tracing::info!("Polling ComEd feeds");
        let snapshot = source.fetch().await?;
        tracing::info!(
            "Fetched {} spot, {} predicted, {} actual prices",
            snapshot.spot_samples.len(),
            snapshot.predicted_today.len(),
            snapshot.actual_today.as_ref().map_or(0, Vec::len)
        );
        self.store(snapshot);
        Ok(())
    }

    pub fn collect(&self, now: DateTime<Utc>) -> Result<Vec<Sample>, CollectError> {
        let snapshot = self.snapshot().ok_or(CollectError::NotReady)?;
        Ok(project(&snapshot, &self.options, now))
    }
}

fn project(snapshot: &Snapshot, options: &CollectorOptions, now: DateTime<Utc>) -> Vec<Sample> {
    let mut samples = Vec::new();

    let now_seconds = now.timestamp_millis() as f64 / 1000.0;

    replicate_hourly(&mut samples, &snapshot.predicted_today, PriceType::Predicted);

    // hours the actual feed already prices; the estimate must not contradict them
    let mut settled_hours = Vec::new();
    if options.emit_hourly_actuals {
        if let Some(actual) = &snapshot.actual_today {
            settled_hours = replicate_hourly(&mut samples, actual, PriceType::Actual);
        }
    }

    if let Some(price) = options.reference_price {
        samples.push(Sample {
            kind: PriceType::Reference,
            value: price,
            timestamp_seconds: now_seconds,
        });
    }

    let current_hour = hour_start(now.timestamp());
    let previous_hour = current_hour - HOUR_SECS;
    let mut current_prices = Vec::new();
    let mut previous_prices = Vec::new();

    for spot in &snapshot.spot_samples {
        let timestamp = spot.timestamp_millis_utc as f64 / 1000.0;
        samples.push(Sample {
            kind: PriceType::Spot,
            value: spot.price_cents,
            timestamp_seconds: timestamp,
        });
        if timestamp >= current_hour as f64 {
            current_prices.push(spot.price_cents);
        } else if timestamp >= previous_hour as f64 {
            previous_prices.push(spot.price_cents);
        }
    }

    match options.estimate_mode {
        EstimateMode::MinuteGated => {
            let partition = if now.minute() >= GATE_MINUTE {
                &current_prices
            } else {
                &previous_prices
            };
            let at = now - Duration::minutes(55);
            if settled_hours.contains(&hour_start(at.timestamp())) {
                tracing::debug!("Actual price already published for {at}, no estimate");
            } else if let Some(estimate) = rounded_mean(partition) {
                samples.push(Sample {
                    kind: PriceType::Actual,
                    value: estimate,
                    timestamp_seconds: at.timestamp_millis() as f64 / 1000.0,
                });
            }
        }
        EstimateMode::Legacy => {
            if settled_hours.contains(&current_hour) {
                tracing::debug!("Actual price already published for this hour, no estimate");
            } else if let Some(estimate) = rounded_mean(&current_prices) {
                for slot in 0..SLOTS_PER_HOUR {
                    samples.push(Sample {
                        kind: PriceType::Actual,
                        value: estimate,
                        timestamp_seconds: (current_hour + slot * SLOT_SECS) as f64,
                    });
                }
            }
        }
    }

    samples
}

fn hour_start(seconds: i64) -> i64 {
    seconds - seconds.rem_euclid(HOUR_SECS)
}

/// Emits each hourly value across its twelve slots and returns the hour
/// starts that were emitted.
fn replicate_hourly(
    samples: &mut Vec<Sample>,
    values: &[DatedValue],
    kind: PriceType,
) -> Vec<i64> {
    let mut hours = Vec::with_capacity(values.len());
    for value in values {
        let start = match date::normalize(&value.raw_date_token) {
            Ok(ts) => ts,
            Err(e) => {
                tracing::warn!("Skipping {} price: {e}", kind.as_str());
                continue;
            }
        };
        for slot in 0..SLOTS_PER_HOUR {
            samples.push(Sample {
                kind,
                value: value.value_cents,
                timestamp_seconds: start + (slot * SLOT_SECS) as f64,
            });
        }
        hours.push(hour_start(start as i64));
    }
    hours
}

fn rounded_mean(prices: &[f64]) -> Option<f64> {
    if prices.is_empty() {
        return None;
    }
    let mean = prices.iter().sum::<f64>() / prices.len() as f64;
    Some((mean * 10.0).round() / 10.0)
}
