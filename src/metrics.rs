use prometheus::proto::{Gauge, LabelPair, Metric, MetricFamily, MetricType};
use prometheus::{Encoder, TextEncoder};

use crate::collector::{Sample, METRIC_NAME};

const HELP: &str = "Electricity price in cents per kWh";

fn label(name: &str, value: &str) -> LabelPair {
    let mut pair = LabelPair::default();
    pair.set_name(name.to_string());
    pair.set_value(value.to_string());
    pair
}

/// Builds the `kwh_price` gauge family, one metric per sample with its own
/// millisecond timestamp.
pub fn family(provider: &str, samples: &[Sample]) -> MetricFamily {
    let mut family = MetricFamily::default();
    family.set_name(METRIC_NAME.to_string());
    family.set_help(HELP.to_string());
    family.set_field_type(MetricType::GAUGE);

    let metrics: Vec<Metric> = samples
        .iter()
        .map(|sample| {
            let mut gauge = Gauge::default();
            gauge.set_value(sample.value);

            let mut metric = Metric::default();
            metric.set_label(
                vec![
                    label("provider", provider),
                    label("type", sample.kind.as_str()),
                ]
                .into(),
            );
            metric.set_gauge(gauge);
            metric.set_timestamp_ms((sample.timestamp_seconds * 1000.0).round() as i64);
            metric
        })
        .collect();
    family.set_metric(metrics.into());

    family
}

pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

pub fn render(provider: &str, samples: &[Sample]) -> anyhow::Result<String> {
    // the encoder refuses families without metrics
    if samples.is_empty() {
        return Ok(String::new());
    }
    let mut buf = Vec::new();
    TextEncoder::new().encode(&[family(provider, samples)], &mut buf)?;
    Ok(String::from_utf8(buf)?)
}
