use std::sync::LazyLock;

use chrono::{Duration, NaiveDateTime, Offset, TimeZone};
use chrono_tz::{Tz, US::Central};
use regex::{Captures, Regex};
use thiserror::Error;

/// The feed says UTC but the wall clock is Chicago's.
pub const FEED_TZ: Tz = Central;

/// Feed timestamps mark the end of the priced hour.
const EFFECTIVE_OFFSET_SECS: i64 = 3600;

static MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(Date\.UTC\(\d{4},)(\d+)(,\d+,\d+,\d+,\d+\))$").unwrap());

#[derive(Debug, Error, PartialEq)]
pub enum DateError {
    #[error("unrecognised date token {0:?}")]
    Pattern(String),
    #[error("month in {0:?} is not an integer")]
    Month(String),
    #[error("invalid date {0:?}")]
    Invalid(String),
}

/// Checks that `raw` has the `Date.UTC(YYYY,M,D,H,Min,S)` shape without
/// validating the calendar fields.
pub fn check_shape(raw: &str) -> Result<(), DateError> {
    if MONTH.is_match(raw) {
        Ok(())
    } else {
        Err(DateError::Pattern(raw.to_string()))
    }
}

/// Converts a `Date.UTC(YYYY,M,D,H,Min,S)` token (zero-indexed month, local
/// wall clock) into the unix time at which the price takes effect.
pub fn normalize(raw: &str) -> Result<f64, DateError> {
    let caps = MONTH
        .captures(raw)
        .ok_or_else(|| DateError::Pattern(raw.to_string()))?;
    let month = caps[2]
        .parse::<u32>()
        .ok()
        .and_then(|m| m.checked_add(1))
        .ok_or_else(|| DateError::Month(raw.to_string()))?;
    let fixed = MONTH.replace(raw, |c: &Captures| format!("{}{}{}", &c[1], month, &c[3]));

    let naive = NaiveDateTime::parse_from_str(&fixed, "Date.UTC(%Y,%m,%d,%H,%M,%S)")
        .map_err(|_| DateError::Invalid(raw.to_string()))?;

    let local = localize(naive).ok_or_else(|| DateError::Invalid(raw.to_string()))?;
    Ok((local - EFFECTIVE_OFFSET_SECS) as f64)
}

/// Ambiguous wall times resolve to standard time; wall times inside the
/// spring-forward gap use the offset in force just before it.
fn localize(naive: NaiveDateTime) -> Option<i64> {
    if let Some(dt) = FEED_TZ.from_local_datetime(&naive).latest() {
        return Some(dt.timestamp());
    }
    let before = FEED_TZ
        .from_local_datetime(&(naive - Duration::hours(1)))
        .earliest()?;
    let offset = before.offset().fix().local_minus_utc() as i64;
    Some(naive.and_utc().timestamp() - offset)
}
