use crate::error::ConfigurationError;
use crate::models::{RelativeTime, TimeBound};
use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration as StdDuration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

const UNITS: [(&str, u128); 6] = [
    ("weeks", 7 * 24 * 3_600_000),
    ("days", 24 * 3_600_000),
    ("hours", 3_600_000),
    ("minutes", 60_000),
    ("seconds", 1_000),
    ("milliseconds", 1),
];

pub fn now_millis() -> i64 {
    epoch_millis(OffsetDateTime::now_utc())
}

pub fn epoch_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Expresses `duration` in the largest KairosDB unit that divides it exactly.
pub fn duration_to_relative(duration: StdDuration) -> Result<RelativeTime> {
    if duration.subsec_nanos() % 1_000_000 != 0 {
        anyhow::bail!("durations below one millisecond are not supported: {duration:?}");
    }
    let millis = duration.as_millis();
    if millis == 0 {
        anyhow::bail!("duration must not be zero");
    }
    for (unit, size) in UNITS {
        if millis % size == 0 {
            let value = i64::try_from(millis / size).context("duration too large")?;
            return Ok(RelativeTime::new(value, unit));
        }
    }
    unreachable!("milliseconds divide every duration")
}

/// Parses a sampling window such as `"1h"` or `"30 minutes"` into `(value, unit)`.
pub fn parse_sampling(spec: &str) -> Result<(i64, String)> {
    let std = humantime::parse_duration(spec.trim())
        .with_context(|| format!("invalid sampling duration {spec:?}"))?;
    let rel = duration_to_relative(std)?;
    Ok((rel.value, rel.unit))
}

/// Accepts epoch milliseconds, an RFC 3339 timestamp or a relative duration like `"1d"`.
pub fn parse_time_bound(spec: &str) -> Result<TimeBound, ConfigurationError> {
    let trimmed = spec.trim();
    if let Ok(ms) = trimmed.parse::<i64>() {
        return Ok(TimeBound::Absolute(ms));
    }
    if let Ok(at) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(TimeBound::Absolute(epoch_millis(at)));
    }
    humantime::parse_duration(trimmed)
        .ok()
        .and_then(|d| duration_to_relative(d).ok())
        .map(TimeBound::Relative)
        .ok_or_else(|| ConfigurationError::UnrecognizedTimeBound(spec.to_string()))
}

impl FromStr for TimeBound {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_time_bound(s)
    }
}
