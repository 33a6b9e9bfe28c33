//! Timestamp and duration utilities

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp as ISO-8601 UTC for response metadata
pub fn to_iso8601(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Parse a human duration string from configuration.
///
/// Accepts `365d`, `6h`, `30min`, `5s`, `250ms`. Bare numbers are
/// rejected so a missing unit is caught at startup rather than silently
/// interpreted.
pub fn parse_human_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| Error::Config(format!("duration '{s}' is missing a unit")))?;
    let (num, unit) = s.split_at(split);
    let value: u64 = num
        .parse()
        .map_err(|_| Error::Config(format!("invalid duration value in '{s}'")))?;

    let duration = match unit {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "min" | "m" => Duration::from_secs(value * 60),
        "h" => Duration::from_secs(value * 3600),
        "d" => Duration::from_secs(value * 86_400),
        other => {
            return Err(Error::Config(format!(
                "unknown duration unit '{other}' in '{s}'"
            )))
        }
    };

    Ok(duration)
}
