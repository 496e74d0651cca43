//! Parsing of `--start` / `--stop` values.
//!
//! Accepted forms:
//! - `now`
//! - relative offsets into the past: `-30s`, `-5m`, `-2h`, `-1d`, `-1w` (the
//!   leading `-` is optional, `5m` also means five minutes ago)
//! - RFC 3339 timestamps: `2024-05-01T12:00:00Z`
//! - epoch milliseconds: `1714564800000`

// External crates
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TimeRangeError {
    #[error("unrecognised time '{0}', expected now, a relative offset like -5m, RFC 3339, or epoch milliseconds")]
    Unrecognised(String),
    #[error("time offset '{0}' is out of range")]
    OutOfRange(String),
    #[error("start time {start} is after stop time {stop}")]
    Inverted { start: i64, stop: i64 },
}

/// Resolve a single time value to epoch milliseconds relative to `now`.
pub fn parse_time(value: &str, now: DateTime<Utc>) -> Result<i64, TimeRangeError> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("now") {
        return Ok(now.timestamp_millis());
    }

    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        return value
            .parse::<i64>()
            .map_err(|_| TimeRangeError::OutOfRange(value.to_string()));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc).timestamp_millis());
    }

    let offset = parse_offset(value)?;
    now.checked_sub_signed(offset)
        .map(|t| t.timestamp_millis())
        .ok_or_else(|| TimeRangeError::OutOfRange(value.to_string()))
}

/// Resolve a `[start, stop]` pair. A missing stop leaves the range open.
pub fn resolve_range(
    start: &str,
    stop: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(i64, Option<i64>), TimeRangeError> {
    let start_millis = parse_time(start, now)?;
    let stop_millis = stop.map(|s| parse_time(s, now)).transpose()?;

    if let Some(stop_millis) = stop_millis {
        if start_millis > stop_millis {
            return Err(TimeRangeError::Inverted {
                start: start_millis,
                stop: stop_millis,
            });
        }
    }

    Ok((start_millis, stop_millis))
}

fn parse_offset(value: &str) -> Result<Duration, TimeRangeError> {
    let unrecognised = || TimeRangeError::Unrecognised(value.to_string());

    let body = value.strip_prefix('-').unwrap_or(value);
    let split = body
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(unrecognised)?;
    let (amount, unit) = body.split_at(split);
    if amount.is_empty() {
        return Err(unrecognised());
    }
    let amount: i64 = amount
        .parse()
        .map_err(|_| TimeRangeError::OutOfRange(value.to_string()))?;

    let offset = match unit {
        "ms" => Duration::try_milliseconds(amount),
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        _ => return Err(unrecognised()),
    };
    offset.ok_or_else(|| TimeRangeError::OutOfRange(value.to_string()))
}
