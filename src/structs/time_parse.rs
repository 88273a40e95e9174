use chrono::Duration;
use regex::Regex;
use thiserror::Error;

pub const MAX_DURATION_DAYS: i64 = 3650;

#[derive(Debug, Error, PartialEq)]
pub enum DurationError {
    #[error("Invalid duration. Use e.g. 30d, 2d12h, 3 months, 1y")]
    InvalidFormat,
    #[error("Unknown time unit `{0}`")]
    InvalidUnit(String),
    #[error("Duration must be positive")]
    NonPositive,
}

fn unit_millis(unit: &str) -> Option<f64> {
    const SECOND: f64 = 1_000.0;
    const DAY: f64 = 86_400_000.0;
    let millis = match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => SECOND,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0 * SECOND,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600.0 * SECOND,
        "d" | "day" | "days" => DAY,
        "w" | "wk" | "wks" | "week" | "weeks" => 7.0 * DAY,
        "mo" | "mon" | "month" | "months" => 30.0 * DAY,
        "y" | "yr" | "yrs" | "year" | "years" => 365.0 * DAY,
        _ => return None,
    };
    Some(millis)
}

/// Old key buckets that predate free-form durations.
fn legacy_bucket(input: &str) -> Option<Duration> {
    match input {
        "15d" => Some(Duration::days(15)),
        "1m" => Some(Duration::days(30)),
        "3m" => Some(Duration::days(90)),
        _ => None,
    }
}

/// Parses human durations such as `2d12h`, `3 months`, `1y` or a bare
/// number of days. Capped at ten years.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let input = input.trim().to_lowercase();
    if input.is_empty() {
        return Err(DurationError::InvalidFormat);
    }

    if let Some(bucket) = legacy_bucket(&input) {
        return Ok(bucket);
    }

    if let Ok(days) = input.parse::<i64>() {
        if days <= 0 {
            return Err(DurationError::NonPositive);
        }
        return Ok(Duration::days(days.min(MAX_DURATION_DAYS)));
    }

    let re = Regex::new(r"(\d+(?:\.\d+)?)\s*([a-z]+)").map_err(|_| DurationError::InvalidFormat)?;

    let mut total = 0.0_f64;
    let mut consumed = 0;
    for captures in re.captures_iter(&input) {
        let whole = captures.get(0).ok_or(DurationError::InvalidFormat)?;
        let gap = &input[consumed..whole.start()];
        if !gap.chars().all(|c| c.is_whitespace() || c == ',' || c == '+') {
            return Err(DurationError::InvalidFormat);
        }
        consumed = whole.end();

        let value: f64 = captures[1].parse().map_err(|_| DurationError::InvalidFormat)?;
        let unit = &captures[2];
        let per_unit = unit_millis(unit).ok_or_else(|| DurationError::InvalidUnit(unit.to_string()))?;
        total += value * per_unit;
    }

    if consumed == 0 || !input[consumed..].trim().is_empty() {
        return Err(DurationError::InvalidFormat);
    }

    let millis = total.round() as i64;
    if millis <= 0 {
        return Err(DurationError::NonPositive);
    }

    Ok(Duration::milliseconds(millis).min(Duration::days(MAX_DURATION_DAYS)))
}

pub fn human_readable(duration: Duration) -> String {
    let seconds = duration.num_seconds();

    if seconds < 60 {
        format!("{} seconds", seconds)
    } else if seconds < 3600 {
        format!("{} minutes", duration.num_minutes())
    } else if seconds < 86400 {
        format!("{} hours", duration.num_hours())
    } else {
        format!("{} days", duration.num_days())
    }
}
