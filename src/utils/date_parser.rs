use chrono::{DateTime, Duration, NaiveDate, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::error::ConversionError;
use crate::value::parse_date;

static RELATIVE_DATE_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_relative_date_regex() -> &'static Regex {
    RELATIVE_DATE_REGEX.get_or_init(|| {
        Regex::new(r"^(\d+)(mo|w|d|h)$").expect("Failed to compile relative date regex")
    })
}

/// Parse a `--changed-since` style date, relative to now or absolute:
/// - relative: "1mo", "2w", "3d", "4h" (month = 30 days)
/// - absolute: "2025-07-01", "2025-07-01T12:00:00Z", "2025-07-01T12:00:00" (UTC)
///
/// Relative amounts too large to subtract from now are rejected.
pub fn parse_since_date(since_str: &str) -> Result<DateTime<Utc>, ConversionError> {
    parse_since_date_at(since_str, Utc::now())
}

/// [`parse_since_date`] with an explicit reference time.
pub fn parse_since_date_at(
    since_str: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, ConversionError> {
    let text = since_str.trim();
    let invalid = || ConversionError::UnsupportedValue {
        converter: "date",
        value: since_str.to_string(),
    };

    if let Some(caps) = get_relative_date_regex().captures(text) {
        let amount: i64 = caps[1].parse().map_err(|_| invalid())?;
        let span = match &caps[2] {
            "mo" => amount.checked_mul(30).and_then(Duration::try_days),
            "w" => Duration::try_weeks(amount),
            "d" => Duration::try_days(amount),
            _ => Duration::try_hours(amount),
        };
        return span
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or_else(invalid);
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .ok_or_else(invalid);
    }
    parse_date(text).ok_or_else(invalid)
}
