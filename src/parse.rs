//! Token parsers for the sensor-study locale: decimal commas,
//! `DD/MM/YYYY` dates and `HH.MM.SS` times.
//!
//! None of these fail loudly. Numbers come back as `None` when there is no
//! usable value; dates and times come back as `None` when malformed and the
//! caller decides whether that is an error.

use crate::constants::MISSING_VALUE_INDICATOR;
use crate::reading::TimeOfDay;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static TIME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-1]?[0-9]|2[0-3]):([0-5][0-9]):([0-5][0-9])$").expect("valid time pattern")
});

/// Parse a measurement token such as `2,6` or `1360`.
///
/// Empty, blank and sentinel tokens are absent, and so is anything that is
/// not a finite number once the decimal comma is swapped for a point.
pub fn parse_numeric_value(raw: &str) -> Option<f64> {
    let token = raw.trim();
    if token.is_empty() || token == MISSING_VALUE_INDICATOR {
        return None;
    }

    let normalized = token.replacen(',', ".", 1);
    normalized
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Parse `DD/MM/YYYY` into a calendar date; impossible dates are rejected.
///
/// Day and month may be a single digit, the year is always four.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let token = raw.trim();
    if token.is_empty() {
        return None;
    }

    let mut parts = token.split('/');
    let (day, month, year) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    if year.len() != 4 {
        return None;
    }
    let day = parse_digits(day)?;
    let month = parse_digits(month)?;
    let year = parse_digits(year)?;
    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month, day)
}

/// Parse `HH.MM.SS`. Hours may be a single digit; minutes and seconds are two.
pub fn parse_time(raw: &str) -> Option<TimeOfDay> {
    let token = raw.trim();
    if token.is_empty() {
        return None;
    }

    let formatted = token.replace('.', ":");
    let caps = TIME_PATTERN.captures(&formatted)?;
    let hour = caps[1].parse().ok()?;
    let minute = caps[2].parse().ok()?;
    let second = caps[3].parse().ok()?;
    TimeOfDay::from_hms(hour, minute, second)
}

fn parse_digits(part: &str) -> Option<u32> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}
