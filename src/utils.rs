//! Utility functions for identifiers, quantities and dates

use bech32::Bech32m;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use uuid7::uuid7;

// construct a unique time-ordered id then encode using bech32
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Parses a user-typed quantity such as `"10,000"` or `"2 500"`.
///
/// Grouping separators are stripped first. Integral decimals (`"250.0"`) are
/// accepted, anything fractional, negative or non-numeric is `None`.
pub fn parse_quantity(raw: &str) -> Option<u64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '_' | ' ' | '\u{a0}'))
        .collect();

    if cleaned.is_empty() {
        return None;
    }
    if let Ok(n) = cleaned.parse::<u64>() {
        return Some(n);
    }
    let float = cleaned.parse::<f64>().ok()?;
    float_to_quantity(float)
}

/// Reads a quantity out of a loosely typed JSON value.
///
/// Used when summing stored data: numbers and numeric strings are read,
/// everything else (including `null` and `""`) is `None` so the caller can
/// count it as zero.
pub fn quantity_from_json(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(float_to_quantity)),
        Value::String(s) => parse_quantity(s),
        _ => None,
    }
}

fn float_to_quantity(float: f64) -> Option<u64> {
    if !float.is_finite() || float < 0.0 || float.fract() != 0.0 || float > u64::MAX as f64 {
        return None;
    }
    Some(float as u64)
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Parses the date strings the upstream forms produce, at day granularity.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
    {
        return Some(dt.date());
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(raw, f).ok())
}
