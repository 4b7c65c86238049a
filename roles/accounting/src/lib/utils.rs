//! Small helpers shared by the accounting engines.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Parses a stored work/difficulty value.
///
/// Accepts an optional leading `-`, digits, and an optional fractional part
/// with at least one digit. Anything else, including the empty string, is 0.
pub fn parse_work_value(raw: &str) -> f64 {
    if !is_numeric_string(raw) {
        return 0.0;
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => 0.0,
    }
}

fn is_numeric_string(raw: &str) -> bool {
    let unsigned = raw.strip_prefix('-').unwrap_or(raw);
    let (integer, fraction) = match unsigned.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (unsigned, None),
    };
    if !integer.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    match fraction {
        Some(fraction) => !fraction.is_empty() && fraction.bytes().all(|b| b.is_ascii_digit()),
        None => !integer.is_empty(),
    }
}

/// Numeric view of a JSON value as stored by other writers.
pub fn work_from_value(value: &Value) -> f64 {
    match value {
        Value::Number(number) => number.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        Value::String(raw) => parse_work_value(raw),
        _ => 0.0,
    }
}

/// Serde adapter for numeric record fields that may have been written as
/// strings, or not at all.
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(work_from_value).unwrap_or(0.0))
}

/// Rounds `n` to `digits` decimal places.
pub fn round_to(n: f64, digits: u32) -> f64 {
    let multiplier = 10f64.powi(digits as i32);
    (n * multiplier).round() / multiplier
}

/// Keeps the last `:`-separated segment of a reported address, so an
/// IPv4-mapped `::ffff:1.2.3.4` is recorded as `1.2.3.4`.
pub fn strip_port(ip: &str) -> &str {
    ip.rsplit(':').next().unwrap_or(ip)
}

/// The miner part of an `address.workername` identity.
pub fn base_address(worker: &str) -> &str {
    worker.split('.').next().unwrap_or(worker)
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_work_value_accepts_plain_numbers() {
        assert_eq!(parse_work_value("10"), 10.0);
        assert_eq!(parse_work_value("2.5"), 2.5);
        assert_eq!(parse_work_value(".5"), 0.5);
        assert_eq!(parse_work_value("-3"), -3.0);
    }

    #[test]
    fn test_parse_work_value_rejects_everything_else() {
        assert_eq!(parse_work_value(""), 0.0);
        assert_eq!(parse_work_value("-"), 0.0);
        assert_eq!(parse_work_value("1."), 0.0);
        assert_eq!(parse_work_value("1e5"), 0.0);
        assert_eq!(parse_work_value("NaN"), 0.0);
        assert_eq!(parse_work_value("12abc"), 0.0);
        assert_eq!(parse_work_value(" 12"), 0.0);
    }

    #[test]
    fn test_work_from_value() {
        assert_eq!(work_from_value(&json!(12.5)), 12.5);
        assert_eq!(work_from_value(&json!("7")), 7.0);
        assert_eq!(work_from_value(&json!("seven")), 0.0);
        assert_eq!(work_from_value(&json!(null)), 0.0);
        assert_eq!(work_from_value(&json!({ "work": 1 })), 0.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 4), 1.2346);
        assert_eq!(round_to(2.5, 0), 3.0);
    }

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("::ffff:10.0.0.1"), "10.0.0.1");
        assert_eq!(strip_port("10.0.0.1"), "10.0.0.1");
    }

    #[test]
    fn test_base_address() {
        assert_eq!(base_address("abc.rig1"), "abc");
        assert_eq!(base_address("abc"), "abc");
        assert_eq!(base_address(""), "");
    }
}
