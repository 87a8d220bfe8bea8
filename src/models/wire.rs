//! # models::wire
//!
//! Validation helpers for the collaborator boundary.
//!
//! The analytics backend is loose about shapes: prices arrive as numbers or
//! numeric strings, timestamps as epoch seconds, epoch millis or ISO strings.
//! Everything is normalised here exactly once so the engine only ever sees
//! total, typed values.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

/// Epoch values above this are treated as milliseconds.
const MILLIS_THRESHOLD: f64 = 1e11;

/// Why a single payload item was rejected.  The rest of the batch is kept.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("expected a JSON object")]
    NotAnObject,
}

/// Reads a finite number from a JSON number or numeric string.
pub fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Like [`number`] but distinguishes "absent / null" from "present but garbage".
pub fn optional_number(
    object: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<f64>, PayloadError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => number(v).map(Some).ok_or_else(|| PayloadError::InvalidField {
            field,
            value: v.to_string(),
        }),
    }
}

/// Required numeric field.
pub fn required_number(object: &Map<String, Value>, field: &'static str) -> Result<f64, PayloadError> {
    optional_number(object, field)?.ok_or(PayloadError::MissingField(field))
}

/// First present, non-empty string among `fields`.
pub fn string_field<'a>(object: &'a Map<String, Value>, fields: &[&str]) -> Option<&'a str> {
    fields
        .iter()
        .filter_map(|f| object.get(*f).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

/// Parses a timestamp from epoch seconds / millis or one of the string forms
/// the backend emits (`RFC 3339`, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD`).
pub fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let raw = n.as_f64()?;
            if !raw.is_finite() {
                return None;
            }
            if raw.abs() >= MILLIS_THRESHOLD {
                Utc.timestamp_millis_opt(raw as i64).single()
            } else {
                Utc.timestamp_opt(raw as i64, 0).single()
            }
        }
        Value::String(s) => parse_datetime(s),
        _ => None,
    }
}

/// String form of [`timestamp`].
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Calendar date from `YYYY-MM-DD` or any timestamp form.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .or_else(|| parse_datetime(raw).map(|dt| dt.date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_number_accepts_numeric_strings_and_rejects_garbage() {
        assert_eq!(number(&json!(1.5)), Some(1.5));
        assert_eq!(number(&json!(" 42 ")), Some(42.0));
        assert_eq!(number(&json!("abc")), None);
        assert_eq!(number(&json!(null)), None);
        assert_eq!(number(&json!("NaN")), None);
    }

    #[test]
    fn test_timestamp_detects_millis() {
        let secs = timestamp(&json!(1_700_000_000)).unwrap();
        let millis = timestamp(&json!(1_700_000_000_000i64)).unwrap();
        assert_eq!(secs, millis);
    }

    #[test]
    fn test_timestamp_parses_string_forms() {
        let a = timestamp(&json!("2024-03-01T12:30:00Z")).unwrap();
        let b = timestamp(&json!("2024-03-01 12:30:00")).unwrap();
        assert_eq!(a, b);
        let day = timestamp(&json!("2024-03-01")).unwrap();
        assert_eq!(day.date_naive(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn test_parse_date_takes_date_part_of_timestamps() {
        assert_eq!(parse_date("2024-03-01T23:59:00Z"), NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(parse_date("not a date"), None);
    }
}
