//! Tolerant decoders for state files that may be hand-edited or written by
//! older releases. Each helper accepts any JSON value and degrades to the
//! neutral value (`0`, `None`, `""`) instead of failing the whole document.
//!
//! Use with `#[serde(default, deserialize_with = "lenient::count")]`.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub fn count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_u64(&value).min(u64::from(u32::MAX)) as u32)
}

pub fn millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_u64(&value))
}

pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_datetime(&value))
}

pub fn epoch_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_epoch_millis(&value))
}

pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Non-negative integer view of a JSON value; fractions round to nearest.
pub fn value_to_u64(value: &Value) -> u64 {
    let float = match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                return v;
            }
            n.as_f64()
        }
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    float
        .filter(|f| f.is_finite() && *f > 0.0)
        .map(|f| f.round() as u64)
        .unwrap_or(0)
}

/// RFC 3339 strings and epoch-millisecond numbers are both accepted.
pub fn value_to_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) if !s.trim().is_empty() => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(_) => {
            value_to_epoch_millis(value).and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        }
        _ => None,
    }
}

pub fn value_to_epoch_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed.parse::<i64>().ok().or_else(|| {
                DateTime::parse_from_rfc3339(trimmed)
                    .ok()
                    .map(|dt| dt.timestamp_millis())
            })
        }
        _ => None,
    }
}
