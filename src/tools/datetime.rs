//! Date and time tools.

use std::fmt::{Display, Write};

use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::{json, Value};

use super::{arg_str, Tool};
use crate::sandbox::Sandbox;

pub const DEFAULT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn format_property() -> Value {
    json!({
        "type": "string",
        "description": "strftime-style format string (default: \"%Y-%m-%d %H:%M:%S\")"
    })
}

fn timezone_property() -> Value {
    json!({
        "type": "string",
        "description": "IANA timezone name such as \"Europe/Paris\" or \"UTC\" (default: local time)"
    })
}

/// Current date and time.
pub struct CurrentDatetime;

#[async_trait]
impl Tool for CurrentDatetime {
    fn name(&self) -> &str {
        "get_current_datetime"
    }

    fn description(&self) -> &str {
        "Get the current date and time as a formatted string. Use this to anchor research to today's date."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "output_format": format_property(),
                "timezone": timezone_property()
            }
        })
    }

    async fn execute(&self, args: Value, _sandbox: &Sandbox) -> anyhow::Result<String> {
        let format = arg_str(&args, "output_format").unwrap_or(DEFAULT_FORMAT);
        render(Utc::now(), format, arg_str(&args, "timezone"))
    }
}

/// Current Unix time.
pub struct CurrentTimestamp;

#[async_trait]
impl Tool for CurrentTimestamp {
    fn name(&self) -> &str {
        "get_current_timestamp"
    }

    fn description(&self) -> &str {
        "Get the current Unix timestamp in seconds (with fractional part)."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value, _sandbox: &Sandbox) -> anyhow::Result<String> {
        let micros = Utc::now().timestamp_micros();
        Ok((micros as f64 / 1_000_000.0).to_string())
    }
}

/// Unix timestamp to formatted date.
pub struct ConvertTimestamp;

#[async_trait]
impl Tool for ConvertTimestamp {
    fn name(&self) -> &str {
        "convert_timestamp_to_datetime"
    }

    fn description(&self) -> &str {
        "Convert a Unix timestamp (seconds) into a formatted date and time string."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "timestamp": {
                    "type": "number",
                    "description": "Unix timestamp in seconds"
                },
                "output_format": format_property(),
                "timezone": timezone_property()
            },
            "required": ["timestamp"]
        })
    }

    async fn execute(&self, args: Value, _sandbox: &Sandbox) -> anyhow::Result<String> {
        let timestamp = match &args["timestamp"] {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
        .ok_or_else(|| anyhow::anyhow!("Missing or non-numeric 'timestamp' argument"))?;

        let format = arg_str(&args, "output_format").unwrap_or(DEFAULT_FORMAT);
        render(from_unix(timestamp)?, format, arg_str(&args, "timezone"))
    }
}

fn from_unix(timestamp: f64) -> anyhow::Result<DateTime<Utc>> {
    if !timestamp.is_finite() {
        anyhow::bail!("Timestamp must be a finite number");
    }
    let secs = timestamp.floor();
    let nanos = (((timestamp - secs) * 1e9).round() as u32).min(999_999_999);
    if secs < i64::MIN as f64 || secs > i64::MAX as f64 {
        anyhow::bail!("Timestamp {} is out of range", timestamp);
    }
    DateTime::from_timestamp(secs as i64, nanos)
        .ok_or_else(|| anyhow::anyhow!("Timestamp {} is out of range", timestamp))
}

/// Format `instant` in `timezone` (local time when absent).
fn render(instant: DateTime<Utc>, format: &str, timezone: Option<&str>) -> anyhow::Result<String> {
    let items = parse_format(format)?;
    match timezone {
        Some(name) => {
            let tz: Tz = name
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Unknown timezone '{}'", name))?;
            write_formatted(&instant.with_timezone(&tz), &items)
        }
        None => write_formatted(&instant.with_timezone(&Local), &items),
    }
}

/// Reject unknown specifiers up front; chrono would otherwise fail at
/// display time.
fn parse_format(format: &str) -> anyhow::Result<Vec<Item<'_>>> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        anyhow::bail!("Invalid format string '{}'", format);
    }
    Ok(items)
}

fn write_formatted<Z>(dt: &DateTime<Z>, items: &[Item<'_>]) -> anyhow::Result<String>
where
    Z: TimeZone,
    Z::Offset: Display,
{
    let mut out = String::new();
    write!(out, "{}", dt.format_with_items(items.iter()))
        .map_err(|_| anyhow::anyhow!("Could not format date with the given format string"))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> (tempfile::TempDir, Sandbox) {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::open(dir.path()).unwrap();
        (dir, sandbox)
    }

    #[tokio::test]
    async fn converts_timestamps_in_a_timezone() {
        let (_dir, sandbox) = sandbox();
        let out = ConvertTimestamp
            .execute(json!({"timestamp": 0, "timezone": "UTC"}), &sandbox)
            .await
            .unwrap();
        assert_eq!(out, "1970-01-01 00:00:00");

        let out = ConvertTimestamp
            .execute(
                json!({
                    "timestamp": "1700000000.5",
                    "output_format": "%Y-%m-%dT%H:%M:%S%.3f %Z",
                    "timezone": "Asia/Tokyo"
                }),
                &sandbox,
            )
            .await
            .unwrap();
        assert_eq!(out, "2023-11-15T07:13:20.500 JST");
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let (_dir, sandbox) = sandbox();
        let err = CurrentDatetime
            .execute(json!({"output_format": "%Q"}), &sandbox)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid format string"));

        let err = CurrentDatetime
            .execute(json!({"timezone": "Mars/Olympus"}), &sandbox)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown timezone"));

        assert!(ConvertTimestamp
            .execute(json!({"timestamp": "soon"}), &sandbox)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn current_values_are_sane() {
        let (_dir, sandbox) = sandbox();
        let out = CurrentDatetime
            .execute(json!({"output_format": "%Y", "timezone": "UTC"}), &sandbox)
            .await
            .unwrap();
        assert_eq!(out, Utc::now().format("%Y").to_string());

        let ts: f64 = CurrentTimestamp
            .execute(json!({}), &sandbox)
            .await
            .unwrap()
            .parse()
            .unwrap();
        assert!((ts - Utc::now().timestamp() as f64).abs() < 5.0);
    }
}
