//! Structured status feed (`GET {api_base}/status`).
//!
//! The feed is a list of `[key, value]` pairs.  `queue` carries a JSON list
//! encoded as a string; the timing fields are numeric strings.

use crate::error::{FeedError, Result};
use crate::fetch::Fetcher;
use onair_proto::protocol::{SourceMode, TrackStatus};
use serde_json::{Map, Value};

#[derive(Clone)]
pub struct StatusClient {
    fetcher: Fetcher,
    url: String,
}

impl StatusClient {
    pub fn new(fetcher: Fetcher, url: String) -> Self {
        Self { fetcher, url }
    }

    pub async fn fetch(&self) -> Result<TrackStatus> {
        let body: Value = self.fetcher.get_json(&self.url).await?;
        decode_status(&body)
    }
}

/// Decode the status payload.  Missing fields fall back to safe defaults;
/// only an undecodable `queue` or a payload of the wrong shape fails.
pub fn decode_status(body: &Value) -> Result<TrackStatus> {
    let fields = key_values(body)?;

    Ok(TrackStatus {
        queue: decode_queue(fields.get("queue"))?,
        source: fields
            .get("source")
            .and_then(Value::as_str)
            .map(SourceMode::from_wire)
            .unwrap_or_default(),
        elapsed_secs: coerce_seconds(fields.get("elapsed")),
        remaining_secs: coerce_seconds(fields.get("remaining")),
        duration_secs: coerce_seconds(fields.get("duration")),
    })
}

/// Accepts the pair-list encoding and, for robustness, a plain object.
fn key_values(body: &Value) -> Result<Map<String, Value>> {
    match body {
        Value::Array(entries) => Ok(entries
            .iter()
            .filter_map(|entry| match entry.as_array().map(Vec::as_slice) {
                Some([Value::String(key), value]) => Some((key.clone(), value.clone())),
                _ => None,
            })
            .collect()),
        Value::Object(map) => Ok(map.clone()),
        other => Err(FeedError::Decode(format!(
            "status: expected key/value pairs, got {}",
            json_kind(other)
        ))),
    }
}

fn decode_queue(raw: Option<&Value>) -> Result<Vec<String>> {
    match raw {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(Vec::new()),
        Some(Value::String(s)) => serde_json::from_str(s)
            .map_err(|e| FeedError::Decode(format!("status: queue: {}", e))),
        Some(value @ Value::Array(_)) => serde_json::from_value(value.clone())
            .map_err(|e| FeedError::Decode(format!("status: queue: {}", e))),
        Some(other) => Err(FeedError::Decode(format!(
            "status: queue: expected encoded list, got {}",
            json_kind(other)
        ))),
    }
}

/// Numbers or numeric strings; anything else, including negative or
/// non-finite values, reads as 0.
pub fn coerce_seconds(raw: Option<&Value>) -> f64 {
    let parsed = match raw {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => 0.0,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
