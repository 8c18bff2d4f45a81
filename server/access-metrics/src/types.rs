//! Core types for the access-log pipeline (stage inputs, events, JSON contract).

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Parser output
// ---------------------------------------------------------------------------

/// One accepted access-log line with all six base fields typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
  pub timestamp: DateTime<FixedOffset>,
  pub client_address: String,
  pub method: String,
  pub path: String,
  pub status: i64,
  pub bytes_sent: u64,
}

// ---------------------------------------------------------------------------
// Normalizer input (loosely typed)
// ---------------------------------------------------------------------------

/// A raw scalar as handed to the normalizer. Producers other than the line
/// parser (e.g. JSON lines) may supply strings or floats where integers are
/// expected; the normalizer coerces them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
  Int(i64),
  Float(f64),
  Time(DateTime<FixedOffset>),
  Text(String),
}

/// Row candidate handed to the normalizer. `None` means the field is absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub timestamp: Option<RawValue>,
  #[serde(default, alias = "ip", skip_serializing_if = "Option::is_none")]
  pub client_address: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub method: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<RawValue>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub bytes_sent: Option<RawValue>,
}

impl From<ParsedLine> for RawRecord {
  fn from(line: ParsedLine) -> Self {
    Self {
      timestamp: Some(RawValue::Time(line.timestamp)),
      client_address: Some(line.client_address),
      method: Some(line.method),
      path: Some(line.path),
      status: Some(RawValue::Int(line.status)),
      // Byte counts beyond i64 saturate; nothing downstream reads them numerically.
      bytes_sent: Some(RawValue::Int(i64::try_from(line.bytes_sent).unwrap_or(i64::MAX))),
    }
  }
}

impl From<&Event> for RawRecord {
  fn from(e: &Event) -> Self {
    Self {
      timestamp: Some(RawValue::Time(e.timestamp)),
      client_address: Some(e.client_address.clone()),
      method: Some(e.method.clone()),
      path: Some(e.path.clone()),
      status: Some(RawValue::Int(i64::from(e.status))),
      bytes_sent: Some(RawValue::Int(i64::try_from(e.bytes_sent).unwrap_or(i64::MAX))),
    }
  }
}

// ---------------------------------------------------------------------------
// Normalized event
// ---------------------------------------------------------------------------

/// Canonical request event after normalization. Derived fields are computed
/// once by the normalizer and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
  pub timestamp: DateTime<FixedOffset>,
  pub client_address: String,
  pub method: String,
  pub path: String,
  pub status: u16,
  pub bytes_sent: u64,
  /// 404 -> 400, 503 -> 500.
  pub status_class: u16,
  pub is_client_error: bool,
  pub is_server_error: bool,
  pub minute_bucket: DateTime<FixedOffset>,
}

/// Why the normalizer dropped a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
  BadTimestamp,
  BadStatus,
  BadRequest,
  PrivateIp,
  Duplicates,
}

/// Observational summary of one normalization call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleaningReport {
  pub input_count: usize,
  pub output_count: usize,
  pub dropped_count: usize,
  /// Only reasons that actually dropped something are present.
  pub dropped_reasons: BTreeMap<DropReason, usize>,
}

impl CleaningReport {
  pub fn dropped(&self, reason: DropReason) -> usize {
    self.dropped_reasons.get(&reason).copied().unwrap_or(0)
  }
}

// ---------------------------------------------------------------------------
// Output types (JSON contract: what downstream validators read)
// ---------------------------------------------------------------------------

/// One ranked entry: a path or address and how often it occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueCount {
  pub value: String,
  pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Meta {
  pub start_time: String,
  pub end_time: String,
  pub total_requests: u64,
  pub unique_ips: u64,
  pub unique_paths: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MinuteRequests {
  pub minute: String,
  pub requests: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Traffic {
  pub requests_per_minute: Vec<MinuteRequests>,
  pub top_paths_by_volume: Vec<ValueCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallErrors {
  pub total_requests: u64,
  #[serde(rename = "4xx_count")]
  pub count_4xx: u64,
  #[serde(rename = "5xx_count")]
  pub count_5xx: u64,
  #[serde(rename = "4xx_rate")]
  pub rate_4xx: f64,
  #[serde(rename = "5xx_rate")]
  pub rate_5xx: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MinuteErrors {
  pub minute: String,
  pub total: u64,
  #[serde(rename = "4xx")]
  pub count_4xx: u64,
  #[serde(rename = "5xx")]
  pub count_5xx: u64,
}

/// The clock-aligned window with the most server errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeakWindow {
  pub window_start: String,
  pub window_end: String,
  pub total_requests: u64,
  #[serde(rename = "4xx_count")]
  pub count_4xx: u64,
  #[serde(rename = "5xx_count")]
  pub count_5xx: u64,
  #[serde(rename = "5xx_rate")]
  pub rate_5xx: f64,
  pub top_5xx_paths: Vec<ValueCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Errors {
  pub overall: OverallErrors,
  pub errors_per_minute: Vec<MinuteErrors>,
  pub top_5xx_paths: Vec<ValueCount>,
  /// Serialized as `null` when the dataset has no 5xx at all.
  pub peak_5xx_window_5m: Option<PeakWindow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clients {
  pub top_ips_by_requests: Vec<ValueCount>,
  pub top_ips_by_5xx: Vec<ValueCount>,
  pub top_ips_by_4xx: Vec<ValueCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
  pub meta: Meta,
  pub traffic: Traffic,
  pub errors: Errors,
  pub clients: Clients,
}

impl MetricsSummary {
  /// Stable blake3 hex digest of the JSON encoding. Identical input logs
  /// produce identical digests.
  pub fn digest(&self) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(self)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
  }
}
