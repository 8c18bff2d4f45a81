//! Normalize raw row candidates into canonical, sorted, deduplicated Events.
//!
//! Row-level problems are tallied into the CleaningReport and never raised;
//! only a structurally missing field fails the call.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, NaiveDateTime};
use tracing::{info, warn};

use crate::config::{AssumedZone, NormalizeConfig};
use crate::error::PipelineError;
use crate::parser::TIME_LOCAL_FORMAT;
use crate::types::*;
use crate::window;

pub const REQUIRED_FIELDS: [&str; 6] = [
  "timestamp",
  "client_address",
  "method",
  "path",
  "status",
  "bytes_sent",
];

/// Timestamp layouts that carry their own offset.
const AWARE_FORMATS: [&str; 2] = [TIME_LOCAL_FORMAT, "%Y-%m-%d %H:%M:%S%.f%:z"];

/// Layouts without an offset; localized with the assumed zone.
const NAIVE_FORMATS: [&str; 3] = [
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%d %H:%M:%S%.f",
  "%d/%b/%Y:%H:%M:%S",
];

/// Typed row between coercion and derivation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Row {
  timestamp: DateTime<FixedOffset>,
  client_address: String,
  method: String,
  path: String,
  status: u16,
  bytes_sent: u64,
}

/// Normalize a batch of row candidates.
pub fn normalize(
  records: &[RawRecord],
  config: &NormalizeConfig,
) -> Result<(Vec<Event>, CleaningReport), PipelineError> {
  check_schema(records)?;

  let mut report = CleaningReport {
    input_count: records.len(),
    ..CleaningReport::default()
  };

  // Coerce + reject, first failing reason wins.
  let mut rows: Vec<Row> = Vec::with_capacity(records.len());
  for rec in records {
    match coerce_row(rec, config) {
      Ok(row) => rows.push(row),
      Err(reason) => tally(&mut report, reason),
    }
  }

  if config.drop_private_ips {
    rows.retain(|row| {
      let private = is_private_address(&row.client_address);
      if private {
        tally(&mut report, DropReason::PrivateIp);
      }
      !private
    });
  }

  // Exact duplicates across all six base fields; first occurrence wins.
  let mut seen: HashSet<Row> = HashSet::with_capacity(rows.len());
  rows.retain(|row| {
    let fresh = seen.insert(row.clone());
    if !fresh {
      tally(&mut report, DropReason::Duplicates);
    }
    fresh
  });

  let mut events: Vec<Event> = rows.into_iter().map(derive).collect();
  // Stable: equal timestamps keep input order.
  events.sort_by_key(|e| e.timestamp);

  report.output_count = events.len();
  report.dropped_count = report.input_count - report.output_count;

  if report.dropped_count > 0 {
    warn!(
      dropped = report.dropped_count,
      reasons = ?report.dropped_reasons,
      "normalizer dropped rows"
    );
  }
  info!(
    input = report.input_count,
    output = report.output_count,
    "normalized events"
  );

  Ok((events, report))
}

fn tally(report: &mut CleaningReport, reason: DropReason) {
  *report.dropped_reasons.entry(reason).or_insert(0) += 1;
}

/// Fail when a required field is absent from every row of a non-empty batch.
fn check_schema(records: &[RawRecord]) -> Result<(), PipelineError> {
  if records.is_empty() {
    return Ok(());
  }
  let missing: Vec<String> = REQUIRED_FIELDS
    .iter()
    .filter(|field| records.iter().all(|r| !has_field(r, field)))
    .map(|field| field.to_string())
    .collect();
  if missing.is_empty() {
    Ok(())
  } else {
    Err(PipelineError::SchemaViolation { missing })
  }
}

fn has_field(rec: &RawRecord, field: &str) -> bool {
  match field {
    "timestamp" => rec.timestamp.is_some(),
    "client_address" => rec.client_address.is_some(),
    "method" => rec.method.is_some(),
    "path" => rec.path.is_some(),
    "status" => rec.status.is_some(),
    "bytes_sent" => rec.bytes_sent.is_some(),
    _ => false,
  }
}

fn coerce_row(rec: &RawRecord, config: &NormalizeConfig) -> Result<Row, DropReason> {
  let timestamp = rec
    .timestamp
    .as_ref()
    .and_then(|v| coerce_timestamp(v, &config.assume_tz))
    .ok_or(DropReason::BadTimestamp)?;

  let status = rec
    .status
    .as_ref()
    .and_then(coerce_status)
    .ok_or(DropReason::BadStatus)?;

  let client_address = trimmed(rec.client_address.as_deref());
  let method = trimmed(rec.method.as_deref());
  let path = trimmed(rec.path.as_deref());
  // "None" is what an upstream parse miss leaves behind.
  if method.is_empty() || path.is_empty() || path == "None" {
    return Err(DropReason::BadRequest);
  }

  Ok(Row {
    timestamp,
    client_address,
    method,
    path,
    status,
    bytes_sent: rec.bytes_sent.as_ref().and_then(coerce_bytes).unwrap_or(0),
  })
}

fn trimmed(s: Option<&str>) -> String {
  s.map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Parse a raw timestamp; offset-less values are localized in `assume`.
pub fn coerce_timestamp(value: &RawValue, assume: &AssumedZone) -> Option<DateTime<FixedOffset>> {
  let s = match value {
    RawValue::Time(ts) => return Some(*ts),
    RawValue::Text(s) => s.trim(),
    RawValue::Int(_) | RawValue::Float(_) => return None,
  };

  if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
    return Some(ts);
  }
  for fmt in AWARE_FORMATS {
    if let Ok(ts) = DateTime::parse_from_str(s, fmt) {
      return Some(ts);
    }
  }
  NAIVE_FORMATS
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    .and_then(|naive| assume.localize(&naive))
}

fn coerce_status(value: &RawValue) -> Option<u16> {
  coerce_integer(value).and_then(|n| u16::try_from(n).ok())
}

fn coerce_bytes(value: &RawValue) -> Option<u64> {
  coerce_integer(value).and_then(|n| u64::try_from(n).ok())
}

/// Integers, integral floats, and numeric strings.
fn coerce_integer(value: &RawValue) -> Option<i64> {
  match value {
    RawValue::Int(n) => Some(*n),
    RawValue::Float(f) => integral(*f),
    RawValue::Text(s) => {
      let s = s.trim();
      s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().and_then(integral))
    }
    RawValue::Time(_) => None,
  }
}

fn integral(f: f64) -> Option<i64> {
  if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
    Some(f as i64)
  } else {
    None
  }
}

/// Prefix heuristic for 10/8, 192.168/16 and 172.16/12.
pub fn is_private_address(addr: &str) -> bool {
  if addr.starts_with("10.") || addr.starts_with("192.168.") {
    return true;
  }
  addr
    .strip_prefix("172.")
    .and_then(|rest| rest.split('.').next())
    .and_then(|octet| octet.parse::<u8>().ok())
    .is_some_and(|octet| (16..=31).contains(&octet))
}

fn derive(row: Row) -> Event {
  let status = row.status;
  Event {
    minute_bucket: window::minute_bucket(&row.timestamp),
    timestamp: row.timestamp,
    client_address: row.client_address,
    method: row.method,
    path: row.path,
    status,
    bytes_sent: row.bytes_sent,
    status_class: (status / 100) * 100,
    is_client_error: (400..500).contains(&status),
    is_server_error: (500..600).contains(&status),
  }
}
