//! Line parsers: combined access logs and JSON-lines row dumps.
//!
//! Access-log grammar: `<ip> <ignored> <ignored> [<time_local>] "<request>" <status> <bytes>`
//! with anything after `<bytes>` (referer, user agent) ignored. Parsing a line
//! is pure; the file-level driver counts malformed lines and aborts once the
//! configured threshold is exceeded.

use std::collections::BTreeMap;
use std::io::BufRead;

use chrono::{DateTime, FixedOffset};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ParseConfig;
use crate::error::PipelineError;
use crate::types::{ParsedLine, RawRecord};

/// `time_local` as written by nginx/apache: `17/Jan/2026:13:42:10 -0500`.
pub const TIME_LOCAL_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

static LINE_RE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r#"^(?P<ip>\S+)\s+\S+\s+\S+\s+\[(?P<time>[^\]]+)\]\s+"(?P<request>[^"]*)"\s+(?P<status>\S+)\s+(?P<bytes>\S+)"#,
  )
  .expect("access log regex is valid")
});

/// Why a non-blank line was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedKind {
  NoMatch,
  BadTimestamp,
  BadRequest,
  BadStatus,
  BadBytes,
  /// JSON-lines input: not a JSON object with row fields.
  BadJson,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
  /// Whitespace-only line; skipped without counting.
  Blank,
  Record(ParsedLine),
  Malformed(MalformedKind),
}

/// Line-level counters for one parse run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
  pub total_lines: usize,
  pub blank_lines: usize,
  pub accepted: usize,
  pub malformed: usize,
  pub malformed_by_kind: BTreeMap<MalformedKind, usize>,
}

#[derive(Debug, Clone)]
pub struct ParseOutput {
  /// Accepted lines in file order.
  pub records: Vec<ParsedLine>,
  pub stats: ParseStats,
}

/// Parse one raw line.
pub fn parse_line(line: &str) -> LineOutcome {
  let line = line.trim();
  if line.is_empty() {
    return LineOutcome::Blank;
  }

  let caps = match LINE_RE.captures(line) {
    Some(c) => c,
    None => return LineOutcome::Malformed(MalformedKind::NoMatch),
  };

  let timestamp = match parse_time_local(&caps["time"]) {
    Some(ts) => ts,
    None => return LineOutcome::Malformed(MalformedKind::BadTimestamp),
  };

  let (method, path) = match parse_request(&caps["request"]) {
    Some(mp) => mp,
    None => return LineOutcome::Malformed(MalformedKind::BadRequest),
  };

  let status: i64 = match caps["status"].parse() {
    Ok(s) => s,
    Err(_) => return LineOutcome::Malformed(MalformedKind::BadStatus),
  };

  let bytes_sent = match parse_bytes(&caps["bytes"]) {
    Some(b) => b,
    None => return LineOutcome::Malformed(MalformedKind::BadBytes),
  };

  LineOutcome::Record(ParsedLine {
    timestamp,
    client_address: caps["ip"].to_string(),
    method,
    path,
    status,
    bytes_sent,
  })
}

/// Parse `time_local`, preserving the offset written in the log.
pub fn parse_time_local(s: &str) -> Option<DateTime<FixedOffset>> {
  DateTime::parse_from_str(s.trim(), TIME_LOCAL_FORMAT).ok()
}

/// `GET /api/login HTTP/1.1` -> (method, path). The protocol is optional.
fn parse_request(request: &str) -> Option<(String, String)> {
  let mut parts = request.split_whitespace();
  let method = parts.next()?;
  let path = parts.next()?;
  Some((method.to_string(), path.to_string()))
}

/// Non-negative byte count; `-` (no body) is zero.
fn parse_bytes(s: &str) -> Option<u64> {
  if s == "-" {
    return Some(0);
  }
  if !s.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  s.parse().ok()
}

/// Per-line verdict inside the shared reader loop.
enum Scan<T> {
  Blank,
  Keep(T),
  Reject(MalformedKind),
}

/// Read `reader` line by line, classify each line, and enforce the
/// malformed-line threshold. Invalid UTF-8 is replaced rather than rejected.
fn scan<R, T, F>(
  mut reader: R,
  config: &ParseConfig,
  classify: F,
) -> Result<(Vec<T>, ParseStats), PipelineError>
where
  R: BufRead,
  F: Fn(&str) -> Scan<T>,
{
  let mut kept = Vec::new();
  let mut stats = ParseStats::default();
  let mut buf = Vec::new();

  loop {
    buf.clear();
    if reader.read_until(b'\n', &mut buf)? == 0 {
      break;
    }
    stats.total_lines += 1;
    let line_no = stats.total_lines;
    let text = String::from_utf8_lossy(&buf);

    match classify(&text) {
      Scan::Blank => stats.blank_lines += 1,
      Scan::Keep(item) => {
        stats.accepted += 1;
        kept.push(item);
      }
      Scan::Reject(kind) => {
        stats.malformed += 1;
        *stats.malformed_by_kind.entry(kind).or_insert(0) += 1;
        debug!(line_no, ?kind, "skipping malformed line");
        if stats.malformed > config.max_bad_lines {
          return Err(PipelineError::parse_abort(
            config.max_bad_lines,
            stats.malformed,
            line_no,
            text.trim(),
          ));
        }
      }
    }
  }

  info!(
    total = stats.total_lines,
    accepted = stats.accepted,
    malformed = stats.malformed,
    blank = stats.blank_lines,
    "parsed input"
  );

  if kept.is_empty() {
    return Err(PipelineError::empty(format!(
      "no parseable log lines ({} lines read, {} malformed)",
      stats.total_lines, stats.malformed
    )));
  }

  Ok((kept, stats))
}

/// Parse a whole access log.
///
/// Fails with `ParseAbort` once malformed lines exceed `max_bad_lines`, and
/// with `EmptyResult` when no line is accepted.
pub fn parse_reader<R: BufRead>(
  reader: R,
  config: &ParseConfig,
) -> Result<ParseOutput, PipelineError> {
  let (records, stats) = scan(reader, config, |line| match parse_line(line) {
    LineOutcome::Blank => Scan::Blank,
    LineOutcome::Record(rec) => Scan::Keep(rec),
    LineOutcome::Malformed(kind) => Scan::Reject(kind),
  })?;
  Ok(ParseOutput { records, stats })
}

/// Convenience wrapper over [`parse_reader`] for in-memory text.
pub fn parse_str(text: &str, config: &ParseConfig) -> Result<ParseOutput, PipelineError> {
  parse_reader(text.as_bytes(), config)
}

/// Decode one JSON-lines row. Field values stay loosely typed; the
/// normalizer does the coercion.
pub fn parse_json_row(line: &str) -> Option<RawRecord> {
  serde_json::from_str(line.trim()).ok()
}

/// Parse a JSON-lines dump (one row object per line) into row candidates.
///
/// Same threshold and empty-input rules as [`parse_reader`]; lines that are
/// not a JSON object count as `bad_json`.
pub fn parse_json_lines<R: BufRead>(
  reader: R,
  config: &ParseConfig,
) -> Result<(Vec<RawRecord>, ParseStats), PipelineError> {
  scan(reader, config, |line| {
    if line.trim().is_empty() {
      return Scan::Blank;
    }
    match parse_json_row(line) {
      Some(rec) => Scan::Keep(rec),
      None => Scan::Reject(MalformedKind::BadJson),
    }
  })
}
