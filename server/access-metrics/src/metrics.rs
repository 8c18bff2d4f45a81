//! Traffic and error aggregates over a normalized, timestamp-sorted event
//! sequence, including the peak 5xx incident window.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, FixedOffset, TimeDelta};
use tracing::info;

use crate::config::MetricsConfig;
use crate::error::PipelineError;
use crate::rank::{self, top_n};
use crate::types::*;
use crate::window::{self, iso};

/// Round to 6 decimal places, ties to even on the exact binary value.
pub fn round6(x: f64) -> f64 {
  format!("{x:.6}").parse().unwrap_or(x)
}

/// `n / d` rounded to 6 places; a zero denominator yields 0.0.
pub fn rate(n: u64, d: u64) -> f64 {
  if d == 0 {
    0.0
  } else {
    round6(n as f64 / d as f64)
  }
}

/// Per-minute request and error counts.
#[derive(Debug, Clone)]
struct MinuteTally {
  minute: DateTime<FixedOffset>,
  total: u64,
  count_4xx: u64,
  count_5xx: u64,
}

/// Build the full summary. `events` must be sorted by timestamp; ranking
/// tie-breaks follow that order.
pub fn compute_metrics(
  events: &[Event],
  config: &MetricsConfig,
) -> Result<MetricsSummary, PipelineError> {
  if events.is_empty() {
    return Err(PipelineError::empty(
      "metrics requested for an empty event sequence",
    ));
  }

  let minutes = minute_tallies(events);
  let address_totals = rank::totals(events.iter().map(|e| e.client_address.as_str()));

  let summary = MetricsSummary {
    meta: meta(events)?,
    traffic: Traffic {
      requests_per_minute: minutes
        .iter()
        .map(|m| MinuteRequests {
          minute: iso(&m.minute),
          requests: m.total,
        })
        .collect(),
      top_paths_by_volume: top_n(events.iter().map(|e| e.path.as_str()), config.top_n),
    },
    errors: Errors {
      overall: overall_errors(events),
      errors_per_minute: minutes
        .iter()
        .map(|m| MinuteErrors {
          minute: iso(&m.minute),
          total: m.total,
          count_4xx: m.count_4xx,
          count_5xx: m.count_5xx,
        })
        .collect(),
      top_5xx_paths: top_n(
        events
          .iter()
          .filter(|e| e.is_server_error)
          .map(|e| e.path.as_str()),
        config.top_n,
      ),
      peak_5xx_window_5m: peak_window(events, config),
    },
    clients: Clients {
      top_ips_by_requests: top_n(
        events.iter().map(|e| e.client_address.as_str()),
        config.top_n,
      ),
      top_ips_by_5xx: top_eligible_addresses(events, &address_totals, config, |e| {
        e.is_server_error
      }),
      top_ips_by_4xx: top_eligible_addresses(events, &address_totals, config, |e| {
        e.is_client_error
      }),
    },
  };

  match &summary.errors.peak_5xx_window_5m {
    Some(peak) => info!(
      window_start = %peak.window_start,
      count_5xx = peak.count_5xx,
      rate_5xx = peak.rate_5xx,
      "peak 5xx window detected"
    ),
    None => info!("no 5xx responses; no incident window"),
  }

  Ok(summary)
}

fn meta(events: &[Event]) -> Result<Meta, PipelineError> {
  let start = events.iter().map(|e| e.timestamp).min();
  let end = events.iter().map(|e| e.timestamp).max();
  let (start, end) = match (start, end) {
    (Some(s), Some(e)) => (s, e),
    _ => return Err(PipelineError::empty("no timestamps to span")),
  };

  let unique_ips: HashSet<&str> = events.iter().map(|e| e.client_address.as_str()).collect();
  let unique_paths: HashSet<&str> = events.iter().map(|e| e.path.as_str()).collect();

  Ok(Meta {
    start_time: iso(&start),
    end_time: iso(&end),
    total_requests: events.len() as u64,
    unique_ips: unique_ips.len() as u64,
    unique_paths: unique_paths.len() as u64,
  })
}

/// Only minutes that contain data; gaps are omitted, not zero-filled.
fn minute_tallies(events: &[Event]) -> Vec<MinuteTally> {
  let mut by_minute: BTreeMap<i64, MinuteTally> = BTreeMap::new();
  for e in events {
    let tally = by_minute
      .entry(e.minute_bucket.timestamp())
      .or_insert_with(|| MinuteTally {
        minute: e.minute_bucket,
        total: 0,
        count_4xx: 0,
        count_5xx: 0,
      });
    tally.total += 1;
    tally.count_4xx += u64::from(e.is_client_error);
    tally.count_5xx += u64::from(e.is_server_error);
  }
  by_minute.into_values().collect()
}

pub fn overall_errors(events: &[Event]) -> OverallErrors {
  let total = events.len() as u64;
  let count_4xx = events.iter().filter(|e| e.is_client_error).count() as u64;
  let count_5xx = events.iter().filter(|e| e.is_server_error).count() as u64;
  OverallErrors {
    total_requests: total,
    count_4xx,
    count_5xx,
    rate_4xx: rate(count_4xx, total),
    rate_5xx: rate(count_5xx, total),
  }
}

/// Rank addresses with at least `min_requests` total requests by how many of
/// their events match `pred`.
fn top_eligible_addresses<F>(
  events: &[Event],
  totals: &HashMap<&str, u64>,
  config: &MetricsConfig,
  pred: F,
) -> Vec<ValueCount>
where
  F: Fn(&Event) -> bool,
{
  let eligible = |addr: &str| totals.get(addr).copied().unwrap_or(0) >= config.min_requests;
  top_n(
    events
      .iter()
      .filter(|e| pred(*e) && eligible(e.client_address.as_str()))
      .map(|e| e.client_address.as_str()),
    config.top_n,
  )
}

/// The clock-aligned window with the most 5xx; the earliest wins ties.
/// `None` when the dataset has no 5xx.
pub fn peak_window(events: &[Event], config: &MetricsConfig) -> Option<PeakWindow> {
  let window_secs = config.window_minutes.max(1) * window::MINUTE_SECS;

  let mut per_window: BTreeMap<i64, u64> = BTreeMap::new();
  for e in events.iter().filter(|e| e.is_server_error) {
    *per_window
      .entry(window::window_key(&e.timestamp, window_secs))
      .or_insert(0) += 1;
  }

  // Ascending iteration + strict comparison keeps the earliest maximum.
  let mut best: Option<(i64, u64)> = None;
  for (&start, &count) in &per_window {
    if best.map_or(true, |(_, top)| count > top) {
      best = Some((start, count));
    }
  }
  let (peak_key, _) = best?;

  let in_window: Vec<&Event> = events
    .iter()
    .filter(|e| window::window_key(&e.timestamp, window_secs) == peak_key)
    .collect();
  let anchor = in_window.first()?;
  let window_start = window::floor_to(&anchor.timestamp, window_secs);
  let window_end = window_start + TimeDelta::seconds(window_secs);

  let total = in_window.len() as u64;
  let count_4xx = in_window.iter().filter(|e| e.is_client_error).count() as u64;
  let count_5xx = in_window.iter().filter(|e| e.is_server_error).count() as u64;

  Some(PeakWindow {
    window_start: iso(&window_start),
    window_end: iso(&window_end),
    total_requests: total,
    count_4xx,
    count_5xx,
    rate_5xx: rate(count_5xx, total),
    top_5xx_paths: top_n(
      in_window
        .iter()
        .filter(|e| e.is_server_error)
        .map(|e| e.path.as_str()),
      config.window_top_paths,
    ),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::NormalizeConfig;
  use crate::normalize::normalize;

  fn events(rows: &[(&str, &str, &str, i64)]) -> Vec<Event> {
    let records: Vec<RawRecord> = rows
      .iter()
      .map(|(ts, ip, path, status)| RawRecord {
        timestamp: Some(RawValue::Text(ts.to_string())),
        client_address: Some(ip.to_string()),
        method: Some("GET".into()),
        path: Some(path.to_string()),
        status: Some(RawValue::Int(*status)),
        bytes_sent: Some(RawValue::Int(1)),
      })
      .collect();
    normalize(&records, &NormalizeConfig::default()).unwrap().0
  }

  #[test]
  fn rounding_and_division_guard() {
    assert_eq!(rate(0, 0), 0.0);
    assert_eq!(rate(1, 3), 0.333333);
    assert_eq!(rate(2, 3), 0.666667);
    assert_eq!(rate(4, 10), 0.4);
    // Exact binary ties go to the even digit.
    assert_eq!(rate(1, 128), 0.007812);
    assert_eq!(rate(5, 128), 0.039062);
    assert_eq!(rate(3, 128), 0.023438);
    assert_eq!(rate(7, 7), 1.0);
  }

  #[test]
  fn empty_input_is_fatal() {
    let err = compute_metrics(&[], &MetricsConfig::default()).unwrap_err();
    assert!(matches!(err, PipelineError::EmptyResult(_)));
  }

  #[test]
  fn minute_series_omits_gaps() {
    let ev = events(&[
      ("2026-01-17T13:40:05Z", "a", "/", 200),
      ("2026-01-17T13:40:50Z", "a", "/", 404),
      ("2026-01-17T13:43:00Z", "a", "/", 500),
    ]);
    let s = compute_metrics(&ev, &MetricsConfig::default()).unwrap();
    let rpm = &s.traffic.requests_per_minute;
    assert_eq!(rpm.len(), 2);
    assert_eq!(rpm[0].minute, "2026-01-17T13:40:00+00:00");
    assert_eq!(rpm[0].requests, 2);
    assert_eq!(rpm[1].minute, "2026-01-17T13:43:00+00:00");

    let epm = &s.errors.errors_per_minute;
    assert_eq!((epm[0].total, epm[0].count_4xx, epm[0].count_5xx), (2, 1, 0));
    assert_eq!((epm[1].total, epm[1].count_4xx, epm[1].count_5xx), (1, 0, 1));
  }

  #[test]
  fn meta_spans_dataset() {
    let ev = events(&[
      ("2026-01-17T13:40:05Z", "a", "/x", 200),
      ("2026-01-17T13:49:00Z", "b", "/y", 200),
      ("2026-01-17T13:45:00Z", "a", "/x", 200),
    ]);
    let s = compute_metrics(&ev, &MetricsConfig::default()).unwrap();
    assert_eq!(s.meta.start_time, "2026-01-17T13:40:05+00:00");
    assert_eq!(s.meta.end_time, "2026-01-17T13:49:00+00:00");
    assert_eq!(s.meta.total_requests, 3);
    assert_eq!(s.meta.unique_ips, 2);
    assert_eq!(s.meta.unique_paths, 2);
  }

  #[test]
  fn no_server_errors_means_no_peak() {
    let ev = events(&[
      ("2026-01-17T13:40:05Z", "a", "/", 200),
      ("2026-01-17T13:41:05Z", "a", "/", 404),
    ]);
    let s = compute_metrics(&ev, &MetricsConfig::default()).unwrap();
    assert!(s.errors.peak_5xx_window_5m.is_none());
    assert_eq!(s.errors.overall.rate_5xx, 0.0);
    assert!(s.errors.top_5xx_paths.is_empty());
    let json = serde_json::to_value(&s).unwrap();
    assert!(json["errors"]["peak_5xx_window_5m"].is_null());
  }

  #[test]
  fn peak_prefers_count_over_rate() {
    let mut rows: Vec<(String, &str, &str, i64)> = Vec::new();
    // 13:00 window: 50 requests, one 5xx.
    for i in 0..50 {
      let status = if i == 0 { 500 } else { 200 };
      rows.push((format!("2026-01-17T13:0{}:{:02}Z", i % 5, i), "a", "/", status));
    }
    // 13:10 window: 5 requests, three 5xx.
    for i in 0..5 {
      let status = if i < 3 { 503 } else { 200 };
      rows.push((format!("2026-01-17T13:1{i}:00Z"), "b", "/pay", status));
    }
    let borrowed: Vec<(&str, &str, &str, i64)> =
      rows.iter().map(|(t, ip, p, s)| (t.as_str(), *ip, *p, *s)).collect();
    let peak = peak_window(&events(&borrowed), &MetricsConfig::default()).unwrap();
    assert_eq!(peak.window_start, "2026-01-17T13:10:00+00:00");
    assert_eq!(peak.window_end, "2026-01-17T13:15:00+00:00");
    assert_eq!(peak.total_requests, 5);
    assert_eq!(peak.count_5xx, 3);
    assert_eq!(peak.rate_5xx, 0.6);
  }

  #[test]
  fn peak_tie_picks_earliest_window() {
    let ev = events(&[
      ("2026-01-17T13:21:00Z", "a", "/late", 500),
      ("2026-01-17T13:22:00Z", "a", "/late", 500),
      ("2026-01-17T13:06:00Z", "a", "/early", 502),
      ("2026-01-17T13:07:00Z", "a", "/early", 502),
    ]);
    let peak = peak_window(&ev, &MetricsConfig::default()).unwrap();
    assert_eq!(peak.window_start, "2026-01-17T13:05:00+00:00");
    assert_eq!(peak.top_5xx_paths[0].value, "/early");
  }

  #[test]
  fn window_end_is_bound_not_event() {
    let ev = events(&[("2026-01-17T13:01:00Z", "a", "/", 500)]);
    let peak = peak_window(&ev, &MetricsConfig::default()).unwrap();
    assert_eq!(peak.window_start, "2026-01-17T13:00:00+00:00");
    assert_eq!(peak.window_end, "2026-01-17T13:05:00+00:00");
  }

  #[test]
  fn eligibility_threshold_filters_noise() {
    let mut rows: Vec<(String, &str, &str, i64)> = Vec::new();
    // "busy" makes 20 requests, 2 of them 5xx; "noisy" makes 1 request, a 5xx.
    for i in 0..20 {
      let status = if i < 2 { 500 } else { 200 };
      rows.push((format!("2026-01-17T13:00:{i:02}Z"), "busy", "/", status));
    }
    rows.push(("2026-01-17T12:59:00Z".into(), "noisy", "/", 500));
    let borrowed: Vec<(&str, &str, &str, i64)> =
      rows.iter().map(|(t, ip, p, s)| (t.as_str(), *ip, *p, *s)).collect();
    let s = compute_metrics(&events(&borrowed), &MetricsConfig::default()).unwrap();
    assert_eq!(s.clients.top_ips_by_5xx.len(), 1);
    assert_eq!(s.clients.top_ips_by_5xx[0].value, "busy");
    assert_eq!(s.clients.top_ips_by_5xx[0].count, 2);
    assert!(s.clients.top_ips_by_4xx.is_empty());
    assert_eq!(s.clients.top_ips_by_requests[0].value, "busy");

    let lenient = MetricsConfig {
      min_requests: 1,
      ..MetricsConfig::default()
    };
    let s = compute_metrics(&events(&borrowed), &lenient).unwrap();
    assert_eq!(s.clients.top_ips_by_5xx.len(), 2);
  }
}
