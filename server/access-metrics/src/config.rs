//! Pipeline configuration with sane defaults.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, Utc};
use chrono_tz::Tz;

use crate::error::PipelineError;

/// What the input stream contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputFormat {
  /// Combined-format access log lines.
  #[default]
  AccessLog,
  /// One JSON row object per line (`timestamp`, `ip`, `method`, ...).
  JsonLines,
}

impl FromStr for InputFormat {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "access_log" | "access-log" | "combined" | "nginx" => Ok(InputFormat::AccessLog),
      "jsonl" | "json" | "json_lines" | "ndjson" => Ok(InputFormat::JsonLines),
      other => Err(format!("unknown input format: {other}")),
    }
  }
}

/// Line parser tunables.
#[derive(Debug, Clone)]
pub struct ParseConfig {
  /// Malformed lines tolerated before the whole parse fails.
  pub max_bad_lines: usize,
  pub input: InputFormat,
}

impl Default for ParseConfig {
  fn default() -> Self {
    Self {
      max_bad_lines: 200,
      input: InputFormat::AccessLog,
    }
  }
}

/// Zone used to localize timestamps that arrive without an offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssumedZone {
  Fixed(FixedOffset),
  /// IANA zone; the offset follows DST for each timestamp.
  Named(Tz),
}

impl Default for AssumedZone {
  fn default() -> Self {
    AssumedZone::Fixed(Utc.fix())
  }
}

impl AssumedZone {
  /// Attach this zone to a wall-clock time. Ambiguous (fall-back) times take
  /// the earlier instant; times skipped by a spring-forward gap are `None`.
  pub fn localize(&self, naive: &NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    match self {
      AssumedZone::Fixed(offset) => naive.and_local_timezone(*offset).earliest(),
      AssumedZone::Named(tz) => naive
        .and_local_timezone(*tz)
        .earliest()
        .map(|dt| dt.fixed_offset()),
    }
  }
}

impl FromStr for AssumedZone {
  type Err = String;

  /// `Z`, `UTC`, `+HH:MM`/`-HHMM`, or an IANA name like `America/New_York`.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
      return Ok(AssumedZone::Fixed(Utc.fix()));
    }
    if let Ok(offset) = s.parse::<FixedOffset>() {
      return Ok(AssumedZone::Fixed(offset));
    }
    s.parse::<Tz>()
      .map(AssumedZone::Named)
      .map_err(|_| format!("unknown timezone or offset {s:?}"))
  }
}

/// Normalizer tunables.
#[derive(Debug, Clone, Default)]
pub struct NormalizeConfig {
  pub assume_tz: AssumedZone,
  /// Drop 10/8, 172.16/12 and 192.168/16 client addresses.
  pub drop_private_ips: bool,
}

/// Metrics engine tunables.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
  /// Entries kept in every dataset-wide top-N ranking.
  pub top_n: usize,
  /// Entries kept in the incident window's failing-path ranking.
  pub window_top_paths: usize,
  /// Requests an address needs before it is ranked by 4xx/5xx.
  pub min_requests: u64,
  /// Width of the clock-aligned incident window.
  pub window_minutes: i64,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      top_n: 10,
      window_top_paths: 5,
      min_requests: 20,
      window_minutes: 5,
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct Config {
  pub parse: ParseConfig,
  pub normalize: NormalizeConfig,
  pub metrics: MetricsConfig,
}

pub const ENV_MAX_BAD_LINES: &str = "ACCESS_METRICS_MAX_BAD_LINES";
pub const ENV_INPUT_FORMAT: &str = "ACCESS_METRICS_INPUT_FORMAT";
pub const ENV_ASSUME_TZ: &str = "ACCESS_METRICS_ASSUME_TZ";
pub const ENV_DROP_PRIVATE_IPS: &str = "ACCESS_METRICS_DROP_PRIVATE_IPS";
pub const ENV_TOP_N: &str = "ACCESS_METRICS_TOP_N";
pub const ENV_MIN_REQUESTS: &str = "ACCESS_METRICS_MIN_REQUESTS";

impl Config {
  /// Defaults overlaid with `ACCESS_METRICS_*` environment variables.
  pub fn from_env() -> Result<Self, PipelineError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Same as [`Config::from_env`] but reads values through `lookup`.
  pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut config = Config::default();

    if let Some(v) = lookup(ENV_MAX_BAD_LINES) {
      config.parse.max_bad_lines = parse_number(ENV_MAX_BAD_LINES, &v)?;
    }
    if let Some(v) = lookup(ENV_INPUT_FORMAT) {
      config.parse.input = v
        .parse()
        .map_err(|reason: String| PipelineError::config(ENV_INPUT_FORMAT, reason))?;
    }
    if let Some(v) = lookup(ENV_ASSUME_TZ) {
      config.normalize.assume_tz = v
        .parse()
        .map_err(|reason: String| PipelineError::config(ENV_ASSUME_TZ, reason))?;
    }
    if let Some(v) = lookup(ENV_DROP_PRIVATE_IPS) {
      config.normalize.drop_private_ips = parse_flag(ENV_DROP_PRIVATE_IPS, &v)?;
    }
    if let Some(v) = lookup(ENV_TOP_N) {
      config.metrics.top_n = parse_number(ENV_TOP_N, &v)?;
    }
    if let Some(v) = lookup(ENV_MIN_REQUESTS) {
      config.metrics.min_requests = parse_number(ENV_MIN_REQUESTS, &v)?;
    }

    Ok(config)
  }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T, PipelineError> {
  raw
    .trim()
    .parse()
    .map_err(|_| PipelineError::config(key, format!("expected a non-negative integer, got {raw:?}")))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, PipelineError> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Ok(true),
    "0" | "false" | "no" | "off" => Ok(false),
    _ => Err(PipelineError::config(key, format!("expected a boolean, got {raw:?}"))),
  }
}
