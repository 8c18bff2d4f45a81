//! Time bucketing: clock-aligned flooring and the ISO-8601 format every
//! emitted timestamp uses.

use chrono::{DateTime, FixedOffset, SecondsFormat, TimeDelta};

pub const MINUTE_SECS: i64 = 60;

/// Floor `ts` to a multiple of `step_secs` on the absolute (epoch) clock,
/// keeping its offset. Sub-second precision is dropped.
pub fn floor_to(ts: &DateTime<FixedOffset>, step_secs: i64) -> DateTime<FixedOffset> {
  let step = step_secs.max(1);
  let rem = ts.timestamp().rem_euclid(step);
  *ts - TimeDelta::seconds(rem) - TimeDelta::nanoseconds(i64::from(ts.timestamp_subsec_nanos()))
}

/// Floor to the start of the minute.
pub fn minute_bucket(ts: &DateTime<FixedOffset>) -> DateTime<FixedOffset> {
  floor_to(ts, MINUTE_SECS)
}

/// Epoch seconds of the window containing `ts`; used as a grouping key.
pub fn window_key(ts: &DateTime<FixedOffset>, window_secs: i64) -> i64 {
  floor_to(ts, window_secs).timestamp()
}

/// RFC 3339 with an explicit `+HH:MM` offset (never `Z`), fractional seconds
/// only when present.
pub fn iso(ts: &DateTime<FixedOffset>) -> String {
  ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}
