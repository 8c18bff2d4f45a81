//! Structured error types for the access-log pipeline.
//!
//! Only whole-batch failures live here. Per-line and per-row problems are
//! tallied by the parser and normalizer instead of being raised.

use thiserror::Error;

/// Max characters of an offending line carried in a `ParseAbort`.
pub const LINE_EXCERPT_CHARS: usize = 120;

#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(
    "too many malformed lines (> {threshold}): saw {count}; last failure at line {line_no}: {line}"
  )]
  ParseAbort {
    threshold: usize,
    count: usize,
    line_no: usize,
    line: String,
  },

  #[error("schema violation: missing required fields {missing:?}")]
  SchemaViolation { missing: Vec<String> },

  #[error("empty result: {0}")]
  EmptyResult(String),

  #[error("config: {key}: {reason}")]
  Config { key: String, reason: String },

  #[error("io: {0}")]
  Io(#[from] std::io::Error),

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
}

impl PipelineError {
  pub fn parse_abort(threshold: usize, count: usize, line_no: usize, line: &str) -> Self {
    Self::ParseAbort {
      threshold,
      count,
      line_no,
      line: line.chars().take(LINE_EXCERPT_CHARS).collect(),
    }
  }

  pub fn config(key: &str, reason: impl Into<String>) -> Self {
    Self::Config {
      key: key.to_string(),
      reason: reason.into(),
    }
  }

  pub fn empty(msg: impl Into<String>) -> Self {
    Self::EmptyResult(msg.into())
  }
}
