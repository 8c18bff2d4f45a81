//! Logging setup for the binary. stdout carries the summary payload, so all
//! log output goes to stderr.

use std::io::IsTerminal;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_FORMAT: &str = "ACCESS_METRICS_LOG_FORMAT";

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "access_metrics=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
  /// Human-readable console lines.
  #[default]
  Human,
  /// One JSON object per line.
  Json,
}

impl std::str::FromStr for LogFormat {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "human" | "pretty" | "console" => Ok(LogFormat::Human),
      "json" | "jsonl" => Ok(LogFormat::Json),
      other => Err(format!("unknown log format: {other}")),
    }
  }
}

impl LogFormat {
  /// Read `ACCESS_METRICS_LOG_FORMAT`; unknown values fall back to human.
  pub fn from_env() -> Self {
    std::env::var(ENV_LOG_FORMAT)
      .ok()
      .and_then(|v| v.parse().ok())
      .unwrap_or_default()
  }
}

/// Install the global subscriber. Call once, before any logging.
pub fn init_logging(format: LogFormat) {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

  match format {
    LogFormat::Human => {
      let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal());
      tracing_subscriber::registry().with(filter).with(layer).init();
    }
    LogFormat::Json => {
      let layer = fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_current_span(true);
      tracing_subscriber::registry().with(filter).with(layer).init();
    }
  }
}
