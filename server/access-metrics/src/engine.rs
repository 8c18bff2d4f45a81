//! Pipeline driver: parse -> normalize -> metrics.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::info_span;

use crate::config::{Config, InputFormat};
use crate::error::PipelineError;
use crate::metrics;
use crate::normalize;
use crate::parser::{self, ParseStats};
use crate::types::*;

/// Everything one run produced. Only `summary` is the external contract;
/// the rest is diagnostics.
#[derive(Debug, Clone)]
pub struct Analysis {
  pub parse: ParseStats,
  pub cleaning: CleaningReport,
  pub summary: MetricsSummary,
}

/// Stateless pipeline runner; every call is a pure function of its input.
pub struct Engine {
  config: Config,
}

impl Engine {
  pub fn new(config: Config) -> Self {
    Self { config }
  }

  pub fn with_defaults() -> Self {
    Self::new(Config::default())
  }

  /// Run the full pipeline over a log stream in the configured input format.
  ///
  /// Any whole-batch failure aborts the run; no partial summary is returned.
  pub fn run<R: BufRead>(&self, reader: R) -> Result<Analysis, PipelineError> {
    let (records, parse) = {
      let _span = info_span!("parse").entered();
      match self.config.parse.input {
        InputFormat::AccessLog => {
          let parsed = parser::parse_reader(reader, &self.config.parse)?;
          let records: Vec<RawRecord> =
            parsed.records.into_iter().map(RawRecord::from).collect();
          (records, parsed.stats)
        }
        InputFormat::JsonLines => parser::parse_json_lines(reader, &self.config.parse)?,
      }
    };

    let (events, cleaning) = {
      let _span = info_span!("normalize").entered();
      normalize::normalize(&records, &self.config.normalize)?
    };

    let summary = {
      let _span = info_span!("metrics").entered();
      metrics::compute_metrics(&events, &self.config.metrics)?
    };

    Ok(Analysis {
      parse,
      cleaning,
      summary,
    })
  }

  /// Open `path` and run the pipeline over it.
  pub fn run_path(&self, path: impl AsRef<Path>) -> Result<Analysis, PipelineError> {
    let file = File::open(path.as_ref())?;
    self.run(BufReader::new(file))
  }

  /// Convenience for in-memory logs.
  pub fn run_str(&self, text: &str) -> Result<Analysis, PipelineError> {
    self.run(text.as_bytes())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{NormalizeConfig, ParseConfig};

  fn line(ip: &str, time: &str, path: &str, status: u16) -> String {
    format!(r#"{ip} - - [{time}] "GET {path} HTTP/1.1" {status} 100 "-" "test""#)
  }

  #[test]
  fn end_to_end_small_log() {
    let log = [
      line("1.1.1.1", "17/Jan/2026:13:41:00 +0000", "/a", 200),
      line("1.1.1.1", "17/Jan/2026:13:40:00 +0000", "/a", 500),
      String::new(),
      "garbage".to_string(),
    ]
    .join("\n");
    let analysis = Engine::with_defaults().run_str(&log).unwrap();
    assert_eq!(analysis.parse.accepted, 2);
    assert_eq!(analysis.parse.malformed, 1);
    assert_eq!(analysis.cleaning.output_count, 2);
    assert_eq!(analysis.summary.meta.start_time, "2026-01-17T13:40:00+00:00");
    let peak = analysis.summary.errors.peak_5xx_window_5m.unwrap();
    assert_eq!(peak.count_5xx, 1);
  }

  #[test]
  fn everything_filtered_is_fatal() {
    let log = line("10.0.0.1", "17/Jan/2026:13:41:00 +0000", "/a", 200);
    let mut config = Config::default();
    config.normalize = NormalizeConfig {
      drop_private_ips: true,
      ..NormalizeConfig::default()
    };
    let err = Engine::new(config).run_str(&log).unwrap_err();
    assert!(matches!(err, PipelineError::EmptyResult(_)));
  }

  #[test]
  fn missing_file_is_io_error() {
    let err = Engine::with_defaults()
      .run_path("/definitely/not/here.log")
      .unwrap_err();
    assert!(matches!(err, PipelineError::Io(_)));
  }

  #[test]
  fn json_lines_input_runs_the_same_pipeline() {
    let rows = [
      r#"{"timestamp": "2026-01-17T13:41:00+00:00", "ip": "1.1.1.1", "method": "GET", "path": "/a", "status": 200, "bytes_sent": 100}"#,
      r#"{"timestamp": "2026-01-17 13:40:00", "ip": "1.1.1.1", "method": "GET", "path": "/a", "status": "500", "bytes_sent": "100"}"#,
      "not json",
    ]
    .join("\n");
    let mut config = Config::default();
    config.parse = ParseConfig {
      input: InputFormat::JsonLines,
      ..ParseConfig::default()
    };
    let analysis = Engine::new(config).run_str(&rows).unwrap();
    assert_eq!(analysis.parse.accepted, 2);
    assert_eq!(analysis.parse.malformed, 1);
    assert_eq!(analysis.cleaning.output_count, 2);
    assert_eq!(analysis.summary.meta.start_time, "2026-01-17T13:40:00+00:00");
    assert_eq!(analysis.summary.clients.top_ips_by_requests[0].value, "1.1.1.1");
    assert_eq!(analysis.summary.errors.overall.count_5xx, 1);
  }

  #[test]
  fn json_lines_missing_column_is_schema_violation() {
    let rows = r#"{"timestamp": "2026-01-17T13:41:00Z", "ip": "1.1.1.1", "method": "GET", "path": "/a", "bytes_sent": 1}"#;
    let mut config = Config::default();
    config.parse.input = InputFormat::JsonLines;
    let err = Engine::new(config).run_str(rows).unwrap_err();
    match err {
      PipelineError::SchemaViolation { missing } => assert_eq!(missing, vec!["status"]),
      other => panic!("unexpected error: {other}"),
    }
  }
}
