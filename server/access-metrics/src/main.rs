//! Binary entrypoint: read an access log (or JSON-lines rows) from stdin,
//! write the MetricsSummary JSON to stdout.
//!
//! Configuration comes from `ACCESS_METRICS_*` environment variables; logs go
//! to stderr. Any fatal pipeline error exits non-zero without a summary.

use access_metrics::logging::{self, LogFormat};
use access_metrics::{Config, Engine, PipelineError};
use std::io::{self, Write};

fn main() {
  logging::init_logging(LogFormat::from_env());

  if let Err(e) = run_binary() {
    tracing::error!(error = %e, "access-metrics failed");
    let _ = writeln!(io::stderr(), "access-metrics error: {}", e);
    std::process::exit(1);
  }
}

fn run_binary() -> Result<(), PipelineError> {
  let config = Config::from_env()?;
  let engine = Engine::new(config);

  let analysis = engine.run(io::stdin().lock())?;
  let digest = analysis.summary.digest()?;
  let parse_stats = serde_json::to_string(&analysis.parse)?;
  let cleaning = serde_json::to_string(&analysis.cleaning)?;
  tracing::info!(
    digest = %digest,
    parse = %parse_stats,
    cleaning = %cleaning,
    "summary ready"
  );

  let mut out = io::BufWriter::new(io::stdout().lock());
  serde_json::to_writer_pretty(&mut out, &analysis.summary)?;
  writeln!(out)?;
  out.flush()?;
  Ok(())
}
