//! Access-log metrics engine: deterministic, rule-based.
//!
//! Parses combined-format access logs (or JSON-lines row dumps), normalizes
//! them into sorted request events, and computes a fixed MetricsSummary
//! (traffic, error rates, top talkers, and the peak 5-minute 5xx incident
//! window).
//!
//! No AI, no DB, no network; pure computation over an in-memory batch.

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod normalize;
pub mod parser;
pub mod rank;
pub mod types;
pub mod window;

pub use config::{AssumedZone, Config, InputFormat, MetricsConfig, NormalizeConfig, ParseConfig};
pub use engine::{Analysis, Engine};
pub use error::PipelineError;
pub use metrics::compute_metrics;
pub use normalize::normalize;
pub use parser::{parse_json_lines, parse_line, parse_reader, LineOutcome};
pub use types::{CleaningReport, DropReason, Event, MetricsSummary, RawRecord, RawValue};
