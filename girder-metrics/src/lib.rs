//! girder-metrics: counters, gauges and histograms with Prometheus export
//!
//! Metrics register against an explicit [`Registry`] handle rather than any
//! process-wide state, so tests can hold several independent registries.
//! [`Registry::render`] produces the Prometheus text exposition format, and
//! [`run_metrics_server`] serves it over HTTP at `/metrics`.

mod error;
mod handles;
mod http;
mod registry;

pub use error::{MetricsError, Result};
pub use handles::{Counter, CounterVec, Gauge, GaugeVec, Histogram, HistogramVec};
pub use http::{run_metrics_server, MetricsServer};
pub use registry::{MetricOpts, Registry, DEFAULT_HISTOGRAM_BUCKETS};
