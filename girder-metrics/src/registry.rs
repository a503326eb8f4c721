//! The metric registry and Prometheus text rendering.
//!
//! A registry is an explicit, cheaply-clonable handle; nothing registers
//! against process-wide state, so independent registries can coexist.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{MetricsError, Result};
use crate::handles::{Counter, CounterVec, Gauge, GaugeVec, Histogram, HistogramVec, VecInner};

/// Default latency buckets, in seconds.
pub const DEFAULT_HISTOGRAM_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.0075, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0,
    30.0, 45.0, 60.0, 90.0,
];

/// Descriptor for a metric being registered.
///
/// The exported name is the non-empty parts of `namespace`, `subsystem` and
/// `name` joined with `_`. `name` and `help` are required; everything else
/// is optional.
#[derive(Debug, Clone, Default)]
pub struct MetricOpts {
    pub name: String,
    pub namespace: String,
    pub subsystem: String,
    pub help: String,
    pub const_labels: BTreeMap<String, String>,
}

impl MetricOpts {
    /// Opts with just the required fields set.
    pub fn new(name: &str, help: &str) -> MetricOpts {
        MetricOpts {
            name: name.to_string(),
            help: help.to_string(),
            ..MetricOpts::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.help.is_empty() {
            return Err(MetricsError::MissingNameOrHelp);
        }
        Ok(())
    }

    fn full_name(&self) -> String {
        [
            self.namespace.as_str(),
            self.subsystem.as_str(),
            self.name.as_str(),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<&str>>()
        .join("_")
    }
}

enum Registered {
    Counter(Counter),
    Gauge(Gauge),
    Histogram(Histogram),
    CounterVec(CounterVec),
    GaugeVec(GaugeVec),
    HistogramVec(HistogramVec),
}

struct Entry {
    help: String,
    const_labels: BTreeMap<String, String>,
    metric: Registered,
}

/// An explicit collection of metrics.
///
/// Clones share the same underlying set; pass one to each subsystem that
/// registers or renders.
#[derive(Clone, Default)]
pub struct Registry {
    metrics: Arc<DashMap<String, Entry>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Register a counter. Fails if name or help is missing, or if the full
    /// name is already taken.
    pub fn register_counter(&self, opts: MetricOpts) -> Result<Counter> {
        let counter = Counter::new();
        self.insert(opts, Registered::Counter(counter.clone()))?;
        Ok(counter)
    }

    /// Register a counter partitioned by `label_names`.
    pub fn register_counter_vec(
        &self,
        opts: MetricOpts,
        label_names: &[&str],
    ) -> Result<CounterVec> {
        let vec = CounterVec::new(label_names);
        self.insert(opts, Registered::CounterVec(vec.clone()))?;
        Ok(vec)
    }

    /// Register a gauge.
    pub fn register_gauge(&self, opts: MetricOpts) -> Result<Gauge> {
        let gauge = Gauge::new();
        self.insert(opts, Registered::Gauge(gauge.clone()))?;
        Ok(gauge)
    }

    /// Register a gauge partitioned by `label_names`.
    pub fn register_gauge_vec(&self, opts: MetricOpts, label_names: &[&str]) -> Result<GaugeVec> {
        let vec = GaugeVec::new(label_names);
        self.insert(opts, Registered::GaugeVec(vec.clone()))?;
        Ok(vec)
    }

    /// Register a histogram; `buckets` of `None` selects
    /// [`DEFAULT_HISTOGRAM_BUCKETS`].
    pub fn register_histogram(
        &self,
        opts: MetricOpts,
        buckets: Option<&[f64]>,
    ) -> Result<Histogram> {
        let histogram = Histogram::new(buckets.unwrap_or(DEFAULT_HISTOGRAM_BUCKETS));
        self.insert(opts, Registered::Histogram(histogram.clone()))?;
        Ok(histogram)
    }

    /// Register a histogram partitioned by `label_names`.
    pub fn register_histogram_vec(
        &self,
        opts: MetricOpts,
        label_names: &[&str],
        buckets: Option<&[f64]>,
    ) -> Result<HistogramVec> {
        let vec = HistogramVec::new(label_names, buckets.unwrap_or(DEFAULT_HISTOGRAM_BUCKETS));
        self.insert(opts, Registered::HistogramVec(vec.clone()))?;
        Ok(vec)
    }

    fn insert(&self, opts: MetricOpts, metric: Registered) -> Result<()> {
        opts.validate()?;
        let full_name = opts.full_name();
        match self.metrics.entry(full_name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(MetricsError::AlreadyRegistered(full_name))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Entry {
                    help: opts.help,
                    const_labels: opts.const_labels,
                    metric,
                });
                Ok(())
            }
        }
    }

    /// Render every registered metric in the Prometheus text exposition
    /// format, name-sorted for deterministic output.
    pub fn render(&self) -> String {
        let mut names: Vec<String> = self.metrics.iter().map(|e| e.key().clone()).collect();
        names.sort();

        let mut out = String::with_capacity(4096);
        for name in names {
            if let Some(entry) = self.metrics.get(&name) {
                render_entry(&mut out, &name, entry.value());
            }
        }
        out
    }
}

fn render_entry(out: &mut String, name: &str, entry: &Entry) {
    let kind = match entry.metric {
        Registered::Counter(_) | Registered::CounterVec(_) => "counter",
        Registered::Gauge(_) | Registered::GaugeVec(_) => "gauge",
        Registered::Histogram(_) | Registered::HistogramVec(_) => "histogram",
    };
    let _ = writeln!(out, "# HELP {} {}", name, entry.help);
    let _ = writeln!(out, "# TYPE {} {}", name, kind);

    let base: Vec<(String, String)> = entry
        .const_labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    match &entry.metric {
        Registered::Counter(counter) => {
            let _ = writeln!(out, "{}{} {}", name, format_labels(&base), counter.get());
        }
        Registered::Gauge(gauge) => {
            let _ = writeln!(out, "{}{} {}", name, format_labels(&base), gauge.get());
        }
        Registered::Histogram(histogram) => {
            render_histogram(out, name, &base, histogram);
        }
        Registered::CounterVec(vec) => {
            for (labels, counter) in child_labels(vec.inner(), &base) {
                let _ = writeln!(out, "{}{} {}", name, format_labels(&labels), counter.get());
            }
        }
        Registered::GaugeVec(vec) => {
            for (labels, gauge) in child_labels(vec.inner(), &base) {
                let _ = writeln!(out, "{}{} {}", name, format_labels(&labels), gauge.get());
            }
        }
        Registered::HistogramVec(vec) => {
            for (labels, histogram) in child_labels(vec.inner(), &base) {
                render_histogram(out, name, &labels, &histogram);
            }
        }
    }
}

/// Merge a child's label values onto the const labels, in declaration order.
fn child_labels<T: Clone>(
    inner: &VecInner<T>,
    base: &[(String, String)],
) -> Vec<(Vec<(String, String)>, T)> {
    inner
        .sorted_children()
        .into_iter()
        .map(|(values, child)| {
            let mut labels = base.to_vec();
            for (label, value) in inner.label_names().iter().zip(values) {
                labels.push((label.clone(), value));
            }
            (labels, child)
        })
        .collect()
}

fn render_histogram(out: &mut String, name: &str, labels: &[(String, String)], h: &Histogram) {
    let cumulative = h.cumulative_counts();
    for (bound, count) in h.upper_bounds().iter().zip(cumulative) {
        let mut bucket_labels = labels.to_vec();
        bucket_labels.push(("le".to_string(), format_value(*bound)));
        let _ = writeln!(
            out,
            "{}_bucket{} {}",
            name,
            format_labels(&bucket_labels),
            count
        );
    }
    let mut inf_labels = labels.to_vec();
    inf_labels.push(("le".to_string(), "+Inf".to_string()));
    let _ = writeln!(
        out,
        "{}_bucket{} {}",
        name,
        format_labels(&inf_labels),
        h.count()
    );
    let _ = writeln!(out, "{}_sum{} {}", name, format_labels(labels), h.sum());
    let _ = writeln!(out, "{}_count{} {}", name, format_labels(labels), h.count());
}

fn format_labels(labels: &[(String, String)]) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let rendered: Vec<String> = labels
        .iter()
        .map(|(key, value)| format!("{}=\"{}\"", key, escape_label_value(value)))
        .collect();
    format!("{{{}}}", rendered.join(","))
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn format_value(value: f64) -> String {
    // Display keeps 0.001 as-is and renders integral floats without a dot
    format!("{}", value)
}
