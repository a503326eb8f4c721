//! Metric handles returned by registration.
//!
//! Handles are cheap clones over shared atomics; updates never take a lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::{MetricsError, Result};

/// Lock-free f64 cell stored as raw bits in an AtomicU64.
#[derive(Debug)]
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn new(value: f64) -> Self {
        AtomicF64(AtomicU64::new(value.to_bits()))
    }

    pub(crate) fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub(crate) fn set(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn add(&self, delta: f64) {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Monotonically increasing counter.
#[derive(Clone, Debug)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub(crate) fn new() -> Counter {
        Counter {
            value: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Increment by one.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by `n`.
    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Gauge that can move in either direction.
#[derive(Clone, Debug)]
pub struct Gauge {
    value: Arc<AtomicF64>,
}

impl Gauge {
    pub(crate) fn new() -> Gauge {
        Gauge {
            value: Arc::new(AtomicF64::new(0.0)),
        }
    }

    /// Set to an absolute value.
    pub fn set(&self, value: f64) {
        self.value.set(value);
    }

    /// Increment by one.
    pub fn inc(&self) {
        self.value.add(1.0);
    }

    /// Decrement by one.
    pub fn dec(&self) {
        self.value.add(-1.0);
    }

    /// Add `delta`, which may be negative.
    pub fn add(&self, delta: f64) {
        self.value.add(delta);
    }

    /// Subtract `delta`.
    pub fn sub(&self, delta: f64) {
        self.value.add(-delta);
    }

    /// Current value.
    pub fn get(&self) -> f64 {
        self.value.get()
    }
}

/// Histogram over fixed upper bounds.
#[derive(Clone)]
pub struct Histogram {
    inner: Arc<HistogramInner>,
}

pub(crate) struct HistogramInner {
    upper_bounds: Vec<f64>,
    bucket_counts: Vec<AtomicU64>,
    sum: AtomicF64,
    count: AtomicU64,
}

impl Histogram {
    pub(crate) fn new(buckets: &[f64]) -> Histogram {
        let mut upper_bounds: Vec<f64> = buckets.to_vec();
        upper_bounds.sort_by(|a, b| a.total_cmp(b));
        upper_bounds.dedup();
        let bucket_counts = upper_bounds.iter().map(|_| AtomicU64::new(0)).collect();
        Histogram {
            inner: Arc::new(HistogramInner {
                upper_bounds,
                bucket_counts,
                sum: AtomicF64::new(0.0),
                count: AtomicU64::new(0),
            }),
        }
    }

    /// Record one observation.
    pub fn observe(&self, value: f64) {
        for (i, bound) in self.inner.upper_bounds.iter().enumerate() {
            if value <= *bound {
                self.inner.bucket_counts[i].fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
        self.inner.sum.add(value);
        self.inner.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of observations recorded so far.
    pub fn count(&self) -> u64 {
        self.inner.count.load(Ordering::Relaxed)
    }

    /// Sum of all observed values.
    pub fn sum(&self) -> f64 {
        self.inner.sum.get()
    }

    pub(crate) fn upper_bounds(&self) -> &[f64] {
        &self.inner.upper_bounds
    }

    /// Cumulative count of observations at or below each upper bound.
    pub(crate) fn cumulative_counts(&self) -> Vec<u64> {
        let mut total = 0;
        self.inner
            .bucket_counts
            .iter()
            .map(|c| {
                total += c.load(Ordering::Relaxed);
                total
            })
            .collect()
    }
}

/// Counters partitioned by label values.
#[derive(Clone)]
pub struct CounterVec {
    inner: Arc<VecInner<Counter>>,
}

/// Gauges partitioned by label values.
#[derive(Clone)]
pub struct GaugeVec {
    inner: Arc<VecInner<Gauge>>,
}

/// Histograms partitioned by label values, sharing one bucket layout.
#[derive(Clone)]
pub struct HistogramVec {
    inner: Arc<VecInner<Histogram>>,
    buckets: Arc<Vec<f64>>,
}

pub(crate) struct VecInner<T> {
    label_names: Vec<String>,
    children: DashMap<Vec<String>, T>,
}

impl<T> VecInner<T> {
    fn new(label_names: &[&str]) -> Self {
        VecInner {
            label_names: label_names.iter().map(|s| s.to_string()).collect(),
            children: DashMap::new(),
        }
    }

    fn child_with<F: FnOnce() -> T>(&self, values: &[&str], make: F) -> Result<T>
    where
        T: Clone,
    {
        if values.len() != self.label_names.len() {
            return Err(MetricsError::LabelArity {
                expected: self.label_names.len(),
                got: values.len(),
            });
        }
        let key: Vec<String> = values.iter().map(|s| s.to_string()).collect();
        Ok(self.children.entry(key).or_insert_with(make).clone())
    }

    pub(crate) fn label_names(&self) -> &[String] {
        &self.label_names
    }

    /// Children sorted by label values for deterministic rendering.
    pub(crate) fn sorted_children(&self) -> Vec<(Vec<String>, T)>
    where
        T: Clone,
    {
        let mut children: Vec<(Vec<String>, T)> = self
            .children
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        children.sort_by(|a, b| a.0.cmp(&b.0));
        children
    }
}

impl CounterVec {
    pub(crate) fn new(label_names: &[&str]) -> CounterVec {
        CounterVec {
            inner: Arc::new(VecInner::new(label_names)),
        }
    }

    /// Counter for one combination of label values, created on first use.
    pub fn with_label_values(&self, values: &[&str]) -> Result<Counter> {
        self.inner.child_with(values, Counter::new)
    }

    /// Touch each combination so it exports as zero before first increment.
    pub fn init_label_values(&self, combinations: &[&[&str]]) -> Result<()> {
        for values in combinations {
            self.with_label_values(values)?;
        }
        Ok(())
    }

    pub(crate) fn inner(&self) -> &VecInner<Counter> {
        &self.inner
    }
}

impl GaugeVec {
    pub(crate) fn new(label_names: &[&str]) -> GaugeVec {
        GaugeVec {
            inner: Arc::new(VecInner::new(label_names)),
        }
    }

    /// Gauge for one combination of label values, created on first use.
    pub fn with_label_values(&self, values: &[&str]) -> Result<Gauge> {
        self.inner.child_with(values, Gauge::new)
    }

    pub(crate) fn inner(&self) -> &VecInner<Gauge> {
        &self.inner
    }
}

impl HistogramVec {
    pub(crate) fn new(label_names: &[&str], buckets: &[f64]) -> HistogramVec {
        HistogramVec {
            inner: Arc::new(VecInner::new(label_names)),
            buckets: Arc::new(buckets.to_vec()),
        }
    }

    /// Histogram for one combination of label values, created on first use.
    pub fn with_label_values(&self, values: &[&str]) -> Result<Histogram> {
        let buckets = Arc::clone(&self.buckets);
        self.inner.child_with(values, || Histogram::new(&buckets))
    }

    pub(crate) fn inner(&self) -> &VecInner<Histogram> {
        &self.inner
    }
}
