//! Counters and distributions recorded while orchestrating remote calls.
//!
//! A [`MetricsCollector`] is cheap to clone and safe to share between threads.
//! Attach one to an [`Orchestrator`](crate::orchestrator::Orchestrator) and it
//! records submit attempts, polls, fetched pages and retries for every call.
//! Custom metrics can be registered through the [`Metric`] trait.
//!
//! This module is compiled regardless of features. The `metrics` feature only
//! controls the orchestrator hooks that feed it.
//!
//! # Example
//!
//! ```no_run
//! use ironlro::metrics::{names, MetricsCollector};
//!
//! # fn main() -> anyhow::Result<()> {
//! let metrics = MetricsCollector::new();
//! metrics.increment_counter(names::SUBMIT_ATTEMPTS, 2);
//! metrics.record_value(names::POLLS_PER_OPERATION, 4.0);
//!
//! metrics.print();
//! metrics.save_to_file("metrics.json")?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use serde_json::{Value, json};
use std::any::Any;
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Names of the metrics recorded by the orchestrator.
pub mod names {
    pub const SUBMIT_ATTEMPTS: &str = "submit_attempts";
    pub const RETRIES: &str = "retries";
    pub const POLLS: &str = "polls";
    pub const PAGES_FETCHED: &str = "pages_fetched";
    pub const MUTATIONS_SUCCEEDED: &str = "mutations_succeeded";
    pub const MUTATIONS_FAILED: &str = "mutations_failed";
    pub const INTEGRITY_FAILURES: &str = "integrity_failures";
    pub const TIMEOUTS: &str = "timeouts";
    pub const POLLS_PER_OPERATION: &str = "polls_per_operation";
    pub const OPERATION_ELAPSED_MS: &str = "operation_elapsed_ms";
}

/// A named value that can be reported as JSON.
pub trait Metric: Send + Sync + Any {
    fn name(&self) -> &str;

    fn value(&self) -> Value;

    fn description(&self) -> Option<&str> {
        None
    }

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Thread-safe registry of metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<HashMap<String, Box<dyn Metric>>>>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Box<dyn Metric>>> {
        self.inner.lock().expect("metrics mutex poisoned")
    }

    /// Register a metric, replacing any metric with the same name.
    ///
    /// # Panics
    ///
    /// Panics if the metrics mutex is poisoned.
    pub fn register(&self, metric: Box<dyn Metric>) {
        self.lock().insert(metric.name().to_string(), metric);
    }

    /// Add `value` to a counter, creating it on first use.
    ///
    /// A non-counter metric registered under `name` is replaced.
    ///
    /// # Panics
    ///
    /// Panics if the metrics mutex is poisoned.
    pub fn increment_counter(&self, name: &str, value: u64) {
        let mut metrics = self.lock();
        if let Some(counter) = metrics
            .get_mut(name)
            .and_then(|m| m.as_any_mut().downcast_mut::<CounterMetric>())
        {
            counter.count += value;
            return;
        }
        metrics.insert(
            name.to_string(),
            Box::new(CounterMetric::with_value(name, value)),
        );
    }

    /// Record one observation in a histogram, creating it on first use.
    ///
    /// # Panics
    ///
    /// Panics if the metrics mutex is poisoned.
    pub fn record_value(&self, name: &str, value: f64) {
        let mut metrics = self.lock();
        if let Some(histogram) = metrics
            .get_mut(name)
            .and_then(|m| m.as_any_mut().downcast_mut::<HistogramMetric>())
        {
            histogram.record(value);
            return;
        }
        metrics.insert(
            name.to_string(),
            Box::new(HistogramMetric::with_values(name, vec![value])),
        );
    }

    /// Current value of a counter, or `None` if no counter has that name.
    ///
    /// # Panics
    ///
    /// Panics if the metrics mutex is poisoned.
    #[must_use]
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.lock()
            .get(name)
            .and_then(|m| m.as_any().downcast_ref::<CounterMetric>())
            .map(CounterMetric::count)
    }

    /// Statistics of a histogram, or `None` if no histogram has that name.
    ///
    /// # Panics
    ///
    /// Panics if the metrics mutex is poisoned.
    #[must_use]
    pub fn histogram(&self, name: &str) -> Option<HistogramStats> {
        self.lock()
            .get(name)
            .and_then(|m| m.as_any().downcast_ref::<HistogramMetric>())
            .map(HistogramMetric::stats)
    }

    /// All metrics as a JSON object keyed by name.
    ///
    /// # Panics
    ///
    /// Panics if the metrics mutex is poisoned.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let metrics = self.lock();
        let mut out = serde_json::Map::new();
        for (name, metric) in metrics.iter() {
            let mut entry = serde_json::Map::new();
            entry.insert("value".to_string(), metric.value());
            if let Some(desc) = metric.description() {
                entry.insert("description".to_string(), json!(desc));
            }
            out.insert(name.clone(), Value::Object(entry));
        }
        drop(metrics);
        Value::Object(out)
    }

    /// Print all metrics to stdout, sorted by name.
    ///
    /// # Panics
    ///
    /// Panics if the metrics mutex is poisoned.
    pub fn print(&self) {
        println!("\n========== Orchestration Metrics ==========");
        let metrics = self.lock();
        let mut sorted: Vec<_> = metrics.iter().collect();
        sorted.sort_by_key(|(name, _)| *name);
        for (name, metric) in sorted {
            match metric.description() {
                Some(desc) => println!("{name}: {} ({desc})", metric.value()),
                None => println!("{name}: {}", metric.value()),
            }
        }
        drop(metrics);
        println!("===========================================\n");
    }

    /// Write all metrics to `path` as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written to.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let formatted = serde_json::to_string_pretty(&self.to_json())?;
        let mut file = File::create(path)?;
        file.write_all(formatted.as_bytes())?;
        Ok(())
    }

    /// Name to value snapshot of every metric.
    ///
    /// # Panics
    ///
    /// Panics if the metrics mutex is poisoned.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.lock()
            .iter()
            .map(|(name, metric)| (name.clone(), metric.value()))
            .collect()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("metrics", &self.lock().len())
            .finish()
    }
}

// ========== Built-in Metrics ==========

/// Monotonic count.
pub struct CounterMetric {
    name: String,
    count: u64,
}

impl CounterMetric {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_value(name, 0)
    }

    pub fn with_value(name: impl Into<String>, count: u64) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }

    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }
}

impl Metric for CounterMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.count)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A single numeric value.
pub struct GaugeMetric {
    name: String,
    value: f64,
    description: Option<String>,
}

impl GaugeMetric {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Metric for GaugeMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.value)
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Distribution of recorded values.
pub struct HistogramMetric {
    name: String,
    values: Vec<f64>,
    description: Option<String>,
}

impl HistogramMetric {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_values(name, Vec::new())
    }

    pub fn with_values(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn record(&mut self, value: f64) {
        self.values.push(value);
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> HistogramStats {
        if self.values.is_empty() {
            return HistogramStats::default();
        }

        let mut sorted = self.values.clone();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        HistogramStats {
            count,
            sum,
            mean: sum / count as f64,
            min: sorted[0],
            max: sorted[count - 1],
            p50: sorted[count / 2],
            p95: sorted[(count * 95) / 100],
            p99: sorted[(count * 99) / 100],
        }
    }
}

impl Metric for HistogramMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        let stats = self.stats();
        json!({
            "count": stats.count,
            "sum": stats.sum,
            "mean": stats.mean,
            "min": stats.min,
            "max": stats.max,
            "p50": stats.p50,
            "p95": stats.p95,
            "p99": stats.p99,
        })
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramStats {
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}
