//! Prometheus-backed metric sink.
//!
//! The core never reads metrics back; it only writes gauges, counters, and
//! histograms through [`MetricSink`]. Families are registered lazily on first
//! use, keyed by metric name — callers must keep a stable label-key order per
//! name, which every call site in this workspace does.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use tracing::error;

/// Write-only metric capability, safe for concurrent use from every
/// component.
pub trait MetricSink: Send + Sync {
    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64);
    fn inc_counter(&self, name: &str, labels: &[(&str, &str)], delta: f64);
    fn observe_histogram(&self, name: &str, labels: &[(&str, &str)], value: f64);
}

#[derive(Default)]
struct Families {
    gauges: HashMap<String, GaugeVec>,
    counters: HashMap<String, CounterVec>,
    histograms: HashMap<String, HistogramVec>,
}

/// Shared Prometheus registry implementing [`MetricSink`].
#[derive(Clone)]
pub struct MetricsRecorder {
    registry: Registry,
    families: Arc<RwLock<Families>>,
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            families: Arc::new(RwLock::new(Families::default())),
        }
    }

    /// Renders the registry in Prometheus text exposition format.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    fn label_keys<'a>(labels: &[(&'a str, &str)]) -> Vec<&'a str> {
        labels.iter().map(|(k, _)| *k).collect()
    }

    fn label_values<'a>(labels: &[(&str, &'a str)]) -> Vec<&'a str> {
        labels.iter().map(|(_, v)| *v).collect()
    }

    fn gauge_family(&self, name: &str, labels: &[(&str, &str)]) -> Option<GaugeVec> {
        if let Some(vec) = self.families.read().gauges.get(name) {
            return Some(vec.clone());
        }
        let mut families = self.families.write();
        if let Some(vec) = families.gauges.get(name) {
            return Some(vec.clone());
        }
        let vec = GaugeVec::new(Opts::new(name, name), &Self::label_keys(labels))
            .and_then(|vec| {
                self.registry.register(Box::new(vec.clone()))?;
                Ok(vec)
            })
            .map_err(|e| error!(metric = name, error = %e, "gauge registration failed"))
            .ok()?;
        families.gauges.insert(name.to_string(), vec.clone());
        Some(vec)
    }

    fn counter_family(&self, name: &str, labels: &[(&str, &str)]) -> Option<CounterVec> {
        if let Some(vec) = self.families.read().counters.get(name) {
            return Some(vec.clone());
        }
        let mut families = self.families.write();
        if let Some(vec) = families.counters.get(name) {
            return Some(vec.clone());
        }
        let vec = CounterVec::new(Opts::new(name, name), &Self::label_keys(labels))
            .and_then(|vec| {
                self.registry.register(Box::new(vec.clone()))?;
                Ok(vec)
            })
            .map_err(|e| error!(metric = name, error = %e, "counter registration failed"))
            .ok()?;
        families.counters.insert(name.to_string(), vec.clone());
        Some(vec)
    }

    fn histogram_family(&self, name: &str, labels: &[(&str, &str)]) -> Option<HistogramVec> {
        if let Some(vec) = self.families.read().histograms.get(name) {
            return Some(vec.clone());
        }
        let mut families = self.families.write();
        if let Some(vec) = families.histograms.get(name) {
            return Some(vec.clone());
        }
        let opts = HistogramOpts::new(name, name)
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]);
        let vec = HistogramVec::new(opts, &Self::label_keys(labels))
            .and_then(|vec| {
                self.registry.register(Box::new(vec.clone()))?;
                Ok(vec)
            })
            .map_err(|e| error!(metric = name, error = %e, "histogram registration failed"))
            .ok()?;
        families.histograms.insert(name.to_string(), vec.clone());
        Some(vec)
    }
}

impl MetricSink for MetricsRecorder {
    fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        if let Some(vec) = self.gauge_family(name, labels) {
            vec.with_label_values(&Self::label_values(labels)).set(value);
        }
    }

    fn inc_counter(&self, name: &str, labels: &[(&str, &str)], delta: f64) {
        if let Some(vec) = self.counter_family(name, labels) {
            vec.with_label_values(&Self::label_values(labels)).inc_by(delta);
        }
    }

    fn observe_histogram(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        if let Some(vec) = self.histogram_family(name, labels) {
            vec.with_label_values(&Self::label_values(labels)).observe(value);
        }
    }
}
