//! # lanevakt-telemetry
//!
//! Logging and metrics plumbing: the [`MetricSink`] capability every
//! collector and the alert manager write through, a Prometheus-backed
//! recorder, and tracing initialization.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::{MetricSink, MetricsRecorder};
