//! Runtime observability: scheduler/tokenizer/backend-selection counters
//! and a mirror of the transport layer's latency counters, all exposed
//! through the process-wide Prometheus registry.

pub mod metrics;
pub mod transport_metrics;

use once_cell::sync::Lazy;

pub use metrics::{RuntimeMetrics, RuntimeMetricsSnapshot};

static RUNTIME_METRICS: Lazy<RuntimeMetrics> =
    Lazy::new(|| RuntimeMetrics::new(sched_common::SchedConfig::load().runtime_metrics));

/// The process-wide runtime metrics instance, enabled per `RUNTIME_METRICS`.
pub fn runtime_metrics() -> &'static RuntimeMetrics {
    &RUNTIME_METRICS
}

/// Registers the gauges so they show up in `/metrics` even before the first
/// observation; called once at process startup.
pub fn init() {
    let _ = runtime_metrics();
}
