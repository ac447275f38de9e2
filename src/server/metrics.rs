//! Prometheus metrics for the workload schedule operator
//!
//! Exposes controller health and scheduling activity:
//! - Reconciliation counts and durations
//! - Active-window state and replica counts per schedule
//! - Pod admission mutations

use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Operator metrics registry
///
/// Thread-safe container for all Prometheus metrics.
/// Clone is cheap (Arc internally).
#[derive(Clone)]
pub struct ControllerMetrics {
    registry: Registry,
    /// Total reconciliations by result (success, error, skipped)
    pub reconciliations_total: IntCounterVec,
    /// Reconciliation duration in seconds by result
    pub reconciliation_duration_seconds: HistogramVec,
    /// 1 when a schedule is inside its active window, else 0
    pub schedule_active: IntGaugeVec,
    /// Replica count last observed on the target Deployment
    pub schedule_replicas: IntGaugeVec,
    /// Pod admission outcomes (mutated, skipped, error)
    pub pod_mutations_total: IntCounterVec,
}

impl ControllerMetrics {
    /// Create a new metrics registry with all operator metrics
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciliations_total = IntCounterVec::new(
            Opts::new(
                "workload_schedule_reconciliations_total",
                "Total number of reconciliations",
            ),
            &["result"],
        )?;
        registry.register(Box::new(reconciliations_total.clone()))?;

        let reconciliation_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "workload_schedule_reconciliation_duration_seconds",
                "Duration of reconciliation in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["result"],
        )?;
        registry.register(Box::new(reconciliation_duration_seconds.clone()))?;

        let schedule_active = IntGaugeVec::new(
            Opts::new(
                "workload_schedule_active",
                "Whether the schedule is inside its active window",
            ),
            &["namespace", "schedule"],
        )?;
        registry.register(Box::new(schedule_active.clone()))?;

        let schedule_replicas = IntGaugeVec::new(
            Opts::new(
                "workload_schedule_replicas",
                "Replica count of the scheduled Deployment",
            ),
            &["namespace", "schedule"],
        )?;
        registry.register(Box::new(schedule_replicas.clone()))?;

        let pod_mutations_total = IntCounterVec::new(
            Opts::new(
                "workload_schedule_pod_mutations_total",
                "Pod admission requests by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(pod_mutations_total.clone()))?;

        Ok(Self {
            registry,
            reconciliations_total,
            reconciliation_duration_seconds,
            schedule_active,
            schedule_replicas,
            pod_mutations_total,
        })
    }

    /// Record a successful reconciliation
    pub fn record_reconciliation_success(&self, duration_secs: f64) {
        self.record_reconciliation("success", duration_secs);
    }

    /// Record a failed reconciliation
    pub fn record_reconciliation_error(&self, duration_secs: f64) {
        self.record_reconciliation("error", duration_secs);
    }

    /// Record a reconciliation that stopped early (missing object, finalizer step)
    pub fn record_reconciliation_skipped(&self) {
        self.reconciliations_total
            .with_label_values(&["skipped"])
            .inc();
    }

    fn record_reconciliation(&self, result: &str, duration_secs: f64) {
        self.reconciliations_total.with_label_values(&[result]).inc();
        self.reconciliation_duration_seconds
            .with_label_values(&[result])
            .observe(duration_secs);
    }

    /// Update window state and replica count for a schedule
    pub fn set_schedule_state(&self, namespace: &str, schedule: &str, active: bool, replicas: i32) {
        self.schedule_active
            .with_label_values(&[namespace, schedule])
            .set(i64::from(active));
        self.schedule_replicas
            .with_label_values(&[namespace, schedule])
            .set(i64::from(replicas));
    }

    /// Drop per-schedule series once a schedule is gone
    pub fn forget_schedule(&self, namespace: &str, schedule: &str) {
        let _ = self
            .schedule_active
            .remove_label_values(&[namespace, schedule]);
        let _ = self
            .schedule_replicas
            .remove_label_values(&[namespace, schedule]);
    }

    /// Record the outcome of a pod admission request
    pub fn record_pod_mutation(&self, outcome: &str) {
        self.pod_mutations_total.with_label_values(&[outcome]).inc();
    }

    /// Encode all metrics to Prometheus text format
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            prometheus::Error::Msg(format!("Failed to encode metrics as UTF-8: {}", e))
        })
    }
}

/// Shared metrics handle for use across the operator
pub type SharedMetrics = Arc<ControllerMetrics>;

/// Create a new shared metrics instance
pub fn create_metrics() -> Result<SharedMetrics, prometheus::Error> {
    Ok(Arc::new(ControllerMetrics::new()?))
}
