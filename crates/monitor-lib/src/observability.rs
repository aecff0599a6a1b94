//! Observability infrastructure for the VOC monitor
//!
//! Provides:
//! - Prometheus metrics (ingest counters, rolling RMSE, inference latency,
//!   retrain counters, model version)
//! - Structured JSON event logging with tracing

use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_gauge, Gauge, GaugeVec,
    Histogram, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for inference latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    messages_ingested: IntGauge,
    parse_errors: IntGauge,
    inference_errors: IntGauge,
    predictions_generated: IntGauge,
    retrains_triggered: IntGauge,
    retrains_completed: IntGauge,
    retrains_failed: IntGauge,
    rolling_rmse: Gauge,
    inference_latency_seconds: Histogram,
    model_version_info: GaugeVec,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            messages_ingested: register_int_gauge!(
                "voc_monitor_messages_ingested_total",
                "Total telemetry messages accepted at the ingestion boundary"
            )
            .expect("Failed to register messages_ingested"),

            parse_errors: register_int_gauge!(
                "voc_monitor_parse_errors_total",
                "Total inbound payloads dropped as unparseable"
            )
            .expect("Failed to register parse_errors"),

            inference_errors: register_int_gauge!(
                "voc_monitor_inference_errors_total",
                "Total messages dropped after the model rejected the feature vector"
            )
            .expect("Failed to register inference_errors"),

            predictions_generated: register_int_gauge!(
                "voc_monitor_predictions_generated_total",
                "Total predictions completed"
            )
            .expect("Failed to register predictions_generated"),

            retrains_triggered: register_int_gauge!(
                "voc_monitor_retrains_triggered_total",
                "Total retraining jobs spawned on drift"
            )
            .expect("Failed to register retrains_triggered"),

            retrains_completed: register_int_gauge!(
                "voc_monitor_retrains_completed_total",
                "Total retraining jobs that finished and swapped in a new model"
            )
            .expect("Failed to register retrains_completed"),

            retrains_failed: register_int_gauge!(
                "voc_monitor_retrains_failed_total",
                "Total retraining jobs that failed or whose reload failed"
            )
            .expect("Failed to register retrains_failed"),

            rolling_rmse: register_gauge!(
                "voc_monitor_rolling_rmse",
                "Rolling RMSE over the resident prediction pairs"
            )
            .expect("Failed to register rolling_rmse"),

            inference_latency_seconds: register_histogram!(
                "voc_monitor_inference_latency_seconds",
                "Time spent running model inference per message",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            model_version_info: register_gauge_vec!(
                "voc_monitor_model_version_info",
                "Information about the currently active model artifact",
                &["version"]
            )
            .expect("Failed to register model_version_info"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn inc_messages(&self) {
        self.inner().messages_ingested.inc();
    }

    pub fn inc_parse_errors(&self) {
        self.inner().parse_errors.inc();
    }

    pub fn inc_inference_errors(&self) {
        self.inner().inference_errors.inc();
    }

    pub fn inc_predictions(&self) {
        self.inner().predictions_generated.inc();
    }

    pub fn inc_retrains_triggered(&self) {
        self.inner().retrains_triggered.inc();
    }

    pub fn inc_retrains_completed(&self) {
        self.inner().retrains_completed.inc();
    }

    pub fn inc_retrains_failed(&self) {
        self.inner().retrains_failed.inc();
    }

    pub fn set_rolling_rmse(&self, rmse: f64) {
        self.inner().rolling_rmse.set(rmse);
    }

    pub fn observe_inference_latency(&self, duration_secs: f64) {
        self.inner().inference_latency_seconds.observe(duration_secs);
    }

    /// Update model version info
    pub fn set_model_version(&self, version: &str) {
        // Reset previous version
        self.inner().model_version_info.reset();
        // Set new version with value 1
        self.inner()
            .model_version_info
            .with_label_values(&[version])
            .set(1.0);
    }
}

/// Structured logger for monitor events
///
/// Provides consistent JSON-formatted logging for predictions, drift
/// breaches, retrain lifecycle, and model swaps.
#[derive(Clone)]
pub struct StructuredLogger {
    device_name: String,
}

impl StructuredLogger {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
        }
    }

    /// Log a drift breach that requested retraining
    pub fn log_drift_breach(&self, rmse: f64, threshold: f64, samples: usize) {
        warn!(
            event = "drift_detected",
            device = %self.device_name,
            rolling_rmse = rmse,
            threshold = threshold,
            samples = samples,
            "Rolling RMSE breached retrain threshold"
        );
    }

    /// Log the start of a retraining job
    pub fn log_retrain_started(&self, script: &str) {
        info!(
            event = "retrain_started",
            device = %self.device_name,
            script = %script,
            "Retraining job spawned"
        );
    }

    /// Log the outcome of a retraining job
    pub fn log_retrain_finished(&self, success: bool, detail: &str) {
        if success {
            info!(
                event = "retrain_finished",
                device = %self.device_name,
                success = true,
                "Retraining job completed"
            );
        } else {
            warn!(
                event = "retrain_finished",
                device = %self.device_name,
                success = false,
                detail = %detail,
                "Retraining job failed"
            );
        }
    }

    /// Log a model hot-swap
    pub fn log_model_swap(&self, old_version: &str, new_version: &str) {
        info!(
            event = "model_swapped",
            device = %self.device_name,
            old_version = %old_version,
            new_version = %new_version,
            "Active model replaced"
        );
    }

    /// Log monitor startup
    pub fn log_startup(&self, version: &str, model_version: &str) {
        info!(
            event = "monitor_started",
            device = %self.device_name,
            monitor_version = %version,
            model_version = %model_version,
            "VOC monitor started"
        );
    }

    /// Log monitor shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            device = %self.device_name,
            reason = %reason,
            "VOC monitor shutting down"
        );
    }
}
