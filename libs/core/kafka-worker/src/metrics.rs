//! Prometheus metrics for Kafka workers
//!
//! Provides observability into consumer and producer health.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize Prometheus metrics
///
/// Call this once at startup. Subsequent calls are no-ops. A recorder that
/// cannot be installed (another one already is) is logged, not fatal.
pub fn init_metrics() {
    let result = PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        info!("Prometheus metrics initialized");
        Ok::<_, metrics_exporter_prometheus::BuildError>(handle)
    });

    if let Err(e) = result {
        warn!(error = %e, "Failed to install Prometheus recorder");
    }
}

/// Get the Prometheus handle for rendering metrics
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Consumer worker metrics helper
#[derive(Clone)]
pub struct WorkerMetrics {
    /// Handler name for labeling
    handler_name: String,
}

impl WorkerMetrics {
    pub fn new(handler_name: impl Into<String>) -> Self {
        Self {
            handler_name: handler_name.into(),
        }
    }

    /// Record a record being received
    pub fn record_received(&self, topic: &str) {
        counter!(
            "kafka_worker_records_received_total",
            "topic" => topic.to_string(),
            "handler" => self.handler_name.clone()
        )
        .increment(1);
    }

    /// Record a record handled and committed
    pub fn record_processed(&self, topic: &str, duration: Duration) {
        counter!(
            "kafka_worker_records_processed_total",
            "topic" => topic.to_string(),
            "handler" => self.handler_name.clone(),
            "status" => "success"
        )
        .increment(1);

        histogram!(
            "kafka_worker_record_duration_seconds",
            "topic" => topic.to_string(),
            "handler" => self.handler_name.clone()
        )
        .record(duration.as_secs_f64());
    }

    /// Record a handler failure (offset left uncommitted)
    pub fn record_failed(&self, topic: &str, category: &str) {
        counter!(
            "kafka_worker_records_processed_total",
            "topic" => topic.to_string(),
            "handler" => self.handler_name.clone(),
            "status" => "failed"
        )
        .increment(1);

        counter!(
            "kafka_worker_record_errors_total",
            "topic" => topic.to_string(),
            "handler" => self.handler_name.clone(),
            "category" => category.to_string()
        )
        .increment(1);
    }

    /// Record an undecodable record that was skipped
    pub fn poison_record(&self, topic: &str) {
        counter!(
            "kafka_worker_poison_records_total",
            "topic" => topic.to_string(),
            "handler" => self.handler_name.clone()
        )
        .increment(1);
    }

    /// Record a failed offset commit
    pub fn commit_failed(&self, topic: &str) {
        counter!(
            "kafka_worker_commit_failures_total",
            "topic" => topic.to_string(),
            "handler" => self.handler_name.clone()
        )
        .increment(1);
    }

    /// Record a consume error reported by the client
    pub fn consume_error(&self, category: &str) {
        counter!(
            "kafka_worker_consume_errors_total",
            "handler" => self.handler_name.clone(),
            "category" => category.to_string()
        )
        .increment(1);
    }

    /// Record a failed subscription attempt
    pub fn subscribe_failed(&self) {
        counter!(
            "kafka_worker_subscribe_failures_total",
            "handler" => self.handler_name.clone()
        )
        .increment(1);
    }

    /// 1 while subscribed, 0 otherwise
    pub fn subscribed(&self, subscribed: bool) {
        gauge!(
            "kafka_worker_subscribed",
            "handler" => self.handler_name.clone()
        )
        .set(if subscribed { 1.0 } else { 0.0 });
    }
}

/// Producer metrics helper
#[derive(Clone, Copy, Default)]
pub struct ProducerMetrics;

impl ProducerMetrics {
    pub fn delivered(&self, topic: &str) {
        counter!("kafka_producer_records_total", "topic" => topic.to_string(), "status" => "delivered")
            .increment(1);
    }

    pub fn failed(&self, topic: &str) {
        counter!("kafka_producer_records_total", "topic" => topic.to_string(), "status" => "failed")
            .increment(1);
    }

    pub fn retried(&self, topic: &str) {
        counter!("kafka_producer_retries_total", "topic" => topic.to_string()).increment(1);
    }
}
