//! Kafka Worker Framework
//!
//! A generic Kafka consumer/producer framework for event pipelines.
//!
//! ## Features
//!
//! - **Generic worker**: `EventWorker<J, H, S>` decodes JSON records and hands them to a handler
//! - **At-least-once**: offsets are committed only after the handler succeeded
//! - **Resilient startup**: startup delay and subscription retry without crashing the process
//! - **Retrying producer**: idempotent producer with bounded retries on transient failures
//! - **In-memory broker**: `MemoryBroker` for local runs and tests
//! - **Prometheus metrics**: Built-in observability
//! - **Health endpoints**: K8s-ready liveness and readiness probes
//!
//! ## Example
//!
//! ```ignore
//! use kafka_worker::{EventWorker, KafkaRecordSource, WorkerConfig};
//!
//! let source = KafkaRecordSource::new(&kafka_config)?;
//! let config = WorkerConfig::new(["port-events", "container-events"]);
//! let worker = EventWorker::new(source, Arc::new(handler), config);
//! worker.run(shutdown_rx).await?;
//! ```

mod client;
mod config;
mod consumer;
mod error;
mod health;
mod memory;
pub mod metrics;
mod producer;
mod record;
mod worker;

// Re-export main types
pub use config::WorkerConfig;
pub use consumer::{KafkaRecordSource, RecordSource};
pub use error::{kafka_error_category, ErrorCategory, StreamError};
pub use health::{health_router, HealthResponse, HealthState};
pub use memory::{MemoryBroker, MemoryConsumer};
pub use metrics::{init_metrics, WorkerMetrics};
pub use producer::{DeliveryAck, KafkaProducer, RecordSink, RetryPolicy, RetryingSink};
pub use record::{ConsumedRecord, RecordMeta};
pub use worker::{EventHandler, EventWorker, RecordOutcome, WorkerState};
