//! Core worker trait and the generic EventWorker implementation.
//!
//! This module provides:
//! - `EventHandler` trait for decoded record processors
//! - `WorkerState` lifecycle published over a watch channel
//! - `EventWorker` struct running the consume loop
//!
//! Delivery is at-least-once: a record's offset is committed only after its
//! handler returned `Ok`. Records that fail to decode are skipped and left
//! uncommitted; a later commit in the same partition moves past them.

use crate::config::WorkerConfig;
use crate::consumer::RecordSource;
use crate::error::StreamError;
use crate::metrics::WorkerMetrics;
use crate::record::{ConsumedRecord, RecordMeta};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Trait for processors of decoded records.
///
/// # Example
///
/// ```rust,ignore
/// use kafka_worker::{EventHandler, RecordMeta, StreamError};
///
/// struct AuditHandler;
///
/// #[async_trait]
/// impl EventHandler<AuditEvent> for AuditHandler {
///     async fn handle(&self, meta: &RecordMeta, event: AuditEvent) -> Result<(), StreamError> {
///         println!("{} @ {}", event.id, meta.offset);
///         Ok(())
///     }
///
///     fn name(&self) -> &'static str {
///         "audit"
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler<J>: Send + Sync
where
    J: Send + 'static,
{
    /// Process one record. `Err` leaves the offset uncommitted.
    async fn handle(&self, meta: &RecordMeta, event: J) -> Result<(), StreamError>;

    /// Get the handler name for logging and metrics.
    fn name(&self) -> &'static str;
}

/// Lifecycle of the consume loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Waiting out the startup delay or retrying subscription
    Starting,
    /// Joined the consumer group
    Subscribed,
    /// Actively polling
    Polling,
    /// Last poll returned a non-fatal error
    ConsumeError,
    /// Stopped on a fatal client error
    FatalError,
    /// Exited the loop
    Stopped,
}

impl WorkerState {
    /// Whether the worker is attached to the broker and making progress
    pub fn is_ready(&self) -> bool {
        matches!(self, WorkerState::Subscribed | WorkerState::Polling)
    }
}

/// What happened to a single polled record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Committed,
    Poison,
    HandlerFailed,
    CommitFailed,
}

/// Generic consumer worker dispatching decoded records to a handler.
///
/// # Type Parameters
///
/// * `J` - The payload type decoded from each record (JSON)
/// * `H` - The handler type (must implement `EventHandler<J>`)
/// * `S` - The record source (Kafka or in-memory)
pub struct EventWorker<J, H, S>
where
    H: EventHandler<J>,
    S: RecordSource,
    J: Send + 'static,
{
    source: S,
    handler: Arc<H>,
    config: WorkerConfig,
    metrics: WorkerMetrics,
    state: watch::Sender<WorkerState>,
    _phantom: PhantomData<fn() -> J>,
}

impl<J, H, S> EventWorker<J, H, S>
where
    J: DeserializeOwned + Send + 'static,
    H: EventHandler<J> + 'static,
    S: RecordSource,
{
    /// Create a new worker.
    pub fn new(source: S, handler: Arc<H>, config: WorkerConfig) -> Self {
        let (state, _) = watch::channel(WorkerState::Starting);
        let metrics = WorkerMetrics::new(handler.name());
        Self {
            source,
            handler,
            config,
            metrics,
            state,
            _phantom: PhantomData,
        }
    }

    /// Subscribe to lifecycle changes (used by the readiness probe).
    pub fn state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Get the worker configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    fn set_state(&self, state: WorkerState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                debug!(from = ?*current, to = ?state, "Worker state changed");
                *current = state;
                true
            }
        });
    }

    /// Run the worker loop until shutdown or a fatal error.
    ///
    /// Returns `Ok(())` after a requested shutdown and `Err` with the fatal
    /// error otherwise. The source is closed in both cases.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), StreamError> {
        info!(
            consumer_id = %self.config.consumer_id,
            topics = ?self.config.topics,
            handler = %self.handler.name(),
            source = %self.source.name(),
            startup_delay_ms = self.config.startup_delay.as_millis() as u64,
            "Starting event worker"
        );
        self.set_state(WorkerState::Starting);

        let result = if self.subscribe_with_retry(&mut shutdown).await {
            self.consume(&mut shutdown).await
        } else {
            Ok(())
        };

        if let Err(e) = self.source.close().await {
            warn!(error = %e, "Error while closing consumer, ignoring");
        }
        self.metrics.subscribed(false);

        if result.is_err() {
            self.set_state(WorkerState::FatalError);
        } else {
            self.set_state(WorkerState::Stopped);
        }
        info!(consumer_id = %self.config.consumer_id, "Event worker stopped");
        result
    }

    /// Wait the startup delay, then subscribe until it succeeds.
    /// Returns false when shutdown arrived first.
    async fn subscribe_with_retry(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        if wait_or_shutdown(shutdown, self.config.startup_delay).await {
            info!("Shutdown during startup delay");
            return false;
        }

        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            match self.source.subscribe(&self.config.topics).await {
                Ok(()) => {
                    info!(topics = ?self.config.topics, attempts, "Subscribed to topics");
                    self.metrics.subscribed(true);
                    self.set_state(WorkerState::Subscribed);
                    return true;
                }
                Err(e) => {
                    error!(
                        error = %e,
                        attempts,
                        retry_in_secs = self.config.subscribe_retry_interval.as_secs(),
                        "Failed to subscribe, retrying"
                    );
                    self.metrics.subscribe_failed();
                    if wait_or_shutdown(shutdown, self.config.subscribe_retry_interval).await {
                        return false;
                    }
                }
            }
        }
    }

    async fn consume(&self, shutdown: &mut watch::Receiver<bool>) -> Result<(), StreamError> {
        let mut consecutive_errors: u32 = 0;

        loop {
            if *shutdown.borrow() {
                info!("Received shutdown signal, stopping worker");
                return Ok(());
            }

            let polled = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Received shutdown signal, stopping worker");
                        return Ok(());
                    }
                    continue;
                }
                polled = self.source.poll(self.config.poll_timeout) => polled,
            };

            match polled {
                Ok(Some(record)) => {
                    consecutive_errors = 0;
                    self.set_state(WorkerState::Polling);
                    self.process_record(record).await;
                }
                Ok(None) => {
                    consecutive_errors = 0;
                    self.set_state(WorkerState::Polling);
                }
                Err(e) if e.is_fatal() => {
                    error!(critical = true, error = %e, "Fatal consumer error, stopping worker");
                    self.metrics.consume_error("fatal");
                    return Err(StreamError::Fatal(e.to_string()));
                }
                Err(e) => {
                    consecutive_errors = consecutive_errors.saturating_add(1);
                    self.set_state(WorkerState::ConsumeError);
                    self.metrics.consume_error("transient");

                    let backoff = self.error_backoff(consecutive_errors);
                    warn!(
                        error = %e,
                        consecutive_errors,
                        backoff_ms = backoff.as_millis() as u64,
                        "Consume error, continuing"
                    );
                    if wait_or_shutdown(shutdown, backoff).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn error_backoff(&self, consecutive_errors: u32) -> Duration {
        let factor = 2u32.saturating_pow(consecutive_errors.saturating_sub(1).min(5));
        self.config
            .error_backoff
            .saturating_mul(factor)
            .min(Duration::from_secs(30))
    }

    /// Decode, dispatch and commit one record.
    pub async fn process_record(&self, record: ConsumedRecord) -> RecordOutcome {
        let meta = record.meta();
        self.metrics.record_received(&meta.topic);

        let decoded = match record.payload.as_deref() {
            Some(payload) => serde_json::from_slice::<J>(payload).map_err(StreamError::from),
            None => Err(StreamError::Serialization("record has no payload".to_string())),
        };

        let event = match decoded {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    topic = %meta.topic,
                    partition = meta.partition,
                    offset = meta.offset,
                    error = %e,
                    "Skipping undecodable record"
                );
                self.metrics.poison_record(&meta.topic);
                return RecordOutcome::Poison;
            }
        };

        let started = Instant::now();
        if let Err(e) = self.handler.handle(&meta, event).await {
            error!(
                topic = %meta.topic,
                partition = meta.partition,
                offset = meta.offset,
                handler = %self.handler.name(),
                error = %e,
                "Handler failed, offset not committed"
            );
            self.metrics
                .record_failed(&meta.topic, &format!("{:?}", e.category()).to_lowercase());
            return RecordOutcome::HandlerFailed;
        }

        if let Err(e) = self.source.commit(&record).await {
            warn!(
                topic = %meta.topic,
                partition = meta.partition,
                offset = meta.offset,
                error = %e,
                "Failed to commit offset, record may be redelivered"
            );
            self.metrics.commit_failed(&meta.topic);
            return RecordOutcome::CommitFailed;
        }

        self.metrics.record_processed(&meta.topic, started.elapsed());
        debug!(
            topic = %meta.topic,
            partition = meta.partition,
            offset = meta.offset,
            "Record processed and committed"
        );
        RecordOutcome::Committed
    }
}

/// Sleep for `duration` unless shutdown is signalled first.
/// Returns true when shutdown was requested.
pub(crate) async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    if duration.is_zero() {
        return false;
    }

    let sleep = tokio::time::sleep(duration);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}
