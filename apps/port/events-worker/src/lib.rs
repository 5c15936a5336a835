//! Port Events Worker
//!
//! Consumes port and container events from Kafka and bridges each one to
//! email escalation and the real-time WebSocket hub. The same process serves
//! the event API that raises new events, the hub endpoint and health probes.
//!
//! ## Architecture
//!
//! ```text
//! POST /events ─► EventService ─► EventPublisher ─► Kafka (port-events, container-events)
//!                                                      ↓ (Consumer Group: port-events-consumer)
//!                                         EventWorker<DomainEvent, EventDispatcher>
//!                                            ├─► EmailNotifier (High / Critical)
//!                                            └─► EventHub ─► /hubs/events (WebSocket)
//! ```
//!
//! ## Features
//!
//! - Startup grace delay and subscription retry without crashing the process
//! - Manual offset commit after every processed record
//! - Poison records skipped, sink failures logged and committed anyway
//! - A fatal broker error stops the consumer while the HTTP side keeps serving
//! - `KAFKA_BROKERS=memory` runs the whole pipeline in-process (development only)

mod dispatcher;

pub use dispatcher::{DispatchReport, EventDispatcher, StageOutcome};

use axum::Router;
use core_config::{env_parse, Environment, FromEnv, KafkaConfig, ServerConfig};
use domain_events::{
    events_router, EventPublisher, EventService, InMemoryEventRepository, PublishFailurePolicy,
    TopicSettings,
};
use domain_notifications::{EmailNotifier, EmailSettings, EventNotifier, SmtpProvider};
use domain_realtime::{realtime_router, EventBroadcaster, EventHub, HubSettings, RealtimeState};
use eyre::{Result, WrapErr};
use kafka_worker::{
    health_router, metrics, EventWorker, HealthState, KafkaProducer, KafkaRecordSource,
    MemoryBroker, RecordSink, RecordSource, RetryPolicy, RetryingSink, WorkerConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, warn, Level};

/// Grace period before the consumer subscribes
const DEFAULT_STARTUP_DELAY_MS: u64 = 5_000;

/// Everything the HTTP side and the consumer share
struct Pipeline {
    server: ServerConfig,
    kafka: KafkaConfig,
    topics: TopicSettings,
    startup_delay: Duration,
    stats_interval: Option<Duration>,
    hub: Arc<EventHub>,
    realtime: RealtimeState,
    dispatcher: Arc<EventDispatcher>,
}

/// Run the port events worker
///
/// This is the main entry point. It:
/// 1. Sets up structured logging and metrics
/// 2. Loads broker, topic, email and hub configuration
/// 3. Starts the consumer worker in the background
/// 4. Serves the event API, the hub and health endpoints until shutdown
///
/// # Errors
///
/// Returns an error if configuration is invalid, the Kafka clients cannot be
/// created or the HTTP listener cannot bind. A consumer failure after startup
/// is logged and does not stop the server.
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    metrics::init_metrics();

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "Starting port events worker"
    );
    info!("Environment: {:?}", environment);

    let server = ServerConfig::from_env().wrap_err("Failed to load server configuration")?;
    let kafka = KafkaConfig::from_env().wrap_err("Failed to load Kafka configuration")?;
    let topics = TopicSettings::from_env().wrap_err("Failed to load topic configuration")?;
    let email = EmailSettings::from_env().wrap_err("Failed to load email configuration")?;
    let hub_settings = HubSettings::from_env().wrap_err("Failed to load hub configuration")?;
    let startup_delay_ms: u64 = env_parse("CONSUMER_STARTUP_DELAY_MS", DEFAULT_STARTUP_DELAY_MS)
        .wrap_err("Failed to load consumer startup delay")?;

    let hub = Arc::new(
        EventHub::new(hub_settings.style).with_channel_capacity(hub_settings.channel_capacity),
    );
    let authorizer = hub_settings
        .authorizer()
        .wrap_err("Failed to parse HUB_ACCESS_TOKENS")?;
    let realtime = RealtimeState::new(hub.clone(), authorizer);

    let provider = SmtpProvider::new(&email).wrap_err("Failed to create SMTP transport")?;
    let notifier: Arc<dyn EventNotifier> = Arc::new(
        EmailNotifier::new(email, provider).wrap_err("Failed to create email notifier")?,
    );
    let broadcaster: Arc<dyn EventBroadcaster> = hub.clone();
    let dispatcher = Arc::new(EventDispatcher::new(topics.clone(), notifier, broadcaster));

    let pipeline = Pipeline {
        server,
        kafka,
        topics,
        startup_delay: Duration::from_millis(startup_delay_ms),
        stats_interval: hub_settings.stats_interval,
        hub,
        realtime,
        dispatcher,
    };

    if pipeline.kafka.is_memory() {
        warn!("KAFKA_BROKERS=memory: development only, events stay in this process and are never evicted");
        let broker = MemoryBroker::new();
        let source = broker.consumer(pipeline.kafka.group_id.clone());
        serve(pipeline, source, Arc::new(broker)).await
    } else {
        info!(brokers = %pipeline.kafka.brokers, group_id = %pipeline.kafka.group_id, "Using Kafka");
        let producer = KafkaProducer::new(&pipeline.kafka).wrap_err("Failed to create Kafka producer")?;
        let source =
            KafkaRecordSource::new(&pipeline.kafka).wrap_err("Failed to create Kafka consumer")?;
        let policy = RetryPolicy::from_config(&pipeline.kafka);
        serve(pipeline, source, Arc::new(RetryingSink::with_policy(producer, policy))).await
    }
}

/// Start the consumer and serve HTTP until a shutdown signal arrives
async fn serve<S>(pipeline: Pipeline, source: S, sink: Arc<dyn RecordSink>) -> Result<()>
where
    S: RecordSource + 'static,
{
    let Pipeline {
        server,
        kafka,
        topics,
        startup_delay,
        stats_interval,
        hub,
        realtime,
        dispatcher,
    } = pipeline;

    let worker_config = WorkerConfig::new(topics.all())
        .with_consumer_id(kafka.client_id.clone())
        .with_startup_delay(startup_delay);
    info!(
        topics = ?worker_config.topics,
        group_id = %kafka.group_id,
        startup_delay_ms = startup_delay.as_millis() as u64,
        "Worker configuration loaded"
    );

    let worker = Arc::new(EventWorker::new(source, dispatcher, worker_config));
    let health = HealthState::new(
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        kafka.group_id.clone(),
        topics.all(),
        worker.state(),
    );

    let service = EventService::new(InMemoryEventRepository::new())
        .with_publisher(EventPublisher::new(sink, topics))
        .with_publish_policy(PublishFailurePolicy::LogAndContinue);

    let app = build_router(health, realtime, service);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    if let Some(every) = stats_interval {
        let hub = hub.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { hub.publish_stats_every(every, shutdown).await });
    }

    let worker_task = {
        let worker = worker.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            match worker.run(shutdown).await {
                Ok(()) => info!("Event worker stopped"),
                Err(e) => error!(error = %e, critical = true, "Event worker stopped on fatal error; HTTP endpoints stay up"),
            }
        })
    };

    let addr = server.socket_addr().wrap_err("Invalid HOST/PORT")?;
    let listener = TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("Failed to bind server to {}", addr))?;
    info!(address = %addr, "Server listening");

    let mut server_shutdown = shutdown_rx;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .wrap_err("Server failed")?;

    if let Err(e) = worker_task.await {
        error!(error = %e, "Event worker task panicked");
    }
    info!(connections = hub.connection_count(), "Port events worker stopped");
    Ok(())
}

/// Assemble the HTTP surface
///
/// - `/health`, `/healthz`, `/ready`, `/readyz`, `/worker/info`, `/metrics`
/// - `/hubs/events` (WebSocket)
/// - `/events`, `/events/{id}`, `/events/{id}/acknowledge`
pub fn build_router(
    health: HealthState,
    realtime: RealtimeState,
    service: EventService<InMemoryEventRepository>,
) -> Router {
    health_router(health)
        .merge(realtime_router(realtime))
        .nest(
            "/events",
            events_router::<InMemoryEventRepository>().with_state(Arc::new(service)),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .wrap_err("Failed to install Ctrl+C handler")
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .wrap_err("Failed to install SIGTERM handler")?;
        sigterm.recv().await;
        Ok::<(), eyre::Report>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received Ctrl+C, initiating shutdown...");
        },
        result = terminate => {
            result?;
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
