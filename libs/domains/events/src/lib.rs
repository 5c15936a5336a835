//! Events Domain
//!
//! Canonical port/logistics domain events and everything needed to raise them:
//! - Event model and its JSON wire envelope
//! - Topic routing (`port-events` / `container-events`)
//! - Kafka publishing through a `RecordSink`
//! - Event service: enrich, persist, publish, acknowledge
//!
//! # Architecture
//!
//! ```text
//! HTTP POST /events ─► EventService ─┬─► EventRepository (persist)
//!                                    │
//!                                    └─► EventPublisher ─► Kafka topic
//!                                                            │
//!                                                            ▼
//!                                                      events worker
//! ```

mod enrichment;
mod error;
mod handlers;
mod models;
mod publisher;
mod repository;
mod service;

pub use enrichment::{describe_entities, EntityDirectory, NoEnrichment, StaticEntityDirectory};
pub use error::{EventError, PublishError, Result};
pub use handlers::{events_router, AcknowledgeRequest, EventsState};
pub use models::{
    CreateEvent, DomainEvent, EntityKind, EntityRefs, EnvelopeError, Escalation, EventEnvelope,
    EventStatus, EventTopic, Severity, TopicSettings,
};
pub use publisher::EventPublisher;
pub use repository::{EventRepository, InMemoryEventRepository};
pub use service::{EventService, PublishFailurePolicy};
