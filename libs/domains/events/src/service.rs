//! Event service layer

use crate::enrichment::{describe_entities, EntityDirectory, NoEnrichment};
use crate::error::{EventError, Result};
use crate::models::{CreateEvent, DomainEvent};
use crate::publisher::EventPublisher;
use crate::repository::EventRepository;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// What `record` does when the event was stored but could not be published
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PublishFailurePolicy {
    /// Return the publish error to the caller
    #[default]
    Fail,
    /// Log and return the stored event
    LogAndContinue,
}

/// Event service that coordinates storage, enrichment and publishing
pub struct EventService<R: EventRepository> {
    repository: R,
    directory: Arc<dyn EntityDirectory>,
    publisher: Option<Arc<EventPublisher>>,
    policy: PublishFailurePolicy,
}

impl<R: EventRepository> EventService<R> {
    /// Create a new event service with storage only
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            directory: Arc::new(NoEnrichment),
            publisher: None,
            policy: PublishFailurePolicy::default(),
        }
    }

    /// Add an entity directory for description enrichment
    pub fn with_directory(mut self, directory: Arc<dyn EntityDirectory>) -> Self {
        self.directory = directory;
        self
    }

    /// Add broker publishing
    pub fn with_publisher(mut self, publisher: EventPublisher) -> Self {
        self.publisher = Some(Arc::new(publisher));
        self
    }

    /// Set the publish failure policy
    pub fn with_publish_policy(mut self, policy: PublishFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build, enrich, persist and publish a new event
    #[instrument(skip(self, create), fields(event_type = %create.event_type))]
    pub async fn record(&self, create: CreateEvent) -> Result<DomainEvent> {
        create.validate()?;

        let mut event: DomainEvent = create.into();
        let names = describe_entities(self.directory.as_ref(), &event.entities).await;
        if !names.is_empty() {
            let joined = names.join("\n");
            event.description = if event.description.is_empty() {
                joined
            } else {
                format!("{}\n\n{}", event.description, joined)
            };
        }

        let event = self.repository.create(event).await?;
        info!(event_id = %event.id, severity = %event.severity, "Event stored");

        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish_event(&event).await {
                match self.policy {
                    PublishFailurePolicy::Fail => return Err(e.into()),
                    PublishFailurePolicy::LogAndContinue => {
                        warn!(event_id = %event.id, error = %e, "Event stored but not published");
                    }
                }
            }
        }

        Ok(event)
    }

    /// Get event by ID
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, id: &Uuid) -> Result<DomainEvent> {
        self.repository
            .get_by_id(id)
            .await?
            .ok_or_else(|| EventError::NotFound { id: id.to_string() })
    }

    /// Acknowledge an event. The first acknowledgement is kept.
    #[instrument(skip(self))]
    pub async fn acknowledge(&self, id: &Uuid, by: &str) -> Result<DomainEvent> {
        if by.trim().is_empty() {
            return Err(EventError::Validation {
                message: "acknowledgedBy must not be empty".to_string(),
            });
        }
        let event = self.repository.acknowledge(id, by).await?;
        info!(event_id = %event.id, acknowledged_by = ?event.acknowledged_by, "Event acknowledged");
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::StaticEntityDirectory;
    use crate::error::PublishError;
    use crate::models::{EntityKind, EntityRefs, Severity, TopicSettings};
    use crate::repository::mock::MockEventRepository;
    use crate::repository::InMemoryEventRepository;
    use kafka_worker::MemoryBroker;

    fn create(severity: Severity, entities: EntityRefs) -> CreateEvent {
        CreateEvent {
            event_type: "ShipArrival".to_string(),
            category: "Ship".to_string(),
            severity,
            title: "Arrival".to_string(),
            description: "Docked early".to_string(),
            source: "berth-planner".to_string(),
            entities,
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_record_enriches_persists_and_publishes() {
        let broker = MemoryBroker::new();
        let directory = StaticEntityDirectory::new().with_name(EntityKind::Ship, 7, "MSC Anna");
        let service = EventService::new(InMemoryEventRepository::new())
            .with_directory(Arc::new(directory))
            .with_publisher(EventPublisher::new(Arc::new(broker.clone()), TopicSettings::default()));

        let event = service.record(create(Severity::High, EntityRefs::ship(7))).await.unwrap();

        assert!(event.description.contains("MSC Anna"));
        assert!(event.requires_action);
        assert_eq!(service.get_by_id(&event.id).await.unwrap().id, event.id);
        assert_eq!(broker.record_count("port-events").await, 1);
    }

    #[tokio::test]
    async fn test_validation_rejects_empty_title() {
        let service = EventService::new(InMemoryEventRepository::new());
        let mut bad = create(Severity::Info, EntityRefs::default());
        bad.title = String::new();

        let err = service.record(bad).await.unwrap_err();
        assert!(matches!(err, EventError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_publish_failure_policy() {
        let broker = MemoryBroker::new();
        let publisher = EventPublisher::new(Arc::new(broker.clone()), TopicSettings::default());

        let failing = EventService::new(InMemoryEventRepository::new()).with_publisher(publisher.clone());
        broker.fail_next_sends(1).await;
        let err = failing
            .record(create(Severity::Info, EntityRefs::ship(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::Publish(PublishError::Delivery { .. })));

        let lenient = EventService::new(InMemoryEventRepository::new())
            .with_publisher(publisher)
            .with_publish_policy(PublishFailurePolicy::LogAndContinue);
        broker.fail_next_sends(1).await;
        let event = lenient
            .record(create(Severity::Info, EntityRefs::ship(1)))
            .await
            .unwrap();
        assert_eq!(lenient.get_by_id(&event.id).await.unwrap().id, event.id);
    }

    #[tokio::test]
    async fn test_storage_failure_skips_publish() {
        let broker = MemoryBroker::new();
        let mut repo = MockEventRepository::new();
        repo.expect_create().returning(|_| {
            Err(EventError::Storage {
                message: "disk full".to_string(),
            })
        });

        let service = EventService::new(repo)
            .with_publisher(EventPublisher::new(Arc::new(broker.clone()), TopicSettings::default()));
        assert!(service.record(create(Severity::Critical, EntityRefs::berth(42))).await.is_err());
        assert_eq!(broker.record_count("port-events").await, 0);
    }

    #[tokio::test]
    async fn test_acknowledge() {
        let service = EventService::new(InMemoryEventRepository::new());
        let event = service.record(create(Severity::High, EntityRefs::ship(3))).await.unwrap();

        let acked = service.acknowledge(&event.id, "ops").await.unwrap();
        assert_eq!(acked.acknowledged_by.as_deref(), Some("ops"));
        assert!(service.acknowledge(&event.id, " ").await.is_err());
        assert!(service.acknowledge(&Uuid::now_v7(), "ops").await.is_err());
    }
}
