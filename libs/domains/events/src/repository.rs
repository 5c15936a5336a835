//! Event repository trait and in-memory store

use crate::error::{EventError, Result};
use crate::models::DomainEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Repository trait for event storage operations
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Store a new event
    async fn create(&self, event: DomainEvent) -> Result<DomainEvent>;

    /// Get event by ID
    async fn get_by_id(&self, id: &Uuid) -> Result<Option<DomainEvent>>;

    /// Record an acknowledgement. The first one wins; later calls return
    /// the event unchanged.
    async fn acknowledge(&self, id: &Uuid, by: &str) -> Result<DomainEvent>;
}

/// Process-local event store
#[derive(Default)]
pub struct InMemoryEventRepository {
    events: RwLock<HashMap<Uuid, DomainEvent>>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn create(&self, event: DomainEvent) -> Result<DomainEvent> {
        let mut events = self.events.write().await;
        if events.contains_key(&event.id) {
            return Err(EventError::Storage {
                message: format!("duplicate event id {}", event.id),
            });
        }
        events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn get_by_id(&self, id: &Uuid) -> Result<Option<DomainEvent>> {
        Ok(self.events.read().await.get(id).cloned())
    }

    async fn acknowledge(&self, id: &Uuid, by: &str) -> Result<DomainEvent> {
        let mut events = self.events.write().await;
        let event = events
            .get_mut(id)
            .ok_or_else(|| EventError::NotFound { id: id.to_string() })?;
        event.acknowledge(by);
        Ok(event.clone())
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use mockall::mock;

    mock! {
        pub EventRepository {}

        #[async_trait]
        impl EventRepository for EventRepository {
            async fn create(&self, event: DomainEvent) -> Result<DomainEvent>;
            async fn get_by_id(&self, id: &Uuid) -> Result<Option<DomainEvent>>;
            async fn acknowledge(&self, id: &Uuid, by: &str) -> Result<DomainEvent>;
        }
    }
}
