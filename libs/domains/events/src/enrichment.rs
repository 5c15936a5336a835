//! Entity name lookup used to enrich event descriptions

use crate::models::{EntityKind, EntityRefs};
use async_trait::async_trait;
use std::collections::HashMap;

/// Read-only lookup of display names for referenced entities
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    /// Display name of an entity, `None` when unknown
    async fn entity_name(&self, kind: EntityKind, id: i64) -> Option<String>;
}

/// Directory that knows no names
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEnrichment;

#[async_trait]
impl EntityDirectory for NoEnrichment {
    async fn entity_name(&self, _kind: EntityKind, _id: i64) -> Option<String> {
        None
    }
}

/// Fixed name table, for local runs and tests
#[derive(Debug, Clone, Default)]
pub struct StaticEntityDirectory {
    names: HashMap<(EntityKind, i64), String>,
}

impl StaticEntityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, kind: EntityKind, id: i64, name: impl Into<String>) -> Self {
        self.names.insert((kind, id), name.into());
        self
    }
}

#[async_trait]
impl EntityDirectory for StaticEntityDirectory {
    async fn entity_name(&self, kind: EntityKind, id: i64) -> Option<String> {
        self.names.get(&(kind, id)).cloned()
    }
}

/// Resolve names for every referenced entity, e.g. `Ship: MSC Anna (#7)`.
/// Unknown entities are left out.
pub async fn describe_entities(directory: &dyn EntityDirectory, entities: &EntityRefs) -> Vec<String> {
    let mut lines = Vec::new();
    for (kind, id) in entities.iter() {
        if let Some(name) = directory.entity_name(kind, id).await {
            lines.push(format!("{kind}: {name} (#{id})"));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_describe_known_entities_only() {
        let directory = StaticEntityDirectory::new()
            .with_name(EntityKind::Ship, 7, "MSC Anna")
            .with_name(EntityKind::Berth, 42, "Berth North 2");
        let refs = EntityRefs {
            container_id: Some(1),
            ship_id: Some(7),
            berth_id: Some(42),
            port_id: None,
        };

        let lines = describe_entities(&directory, &refs).await;
        assert_eq!(lines, vec!["Ship: MSC Anna (#7)", "Berth: Berth North 2 (#42)"]);
    }

    #[tokio::test]
    async fn test_no_enrichment() {
        let lines = describe_entities(&NoEnrichment, &EntityRefs::ship(7)).await;
        assert!(lines.is_empty());
    }
}
