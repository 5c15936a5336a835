//! Event domain models

use chrono::{DateTime, Utc};
use core_config::{env_or_default, ConfigError, FromEnv};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

/// Event severity levels, ordered from least to most urgent
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(from = "SeverityWire")]
#[strum(ascii_case_insensitive)]
pub enum Severity {
    Info,
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// What the email sink does with an event of a given severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// High-priority alert template
    CriticalAlert,
    /// Standard notification template
    Notification,
    /// No email
    None,
}

impl Severity {
    /// Parse a severity name; anything unrecognized becomes `Medium`.
    pub fn parse_lenient(value: &str) -> Self {
        value.trim().parse().unwrap_or_default()
    }

    pub fn requires_action(&self) -> bool {
        *self >= Severity::High
    }

    pub fn escalation(&self) -> Escalation {
        match self {
            Severity::Critical => Escalation::CriticalAlert,
            Severity::High => Escalation::Notification,
            Severity::Medium | Severity::Low | Severity::Info => Escalation::None,
        }
    }
}

/// Severity as older producers may write it: a name or an ordinal (0 = Info)
#[derive(Deserialize)]
#[serde(untagged)]
enum SeverityWire {
    Name(String),
    Level(i64),
    Other(#[allow(dead_code)] serde::de::IgnoredAny),
}

impl From<SeverityWire> for Severity {
    fn from(value: SeverityWire) -> Self {
        match value {
            SeverityWire::Name(name) => Self::parse_lenient(&name),
            SeverityWire::Level(level) => usize::try_from(level)
                .ok()
                .and_then(|index| Severity::iter().nth(index))
                .unwrap_or_default(),
            SeverityWire::Other(_) => Severity::default(),
        }
    }
}

/// Entity kinds an event can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EntityKind {
    Container,
    Ship,
    Berth,
    Port,
}

/// Optional references to the entities an event concerns.
///
/// Any combination is valid, including none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRefs {
    pub container_id: Option<i64>,
    pub ship_id: Option<i64>,
    pub berth_id: Option<i64>,
    pub port_id: Option<i64>,
}

impl EntityRefs {
    pub fn container(id: i64) -> Self {
        Self {
            container_id: Some(id),
            ..Self::default()
        }
    }

    pub fn ship(id: i64) -> Self {
        Self {
            ship_id: Some(id),
            ..Self::default()
        }
    }

    pub fn berth(id: i64) -> Self {
        Self {
            berth_id: Some(id),
            ..Self::default()
        }
    }

    pub fn port(id: i64) -> Self {
        Self {
            port_id: Some(id),
            ..Self::default()
        }
    }

    /// Set references in container, ship, berth, port order
    pub fn iter(&self) -> impl Iterator<Item = (EntityKind, i64)> {
        [
            (EntityKind::Container, self.container_id),
            (EntityKind::Ship, self.ship_id),
            (EntityKind::Berth, self.berth_id),
            (EntityKind::Port, self.port_id),
        ]
        .into_iter()
        .filter_map(|(kind, id)| id.map(|id| (kind, id)))
    }

    /// The entity used for partitioning: first set reference
    pub fn primary(&self) -> Option<(EntityKind, i64)> {
        self.iter().next()
    }

    /// Partition key for the primary entity
    pub fn primary_key(&self) -> Option<String> {
        self.primary().map(|(_, id)| id.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.primary().is_none()
    }
}

/// Derived acknowledgement status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum EventStatus {
    Active,
    Acknowledged,
}

/// Canonical domain event shared by producer and consumer.
///
/// Serialized through [`EventEnvelope`], which carries the duplicated
/// field names downstream clients key off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "EventEnvelope", try_from = "EventEnvelope")]
pub struct DomainEvent {
    pub id: Uuid,
    pub event_type: String,
    pub category: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub source: String,
    pub entities: EntityRefs,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    pub requires_action: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
}

impl DomainEvent {
    /// Create a new event with an auto-generated id and the current time
    pub fn new(
        event_type: impl Into<String>,
        category: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: event_type.into(),
            category: category.into(),
            severity,
            title: title.into(),
            description: String::new(),
            source: String::new(),
            entities: EntityRefs::default(),
            timestamp: Utc::now(),
            requires_action: severity.requires_action(),
            acknowledged_at: None,
            acknowledged_by: None,
        }
    }

    /// Builder: set description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: set originating subsystem
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Builder: set entity references
    pub fn with_entities(mut self, entities: EntityRefs) -> Self {
        self.entities = entities;
        self
    }

    /// Builder: set custom timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn status(&self) -> EventStatus {
        if self.acknowledged_at.is_some() {
            EventStatus::Acknowledged
        } else {
            EventStatus::Active
        }
    }

    /// Record the first acknowledgement. Returns false if already acknowledged.
    pub fn acknowledge(&mut self, by: impl Into<String>) -> bool {
        if self.acknowledged_at.is_some() {
            return false;
        }
        self.acknowledged_at = Some(Utc::now());
        self.acknowledged_by = Some(by.into());
        true
    }

    /// Broker key: primary entity id, or the event id when no entity is set
    pub fn partition_key(&self) -> String {
        self.entities
            .primary_key()
            .unwrap_or_else(|| self.id.to_string())
    }
}

/// JSON wire form of a [`DomainEvent`].
///
/// Additive-only: unknown fields are ignored on read and every pair of
/// duplicated names is written with the same value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(default)]
    pub event_id: Option<Uuid>,
    pub event_type: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub port_id: Option<i64>,
    #[serde(default)]
    pub ship_id: Option<i64>,
    #[serde(default)]
    pub container_id: Option<i64>,
    #[serde(default)]
    pub berth_id: Option<i64>,
    #[serde(default)]
    pub priority: Option<Severity>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub requires_action: Option<bool>,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub acknowledged_by: Option<String>,
}

/// Reasons an envelope cannot become a [`DomainEvent`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope has neither id nor eventId")]
    MissingId,
    #[error("envelope has neither timestamp nor eventTime")]
    MissingTimestamp,
}

impl From<DomainEvent> for EventEnvelope {
    fn from(event: DomainEvent) -> Self {
        Self {
            id: Some(event.id),
            event_id: Some(event.id),
            status: Some(event.status().to_string()),
            event_type: event.event_type,
            category: event.category,
            title: event.title,
            description: event.description,
            timestamp: Some(event.timestamp),
            event_time: Some(event.timestamp),
            source: event.source,
            port_id: event.entities.port_id,
            ship_id: event.entities.ship_id,
            container_id: event.entities.container_id,
            berth_id: event.entities.berth_id,
            priority: Some(event.severity),
            severity: Some(event.severity),
            requires_action: Some(event.requires_action),
            acknowledged_at: event.acknowledged_at,
            acknowledged_by: event.acknowledged_by,
        }
    }
}

impl TryFrom<EventEnvelope> for DomainEvent {
    type Error = EnvelopeError;

    fn try_from(envelope: EventEnvelope) -> Result<Self, Self::Error> {
        let id = envelope
            .id
            .or(envelope.event_id)
            .ok_or(EnvelopeError::MissingId)?;
        let timestamp = envelope
            .timestamp
            .or(envelope.event_time)
            .ok_or(EnvelopeError::MissingTimestamp)?;
        let severity = envelope
            .severity
            .or(envelope.priority)
            .unwrap_or_default();

        // acknowledgedBy without acknowledgedAt is not an acknowledgement
        let acknowledged_by = envelope.acknowledged_at.and(envelope.acknowledged_by);

        Ok(Self {
            id,
            event_type: envelope.event_type,
            category: envelope.category,
            severity,
            title: envelope.title,
            description: envelope.description,
            source: envelope.source,
            entities: EntityRefs {
                container_id: envelope.container_id,
                ship_id: envelope.ship_id,
                berth_id: envelope.berth_id,
                port_id: envelope.port_id,
            },
            timestamp,
            // derived like status; the wire flag is informational only
            requires_action: severity.requires_action(),
            acknowledged_at: envelope.acknowledged_at,
            acknowledged_by,
        })
    }
}

/// DTO for recording new events
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEvent {
    /// Event type tag, e.g. "ShipArrival"
    #[validate(length(min = 1, max = 100, message = "eventType must be 1-100 characters"))]
    pub event_type: String,

    /// Routing category; derived from the primary entity when empty
    #[serde(default)]
    #[validate(length(max = 100, message = "category must be at most 100 characters"))]
    pub category: String,

    #[serde(default)]
    pub severity: Severity,

    #[validate(length(min = 1, max = 255, message = "title must be 1-255 characters"))]
    pub title: String,

    #[serde(default)]
    #[validate(length(max = 10000, message = "description must be at most 10000 characters"))]
    pub description: String,

    #[serde(default)]
    pub source: String,

    #[serde(flatten)]
    pub entities: EntityRefs,

    /// Custom timestamp (defaults to now if not provided)
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<CreateEvent> for DomainEvent {
    fn from(create: CreateEvent) -> Self {
        let category = if create.category.trim().is_empty() {
            create
                .entities
                .primary()
                .map(|(kind, _)| kind.to_string())
                .unwrap_or_else(|| "System".to_string())
        } else {
            create.category
        };

        let mut event = DomainEvent::new(create.event_type, category, create.severity, create.title)
            .with_description(create.description)
            .with_source(create.source)
            .with_entities(create.entities);
        if let Some(timestamp) = create.timestamp {
            event = event.with_timestamp(timestamp);
        }
        event
    }
}

/// Logical topics. Wire names come from [`TopicSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EventTopic {
    PortEvents,
    ContainerEvents,
}

impl EventTopic {
    /// Container-bearing events go to the container topic, all others to the port topic.
    pub fn for_event(event: &DomainEvent) -> Self {
        if event.entities.container_id.is_some() {
            EventTopic::ContainerEvents
        } else {
            EventTopic::PortEvents
        }
    }
}

/// Configured topic names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSettings {
    pub port_events: String,
    pub container_events: String,
}

impl TopicSettings {
    pub fn new(port_events: impl Into<String>, container_events: impl Into<String>) -> Self {
        Self {
            port_events: port_events.into(),
            container_events: container_events.into(),
        }
    }

    /// Wire name of a logical topic
    pub fn name(&self, topic: EventTopic) -> &str {
        match topic {
            EventTopic::PortEvents => &self.port_events,
            EventTopic::ContainerEvents => &self.container_events,
        }
    }

    /// Decode a wire name; `None` for topics this service does not know
    pub fn resolve(&self, name: &str) -> Option<EventTopic> {
        if name == self.port_events {
            Some(EventTopic::PortEvents)
        } else if name == self.container_events {
            Some(EventTopic::ContainerEvents)
        } else {
            None
        }
    }

    /// All wire names, for subscription
    pub fn all(&self) -> Vec<String> {
        vec![self.port_events.clone(), self.container_events.clone()]
    }
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self::new("port-events", "container-events")
    }
}

impl FromEnv for TopicSettings {
    /// - KAFKA_PORT_EVENTS_TOPIC: defaults to port-events
    /// - KAFKA_CONTAINER_EVENTS_TOPIC: defaults to container-events
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(
            env_or_default("KAFKA_PORT_EVENTS_TOPIC", "port-events"),
            env_or_default("KAFKA_CONTAINER_EVENTS_TOPIC", "container-events"),
        ))
    }
}
