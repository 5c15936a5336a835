//! Bridge from the consumer to the email and real-time sinks.
//!
//! Each sink call is its own stage with its own result. A failing stage is
//! logged and recorded in the [`DispatchReport`]; it never stops the other
//! stages and never keeps the record from being committed.

use async_trait::async_trait;
use domain_events::{DomainEvent, Escalation, EventTopic, TopicSettings};
use domain_notifications::{EmailOutcome, EventNotifier};
use domain_realtime::{BroadcastReport, EventBroadcaster, HubError};
use kafka_worker::{EventHandler, RecordMeta, StreamError};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Result of one dispatch stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed,
    Skipped,
    Failed(String),
}

impl StageOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed(_))
    }

    fn label(&self) -> &'static str {
        match self {
            StageOutcome::Completed => "completed",
            StageOutcome::Skipped => "skipped",
            StageOutcome::Failed(_) => "failed",
        }
    }
}

/// Per-stage results for one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub topic: EventTopic,
    pub email: StageOutcome,
    pub broadcast: StageOutcome,
    pub category: StageOutcome,
    pub severity: StageOutcome,
}

impl DispatchReport {
    pub fn failed_stages(&self) -> Vec<&'static str> {
        [
            ("email", &self.email),
            ("broadcast", &self.broadcast),
            ("category", &self.category),
            ("severity", &self.severity),
        ]
        .into_iter()
        .filter(|(_, outcome)| outcome.is_failed())
        .map(|(stage, _)| stage)
        .collect()
    }
}

/// [`EventHandler`] that routes each consumed event to email escalation and the hub
pub struct EventDispatcher {
    topics: TopicSettings,
    notifier: Arc<dyn EventNotifier>,
    broadcaster: Arc<dyn EventBroadcaster>,
}

impl EventDispatcher {
    pub fn new(
        topics: TopicSettings,
        notifier: Arc<dyn EventNotifier>,
        broadcaster: Arc<dyn EventBroadcaster>,
    ) -> Self {
        Self {
            topics,
            notifier,
            broadcaster,
        }
    }

    /// Run every stage for `event` received on `topic`.
    ///
    /// Email and broadcasts run concurrently; this returns once all are done.
    #[instrument(skip(self, event), fields(event_id = %event.id, severity = %event.severity))]
    pub async fn dispatch(&self, topic: &str, event: &DomainEvent) -> DispatchReport {
        let topic = match self.topics.resolve(topic) {
            Some(topic) => topic,
            None => {
                warn!(topic, "Event from unknown topic, handling as port event");
                EventTopic::PortEvents
            }
        };

        let (email, broadcast, category, severity) = tokio::join!(
            self.email_stage(event),
            self.broadcast_stage(event),
            self.category_stage(event),
            self.severity_stage(event),
        );

        DispatchReport {
            topic,
            email,
            broadcast,
            category,
            severity,
        }
    }

    async fn email_stage(&self, event: &DomainEvent) -> StageOutcome {
        let result = match event.severity.escalation() {
            Escalation::CriticalAlert => self.notifier.send_critical_alert(event).await,
            Escalation::Notification => self.notifier.send_event_notification(event).await,
            Escalation::None => return StageOutcome::Skipped,
        };

        match result {
            Ok(EmailOutcome::Sent { .. }) => StageOutcome::Completed,
            Ok(EmailOutcome::Skipped(reason)) => {
                debug!(?reason, "Email stage skipped");
                StageOutcome::Skipped
            }
            Err(e) => {
                error!(stage = "email", error = %e, "Email escalation failed");
                StageOutcome::Failed(e.to_string())
            }
        }
    }

    async fn broadcast_stage(&self, event: &DomainEvent) -> StageOutcome {
        broadcast_outcome("broadcast", self.broadcaster.broadcast_event(event).await)
    }

    async fn category_stage(&self, event: &DomainEvent) -> StageOutcome {
        if event.category.trim().is_empty() {
            return StageOutcome::Skipped;
        }
        broadcast_outcome(
            "category",
            self.broadcaster
                .broadcast_event_to_category(&event.category, event)
                .await,
        )
    }

    async fn severity_stage(&self, event: &DomainEvent) -> StageOutcome {
        broadcast_outcome(
            "severity",
            self.broadcaster
                .broadcast_event_to_severity(event.severity, event)
                .await,
        )
    }
}

fn broadcast_outcome(stage: &'static str, result: Result<BroadcastReport, HubError>) -> StageOutcome {
    match result {
        Ok(report) => {
            if report.failed > 0 {
                warn!(stage, delivered = report.delivered, failed = report.failed, "Partial broadcast");
            }
            StageOutcome::Completed
        }
        Err(e) => {
            error!(stage, error = %e, "Broadcast failed");
            StageOutcome::Failed(e.to_string())
        }
    }
}

#[async_trait]
impl EventHandler<DomainEvent> for EventDispatcher {
    async fn handle(&self, meta: &RecordMeta, event: DomainEvent) -> Result<(), StreamError> {
        let report = self.dispatch(&meta.topic, &event).await;

        for (stage, outcome) in [
            ("email", &report.email),
            ("broadcast", &report.broadcast),
            ("category", &report.category),
            ("severity", &report.severity),
        ] {
            counter!("dispatch_stages_total", "stage" => stage, "outcome" => outcome.label()).increment(1);
        }

        let failed = report.failed_stages();
        match report.topic {
            EventTopic::PortEvents => info!(
                event_id = %event.id,
                event_type = %event.event_type,
                offset = meta.offset,
                failed_stages = ?failed,
                "Port event dispatched"
            ),
            EventTopic::ContainerEvents => info!(
                event_id = %event.id,
                event_type = %event.event_type,
                container_id = ?event.entities.container_id,
                offset = meta.offset,
                failed_stages = ?failed,
                "Container event dispatched"
            ),
        }

        // Sink failures are best-effort; the record is still committed
        Ok(())
    }

    fn name(&self) -> &'static str {
        "event-dispatcher"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_events::{EntityRefs, Severity};
    use domain_notifications::{NotificationError, NotificationResult, SkipReason};
    use mockall::mock;

    mock! {
        pub Notifier {}

        #[async_trait]
        impl EventNotifier for Notifier {
            async fn send_event_notification(&self, event: &DomainEvent) -> NotificationResult<EmailOutcome>;
            async fn send_critical_alert(&self, event: &DomainEvent) -> NotificationResult<EmailOutcome>;
        }
    }

    mock! {
        pub Broadcaster {}

        #[async_trait]
        impl EventBroadcaster for Broadcaster {
            async fn broadcast_event(&self, event: &DomainEvent) -> Result<BroadcastReport, HubError>;
            async fn broadcast_event_to_category(
                &self,
                category: &str,
                event: &DomainEvent,
            ) -> Result<BroadcastReport, HubError>;
            async fn broadcast_event_to_severity(
                &self,
                severity: Severity,
                event: &DomainEvent,
            ) -> Result<BroadcastReport, HubError>;
        }
    }

    fn sent() -> NotificationResult<EmailOutcome> {
        Ok(EmailOutcome::Sent {
            message_id: None,
            recipients: 1,
        })
    }

    fn ok_broadcaster() -> MockBroadcaster {
        let mut broadcaster = MockBroadcaster::new();
        broadcaster
            .expect_broadcast_event()
            .returning(|_| Ok(BroadcastReport::default()));
        broadcaster
            .expect_broadcast_event_to_category()
            .returning(|_, _| Ok(BroadcastReport::default()));
        broadcaster
            .expect_broadcast_event_to_severity()
            .returning(|_, _| Ok(BroadcastReport::default()));
        broadcaster
    }

    fn dispatcher(notifier: MockNotifier, broadcaster: MockBroadcaster) -> EventDispatcher {
        EventDispatcher::new(TopicSettings::default(), Arc::new(notifier), Arc::new(broadcaster))
    }

    #[tokio::test]
    async fn test_critical_event_sends_alert_and_broadcasts() {
        let mut notifier = MockNotifier::new();
        notifier.expect_send_critical_alert().times(1).returning(|_| sent());
        notifier.expect_send_event_notification().never();

        let mut broadcaster = MockBroadcaster::new();
        broadcaster
            .expect_broadcast_event()
            .times(1)
            .returning(|_| Ok(BroadcastReport::default()));
        broadcaster
            .expect_broadcast_event_to_category()
            .withf(|category, _| category.to_string() == "Berth")
            .times(1)
            .returning(|_, _| Ok(BroadcastReport::default()));
        broadcaster
            .expect_broadcast_event_to_severity()
            .withf(|severity, _| *severity == Severity::Critical)
            .times(1)
            .returning(|_, _| Ok(BroadcastReport::default()));

        let event = DomainEvent::new("EquipmentFailure", "Berth", Severity::Critical, "Crane down")
            .with_entities(EntityRefs::berth(42));
        let report = dispatcher(notifier, broadcaster).dispatch("port-events", &event).await;

        assert_eq!(report.topic, EventTopic::PortEvents);
        assert_eq!(report.email, StageOutcome::Completed);
        assert!(report.failed_stages().is_empty());
    }

    #[tokio::test]
    async fn test_severity_escalation_paths() {
        let mut notifier = MockNotifier::new();
        notifier.expect_send_event_notification().times(1).returning(|_| sent());
        notifier.expect_send_critical_alert().never();
        let dispatcher = dispatcher(notifier, ok_broadcaster());

        let high = DomainEvent::new("Delay", "Ship", Severity::High, "late");
        assert_eq!(dispatcher.dispatch("port-events", &high).await.email, StageOutcome::Completed);

        for severity in [Severity::Medium, Severity::Low, Severity::Info] {
            let event = DomainEvent::new("Update", "Ship", severity, "fyi");
            assert_eq!(dispatcher.dispatch("port-events", &event).await.email, StageOutcome::Skipped);
        }
    }

    #[tokio::test]
    async fn test_stage_failures_are_isolated() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send_critical_alert()
            .returning(|_| Err(NotificationError::Transport("connection refused".into())));

        let mut broadcaster = MockBroadcaster::new();
        broadcaster
            .expect_broadcast_event()
            .returning(|_| Err(HubError::Broadcast("hub down".into())));
        broadcaster
            .expect_broadcast_event_to_category()
            .returning(|_, _| Ok(BroadcastReport::default()));
        broadcaster
            .expect_broadcast_event_to_severity()
            .returning(|_, _| Ok(BroadcastReport::default()));

        let dispatcher = dispatcher(notifier, broadcaster);
        let event = DomainEvent::new("Fire", "Port", Severity::Critical, "fire");
        let report = dispatcher.dispatch("port-events", &event).await;
        assert_eq!(report.failed_stages(), vec!["email", "broadcast"]);
        assert_eq!(report.category, StageOutcome::Completed);

        let meta = RecordMeta {
            topic: "port-events".into(),
            partition: 0,
            offset: 7,
            key: None,
            timestamp: None,
        };
        assert!(dispatcher.handle(&meta, event).await.is_ok());
    }

    #[tokio::test]
    async fn test_topic_decoding_and_empty_category() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_send_event_notification()
            .returning(|_| Ok(EmailOutcome::Skipped(SkipReason::NotConfigured)));

        let mut broadcaster = MockBroadcaster::new();
        broadcaster
            .expect_broadcast_event()
            .returning(|_| Ok(BroadcastReport::default()));
        broadcaster.expect_broadcast_event_to_category().never();
        broadcaster
            .expect_broadcast_event_to_severity()
            .returning(|_, _| Ok(BroadcastReport::default()));

        let dispatcher = dispatcher(notifier, broadcaster);
        let event = DomainEvent::new("Inspection", "", Severity::High, "customs")
            .with_entities(EntityRefs::container(9));

        let report = dispatcher.dispatch("container-events", &event).await;
        assert_eq!(report.topic, EventTopic::ContainerEvents);
        assert_eq!(report.email, StageOutcome::Skipped);
        assert_eq!(report.category, StageOutcome::Skipped);

        let report = dispatcher.dispatch("legacy-events", &event).await;
        assert_eq!(report.topic, EventTopic::PortEvents);
    }
}
