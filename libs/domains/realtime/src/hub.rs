//! Connection registry and group fan-out.

use crate::auth::Principal;
use crate::error::HubError;
use crate::message::{EventStats, HubMessageStyle, ServerMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use domain_events::{DomainEvent, Severity};
use metrics::{counter, gauge};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Default per-connection outbound queue size
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn generate() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Group key for a category, e.g. `Category_Ship`
pub fn category_group(category: &str) -> String {
    format!("Category_{}", category.trim())
}

/// Group key for a severity, e.g. `Severity_High`.
/// Known severity names are normalized to their canonical spelling.
pub fn severity_group(severity: &str) -> String {
    let name = severity.trim();
    match name.parse::<Severity>() {
        Ok(parsed) => format!("Severity_{parsed}"),
        Err(_) => format!("Severity_{name}"),
    }
}

/// Registry entry for one live connection
#[derive(Debug)]
pub struct ConnectionEntry {
    pub principal: Principal,
    pub connected_at: DateTime<Utc>,
    groups: HashSet<String>,
    sender: mpsc::Sender<ServerMessage>,
}

impl ConnectionEntry {
    pub fn groups(&self) -> &HashSet<String> {
        &self.groups
    }
}

/// Outcome of one broadcast. Failures are per connection and never abort the rest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Fan-out target used by the event pipeline
#[async_trait]
pub trait EventBroadcaster: Send + Sync {
    /// Push to every connection.
    async fn broadcast_event(&self, event: &DomainEvent) -> Result<BroadcastReport, HubError>;

    /// Push to connections in `Category_<category>`.
    async fn broadcast_event_to_category(
        &self,
        category: &str,
        event: &DomainEvent,
    ) -> Result<BroadcastReport, HubError>;

    /// Push to connections in `Severity_<severity>`.
    async fn broadcast_event_to_severity(
        &self,
        severity: Severity,
        event: &DomainEvent,
    ) -> Result<BroadcastReport, HubError>;
}

/// In-process fan-out hub.
///
/// Owns all subscription state. Safe for concurrent connect, disconnect and
/// broadcast without external locking.
#[derive(Debug)]
pub struct EventHub {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    style: HubMessageStyle,
    channel_capacity: usize,
    total_events: AtomicU64,
    by_severity: DashMap<String, u64>,
    by_category: DashMap<String, u64>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(HubMessageStyle::default())
    }
}

impl EventHub {
    pub fn new(style: HubMessageStyle) -> Self {
        Self {
            connections: DashMap::new(),
            style,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            total_events: AtomicU64::new(0),
            by_severity: DashMap::new(),
            by_category: DashMap::new(),
        }
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn style(&self) -> HubMessageStyle {
        self.style
    }

    /// Register a connection. The receiver yields everything pushed to it.
    pub fn connect(&self, principal: Principal) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
        let id = ConnectionId::generate();
        let (sender, receiver) = mpsc::channel(self.channel_capacity);
        info!(connection_id = %id, subject = %principal.subject, "Client connected");

        self.connections.insert(
            id,
            ConnectionEntry {
                principal,
                connected_at: Utc::now(),
                groups: HashSet::new(),
                sender,
            },
        );
        gauge!("realtime_connections").set(self.connections.len() as f64);
        (id, receiver)
    }

    /// Remove a connection and all its group memberships.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let removed = self.connections.remove(&id).is_some();
        if removed {
            info!(connection_id = %id, "Client disconnected");
            gauge!("realtime_connections").set(self.connections.len() as f64);
        }
        removed
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Sorted group keys of a connection
    pub fn groups(&self, id: ConnectionId) -> Option<Vec<String>> {
        self.connections.get(&id).map(|entry| {
            let mut groups: Vec<String> = entry.groups.iter().cloned().collect();
            groups.sort();
            groups
        })
    }

    pub fn subscribe_to_categories(&self, id: ConnectionId, categories: &[String]) -> Result<(), HubError> {
        self.join(id, categories.iter().map(String::as_str), category_group)
    }

    pub fn unsubscribe_from_categories(&self, id: ConnectionId, categories: &[String]) -> Result<(), HubError> {
        self.leave(id, categories.iter().map(String::as_str), category_group)
    }

    pub fn subscribe_to_severities(&self, id: ConnectionId, severities: &[String]) -> Result<(), HubError> {
        self.join(id, severities.iter().map(String::as_str), severity_group)
    }

    pub fn unsubscribe_from_severities(&self, id: ConnectionId, severities: &[String]) -> Result<(), HubError> {
        self.leave(id, severities.iter().map(String::as_str), severity_group)
    }

    fn join<'a>(
        &self,
        id: ConnectionId,
        names: impl Iterator<Item = &'a str>,
        group: fn(&str) -> String,
    ) -> Result<(), HubError> {
        let mut entry = self
            .connections
            .get_mut(&id)
            .ok_or(HubError::UnknownConnection(id))?;
        for name in names.filter(|n| !n.trim().is_empty()) {
            let key = group(name);
            if entry.groups.insert(key.clone()) {
                debug!(connection_id = %id, group = %key, "Joined group");
            }
        }
        Ok(())
    }

    fn leave<'a>(
        &self,
        id: ConnectionId,
        names: impl Iterator<Item = &'a str>,
        group: fn(&str) -> String,
    ) -> Result<(), HubError> {
        let mut entry = self
            .connections
            .get_mut(&id)
            .ok_or(HubError::UnknownConnection(id))?;
        for name in names.filter(|n| !n.trim().is_empty()) {
            let key = group(name);
            if entry.groups.remove(&key) {
                debug!(connection_id = %id, group = %key, "Left group");
            }
        }
        Ok(())
    }

    /// Push a message to one connection.
    pub fn send_to(&self, id: ConnectionId, message: ServerMessage) -> Result<(), HubError> {
        let entry = self
            .connections
            .get(&id)
            .ok_or(HubError::UnknownConnection(id))?;
        entry
            .sender
            .try_send(message)
            .map_err(|e| HubError::Broadcast(e.to_string()))
    }

    /// Push to every connection and count the event in the stats.
    pub fn broadcast_event(&self, event: &DomainEvent) -> BroadcastReport {
        self.record_stats(event);
        self.fan_out("all", None, self.style.event_message(event))
    }

    pub fn broadcast_event_to_category(&self, category: &str, event: &DomainEvent) -> BroadcastReport {
        if category.trim().is_empty() {
            return BroadcastReport::default();
        }
        let group = category_group(category);
        self.fan_out("category", Some(&group), self.style.event_message(event))
    }

    pub fn broadcast_event_to_severity(&self, severity: Severity, event: &DomainEvent) -> BroadcastReport {
        let group = severity_group(&severity.to_string());
        self.fan_out("severity", Some(&group), self.style.event_message(event))
    }

    pub fn event_stats(&self) -> EventStats {
        let snapshot = |map: &DashMap<String, u64>| {
            map.iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect::<BTreeMap<_, _>>()
        };
        EventStats {
            total_events: self.total_events.load(Ordering::Relaxed),
            by_severity: snapshot(&self.by_severity),
            by_category: snapshot(&self.by_category),
        }
    }

    /// Push the current stats to every connection.
    pub fn broadcast_stats(&self) -> BroadcastReport {
        let message = self.style.stats_message(self.event_stats());
        self.fan_out("stats", None, message)
    }

    /// Push `ReceiveConnectionCount` to every connection.
    pub fn broadcast_connection_count(&self) -> BroadcastReport {
        let count = self.connection_count();
        self.fan_out("connection_count", None, ServerMessage::ReceiveConnectionCount { count })
    }

    /// Push stats every `every` while new events keep arriving, until `shutdown` flips.
    ///
    /// Ticks with no connected clients or no new events push nothing.
    pub async fn publish_stats_every(&self, every: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut published_total = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let total = self.total_events.load(Ordering::Relaxed);
                    if total != published_total && self.connection_count() > 0 {
                        published_total = total;
                        self.broadcast_stats();
                    }
                }
                _ = shutdown.wait_for(|stop| *stop) => break,
            }
        }
        debug!("Stats publisher stopped");
    }

    fn record_stats(&self, event: &DomainEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        *self.by_severity.entry(event.severity.to_string()).or_insert(0) += 1;
        if !event.category.is_empty() {
            *self.by_category.entry(event.category.clone()).or_insert(0) += 1;
        }
    }

    fn fan_out(&self, scope: &'static str, group: Option<&str>, message: ServerMessage) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut closed = Vec::new();

        for entry in self.connections.iter() {
            if let Some(group) = group {
                if !entry.groups.contains(group) {
                    continue;
                }
            }
            match entry.sender.try_send(message.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.failed += 1;
                    warn!(connection_id = %entry.key(), scope, "Client queue full, dropping message");
                }
                Err(TrySendError::Closed(_)) => {
                    report.failed += 1;
                    warn!(connection_id = %entry.key(), scope, "Client channel closed");
                    closed.push(*entry.key());
                }
            }
        }

        // Removal must happen after the iterator guard is released
        for id in closed {
            self.disconnect(id);
        }

        counter!("realtime_broadcast_deliveries_total", "scope" => scope).increment(report.delivered as u64);
        if report.failed > 0 {
            counter!("realtime_broadcast_failures_total", "scope" => scope).increment(report.failed as u64);
        }
        debug!(scope, group = ?group, delivered = report.delivered, failed = report.failed, "Broadcast complete");
        report
    }
}

#[async_trait]
impl EventBroadcaster for EventHub {
    async fn broadcast_event(&self, event: &DomainEvent) -> Result<BroadcastReport, HubError> {
        Ok(EventHub::broadcast_event(self, event))
    }

    async fn broadcast_event_to_category(
        &self,
        category: &str,
        event: &DomainEvent,
    ) -> Result<BroadcastReport, HubError> {
        Ok(EventHub::broadcast_event_to_category(self, category, event))
    }

    async fn broadcast_event_to_severity(
        &self,
        severity: Severity,
        event: &DomainEvent,
    ) -> Result<BroadcastReport, HubError> {
        Ok(EventHub::broadcast_event_to_severity(self, severity, event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn event(category: &str, severity: Severity) -> DomainEvent {
        DomainEvent::new("Test", category, severity, "test event")
    }

    #[test]
    fn test_connect_and_disconnect() {
        let hub = EventHub::default();
        let (a, _rx_a) = hub.connect(Principal::anonymous());
        let (b, _rx_b) = hub.connect(Principal::anonymous());
        assert_ne!(a, b);
        assert_eq!(hub.connection_count(), 2);

        hub.subscribe_to_categories(a, &names(&["Ship"])).unwrap();
        assert!(hub.disconnect(a));
        assert!(!hub.disconnect(a));
        assert_eq!(hub.groups(a), None);
        assert_eq!(hub.connection_count(), 1);
        assert!(matches!(
            hub.subscribe_to_categories(a, &names(&["Ship"])),
            Err(HubError::UnknownConnection(_))
        ));
    }

    #[test]
    fn test_category_group_isolation() {
        let hub = EventHub::default();
        let (ship, mut ship_rx) = hub.connect(Principal::anonymous());
        hub.subscribe_to_categories(ship, &names(&["Ship"])).unwrap();

        let report = hub.broadcast_event_to_category("Container", &event("Container", Severity::Info));
        assert_eq!(report, BroadcastReport { delivered: 0, failed: 0 });
        assert!(ship_rx.try_recv().is_err());

        assert_eq!(hub.broadcast_event_to_category("Ship", &event("Ship", Severity::Info)).delivered, 1);
        assert!(ship_rx.try_recv().is_ok());

        assert_eq!(hub.broadcast_event(&event("Container", Severity::Info)).delivered, 1);
        assert!(ship_rx.try_recv().is_ok());
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let hub = EventHub::default();
        let (id, mut rx) = hub.connect(Principal::anonymous());

        hub.subscribe_to_categories(id, &names(&["Ship", "Ship"])).unwrap();
        hub.subscribe_to_categories(id, &names(&["Ship", " "])).unwrap();
        assert_eq!(hub.groups(id).unwrap(), vec!["Category_Ship"]);

        assert_eq!(hub.broadcast_event_to_category("Ship", &event("Ship", Severity::Low)).delivered, 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_severity_groups() {
        let hub = EventHub::default();
        let (high, mut high_rx) = hub.connect(Principal::anonymous());
        let (critical, mut critical_rx) = hub.connect(Principal::anonymous());
        hub.subscribe_to_severities(high, &names(&["high"])).unwrap();
        hub.subscribe_to_severities(critical, &names(&["Critical"])).unwrap();
        assert_eq!(hub.groups(high).unwrap(), vec!["Severity_High"]);

        let e = event("Port", Severity::High);
        assert_eq!(hub.broadcast_event_to_severity(Severity::High, &e).delivered, 1);
        assert!(high_rx.try_recv().is_ok());
        assert!(critical_rx.try_recv().is_err());

        hub.unsubscribe_from_severities(high, &names(&["High"])).unwrap();
        assert_eq!(hub.broadcast_event_to_severity(Severity::High, &e).delivered, 0);
    }

    #[test]
    fn test_failed_connection_does_not_block_others() {
        let hub = EventHub::default().with_channel_capacity(1);
        let (_full, _full_rx) = hub.connect(Principal::anonymous());
        let (_gone, gone_rx) = hub.connect(Principal::anonymous());
        let (_ok, mut ok_rx) = hub.connect(Principal::anonymous());
        drop(gone_rx);

        hub.broadcast_event(&event("Port", Severity::Info));
        // first queue is now full, second is closed
        ok_rx.try_recv().unwrap();
        let report = hub.broadcast_event(&event("Port", Severity::Info));

        assert_eq!(report, BroadcastReport { delivered: 1, failed: 1 });
        assert_eq!(hub.connection_count(), 2);
    }

    #[test]
    fn test_stats_and_connection_count() {
        let hub = EventHub::default();
        let (_id, mut rx) = hub.connect(Principal::anonymous());

        hub.broadcast_event(&event("Ship", Severity::High));
        hub.broadcast_event(&event("Ship", Severity::Info));
        hub.broadcast_event_to_category("Ship", &event("Ship", Severity::Info));

        let stats = hub.event_stats();
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.by_category.get("Ship"), Some(&2));
        assert_eq!(stats.by_severity.get("High"), Some(&1));

        while rx.try_recv().is_ok() {}
        hub.broadcast_connection_count();
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::ReceiveConnectionCount { count: 1 });
        hub.broadcast_stats();
        assert!(matches!(rx.try_recv().unwrap(), ServerMessage::ReceiveEventStats { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stats_pushed_only_after_new_events() {
        let hub = std::sync::Arc::new(EventHub::default());
        let (_id, mut rx) = hub.connect(Principal::anonymous());
        let (stop, stop_rx) = watch::channel(false);
        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.publish_stats_every(Duration::from_secs(10), stop_rx).await })
        };

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(rx.try_recv().is_err());

        hub.broadcast_event(&event("Berth", Severity::Critical));
        assert!(matches!(rx.try_recv().unwrap(), ServerMessage::ReceiveEvent { .. }));
        tokio::time::sleep(Duration::from_secs(10)).await;
        match rx.try_recv().unwrap() {
            ServerMessage::ReceiveEventStats { stats } => assert_eq!(stats.total_events, 1),
            other => panic!("expected stats, got {other:?}"),
        }

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(rx.try_recv().is_err());

        stop.send(true).unwrap();
        publisher.await.unwrap();
    }
}
