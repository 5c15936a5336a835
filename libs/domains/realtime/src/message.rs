//! Real-time wire messages.
//!
//! Client messages are camelCase (`{"type":"subscribeToCategories",...}`),
//! server messages keep the method names clients bind to (`ReceiveEvent`, ...).

use domain_events::DomainEvent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

/// Client-to-server message types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    SubscribeToCategories { categories: Vec<String> },
    UnsubscribeFromCategories { categories: Vec<String> },
    SubscribeToSeverities { severities: Vec<String> },
    UnsubscribeFromSeverities { severities: Vec<String> },
    GetConnectionCount,
}

/// Totals of events broadcast on the global channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStats {
    pub total_events: u64,
    pub by_severity: BTreeMap<String, u64>,
    pub by_category: BTreeMap<String, u64>,
}

/// Server-to-client message types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    ReceiveEvent { event: DomainEvent },
    ReceiveEventStats { stats: EventStats },
    ReceiveConnectionCount { count: usize },
    ContainerEvent { event: DomainEvent },
    BerthEvent { event: DomainEvent },
    PortEvent { event: DomainEvent },
    Alert { event: DomainEvent },
    AnalyticsUpdate { stats: EventStats },
    Error { message: String },
}

/// Which family of event messages a hub pushes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum HubMessageStyle {
    /// Every event as `ReceiveEvent`
    #[default]
    Events,
    /// Entity-specific messages, `Alert` for events that require action,
    /// `AnalyticsUpdate` for stats
    Logistics,
}

impl HubMessageStyle {
    pub fn event_message(&self, event: &DomainEvent) -> ServerMessage {
        let event = event.clone();
        match self {
            HubMessageStyle::Events => ServerMessage::ReceiveEvent { event },
            HubMessageStyle::Logistics => {
                if event.requires_action {
                    ServerMessage::Alert { event }
                } else if event.entities.container_id.is_some() {
                    ServerMessage::ContainerEvent { event }
                } else if event.entities.berth_id.is_some() {
                    ServerMessage::BerthEvent { event }
                } else {
                    ServerMessage::PortEvent { event }
                }
            }
        }
    }

    pub fn stats_message(&self, stats: EventStats) -> ServerMessage {
        match self {
            HubMessageStyle::Events => ServerMessage::ReceiveEventStats { stats },
            HubMessageStyle::Logistics => ServerMessage::AnalyticsUpdate { stats },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_events::{EntityRefs, Severity};
    use serde_json::json;

    #[test]
    fn test_client_message_wire_format() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "subscribeToCategories",
            "categories": ["Ship", "Container"]
        }))
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::SubscribeToCategories {
                categories: vec!["Ship".into(), "Container".into()]
            }
        );

        let msg: ClientMessage = serde_json::from_value(json!({"type": "getConnectionCount"})).unwrap();
        assert_eq!(msg, ClientMessage::GetConnectionCount);
    }

    #[test]
    fn test_server_message_wire_format() {
        let value = serde_json::to_value(ServerMessage::ReceiveConnectionCount { count: 3 }).unwrap();
        assert_eq!(value, json!({"type": "ReceiveConnectionCount", "count": 3}));

        let event = DomainEvent::new("ShipArrival", "Ship", Severity::Info, "arrived");
        let value = serde_json::to_value(ServerMessage::ReceiveEvent { event }).unwrap();
        assert_eq!(value["type"], "ReceiveEvent");
        assert_eq!(value["event"]["eventType"], "ShipArrival");
    }

    #[test]
    fn test_logistics_style_routing() {
        let style = HubMessageStyle::Logistics;
        let container = DomainEvent::new("ContainerLoading", "Container", Severity::Info, "loaded")
            .with_entities(EntityRefs::container(5));
        let berth = DomainEvent::new("BerthAssigned", "Berth", Severity::Low, "assigned")
            .with_entities(EntityRefs::berth(2));
        let alert = DomainEvent::new("EquipmentFailure", "Berth", Severity::Critical, "down")
            .with_entities(EntityRefs::berth(2));

        assert!(matches!(style.event_message(&container), ServerMessage::ContainerEvent { .. }));
        assert!(matches!(style.event_message(&berth), ServerMessage::BerthEvent { .. }));
        assert!(matches!(style.event_message(&alert), ServerMessage::Alert { .. }));
        assert!(matches!(
            HubMessageStyle::Events.event_message(&alert),
            ServerMessage::ReceiveEvent { .. }
        ));
        assert_eq!("logistics".parse::<HubMessageStyle>().unwrap(), style);

        let value = serde_json::to_value(style.stats_message(EventStats::default())).unwrap();
        assert_eq!(value["type"], "AnalyticsUpdate");
        assert_eq!(value["stats"]["totalEvents"], 0);
    }
}
