//! WebSocket endpoint for the event hub.

use crate::auth::{ConnectionAuthorizer, Principal};
use crate::error::HubError;
use crate::hub::{ConnectionId, EventHub};
use crate::message::{ClientMessage, ServerMessage};
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared state of the real-time endpoint
#[derive(Clone)]
pub struct RealtimeState {
    pub hub: Arc<EventHub>,
    pub authorizer: Arc<dyn ConnectionAuthorizer>,
}

impl RealtimeState {
    pub fn new(hub: Arc<EventHub>, authorizer: Arc<dyn ConnectionAuthorizer>) -> Self {
        Self { hub, authorizer }
    }
}

/// Query parameters for WebSocket connection.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Router exposing the hub at `/hubs/events`
pub fn realtime_router(state: RealtimeState) -> Router {
    Router::new()
        .route("/hubs/events", get(ws_handler))
        .with_state(state)
}

/// WebSocket upgrade handler. Authorization runs before the upgrade.
pub async fn ws_handler(
    State(state): State<RealtimeState>,
    Query(query): Query<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let principal = match state.authorizer.authorize(query.access_token.as_deref()).await {
        Ok(principal) => principal,
        Err(e) => {
            warn!(error = %e, "Rejected real-time connection");
            return e.into_response();
        }
    };

    match ws {
        Ok(ws) => {
            let hub = state.hub.clone();
            ws.on_upgrade(move |socket| handle_socket(socket, hub, principal))
        }
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_socket(socket: WebSocket, hub: Arc<EventHub>, principal: Principal) {
    let (id, mut outbound) = register(&hub, principal);
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!(connection_id = %id, error = %e, "Failed to serialize message"),
            }
        }
    });

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if let Some(reply) = handle_client_text(&hub, id, text.as_str()) {
                    if let Err(e) = hub.send_to(id, reply) {
                        warn!(connection_id = %id, error = %e, "Failed to reply to client");
                    }
                }
            }
            Ok(Message::Close(_)) => {
                info!(connection_id = %id, "WebSocket close requested");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(connection_id = %id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    send_task.abort();
    unregister(&hub, id);
}

/// Register a socket and tell every client the new count
fn register(hub: &EventHub, principal: Principal) -> (ConnectionId, mpsc::Receiver<ServerMessage>) {
    let connection = hub.connect(principal);
    hub.broadcast_connection_count();
    connection
}

fn unregister(hub: &EventHub, id: ConnectionId) {
    if hub.disconnect(id) {
        hub.broadcast_connection_count();
    }
}

/// Apply one client frame to the hub. Returns the direct reply, if any.
pub fn handle_client_text(hub: &EventHub, id: ConnectionId, text: &str) -> Option<ServerMessage> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(connection_id = %id, error = %e, "Failed to parse client message");
            return Some(ServerMessage::Error {
                message: HubError::InvalidMessage(e.to_string()).to_string(),
            });
        }
    };
    debug!(connection_id = %id, ?message, "Client message");

    let result = match message {
        ClientMessage::SubscribeToCategories { categories } => hub.subscribe_to_categories(id, &categories),
        ClientMessage::UnsubscribeFromCategories { categories } => {
            hub.unsubscribe_from_categories(id, &categories)
        }
        ClientMessage::SubscribeToSeverities { severities } => hub.subscribe_to_severities(id, &severities),
        ClientMessage::UnsubscribeFromSeverities { severities } => {
            hub.unsubscribe_from_severities(id, &severities)
        }
        ClientMessage::GetConnectionCount => {
            return Some(ServerMessage::ReceiveConnectionCount {
                count: hub.connection_count(),
            });
        }
    };

    result.err().map(|e| ServerMessage::Error { message: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenAuthorizer;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[test]
    fn test_client_frames() {
        let hub = EventHub::default();
        let (id, _rx) = hub.connect(Principal::anonymous());

        let reply = handle_client_text(&hub, id, r#"{"type":"subscribeToCategories","categories":["Ship","Ship"]}"#);
        assert!(reply.is_none());
        handle_client_text(&hub, id, r#"{"type":"subscribeToSeverities","severities":["Critical"]}"#);
        assert_eq!(hub.groups(id).unwrap(), vec!["Category_Ship", "Severity_Critical"]);

        assert_eq!(
            handle_client_text(&hub, id, r#"{"type":"getConnectionCount"}"#),
            Some(ServerMessage::ReceiveConnectionCount { count: 1 })
        );
        assert!(matches!(
            handle_client_text(&hub, id, "not json"),
            Some(ServerMessage::Error { .. })
        ));
    }

    #[test]
    fn test_connection_count_pushed_on_join_and_leave() {
        let hub = EventHub::default();
        let (first, mut first_rx) = register(&hub, Principal::anonymous());
        assert_eq!(first_rx.try_recv().unwrap(), ServerMessage::ReceiveConnectionCount { count: 1 });

        let (second, mut second_rx) = register(&hub, Principal::anonymous());
        assert_eq!(first_rx.try_recv().unwrap(), ServerMessage::ReceiveConnectionCount { count: 2 });
        assert_eq!(second_rx.try_recv().unwrap(), ServerMessage::ReceiveConnectionCount { count: 2 });

        unregister(&hub, second);
        assert_eq!(first_rx.try_recv().unwrap(), ServerMessage::ReceiveConnectionCount { count: 1 });
        unregister(&hub, second);
        assert!(first_rx.try_recv().is_err());

        unregister(&hub, first);
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let authorizer = StaticTokenAuthorizer::parse("abc=ops").unwrap();
        let app = realtime_router(RealtimeState::new(Arc::new(EventHub::default()), Arc::new(authorizer)));

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/hubs/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        // valid token passes authorization; a plain request then fails the upgrade
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/hubs/events?access_token=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.status().is_client_error());
    }
}
