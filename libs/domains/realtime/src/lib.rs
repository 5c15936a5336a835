//! Realtime Domain
//!
//! In-process fan-out of port events to WebSocket clients.
//!
//! Each connection can join category groups (`Category_Ship`) and severity
//! groups (`Severity_Critical`). Events are pushed to everyone, to a category
//! group or to a severity group. Delivery is best-effort: a slow or dropped
//! client is logged and counted, never surfaced to the caller.
//!
//! ```text
//! EventDispatcher ─► EventHub ─┬─► conn-1 (mpsc) ─► WebSocket
//!                              ├─► conn-2 (mpsc) ─► WebSocket
//!                              └─► ...
//! ```

mod auth;
mod config;
mod error;
mod hub;
mod message;
mod ws;

pub use auth::{AllowAnonymous, ConnectionAuthorizer, Principal, StaticTokenAuthorizer};
pub use config::HubSettings;
pub use error::HubError;
pub use hub::{
    category_group, severity_group, BroadcastReport, ConnectionEntry, ConnectionId, EventBroadcaster,
    EventHub, DEFAULT_CHANNEL_CAPACITY,
};
pub use message::{ClientMessage, EventStats, HubMessageStyle, ServerMessage};
pub use ws::{handle_client_text, realtime_router, ws_handler, RealtimeState, WsQuery};
