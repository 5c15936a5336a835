//! Port Events Worker - Entry Point
//!
//! Consumes port and container events from Kafka and fans them out to
//! email escalation and WebSocket subscribers.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    port_events_worker::run().await
}
