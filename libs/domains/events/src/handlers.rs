//! HTTP handlers for events API

use crate::error::EventError;
use crate::models::{CreateEvent, DomainEvent};
use crate::repository::EventRepository;
use crate::service::EventService;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Events router state
pub type EventsState<R> = Arc<EventService<R>>;

/// Create the events router
pub fn events_router<R: EventRepository + 'static>() -> Router<EventsState<R>> {
    Router::new()
        .route("/", post(create_event::<R>))
        .route("/{id}", get(get_event::<R>))
        .route("/{id}/acknowledge", post(acknowledge_event::<R>))
}

/// Record a new event
#[instrument(skip(state, create), fields(event_type = %create.event_type))]
pub async fn create_event<R: EventRepository>(
    State(state): State<EventsState<R>>,
    Json(create): Json<CreateEvent>,
) -> Result<impl IntoResponse, EventError> {
    let event = state.record(create).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Get event by ID
#[instrument(skip(state))]
pub async fn get_event<R: EventRepository>(
    State(state): State<EventsState<R>>,
    Path(id): Path<Uuid>,
) -> Result<Json<DomainEvent>, EventError> {
    let event = state.get_by_id(&id).await?;
    Ok(Json(event))
}

/// Acknowledge request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeRequest {
    pub acknowledged_by: String,
}

/// Acknowledge an event
#[instrument(skip(state, request))]
pub async fn acknowledge_event<R: EventRepository>(
    State(state): State<EventsState<R>>,
    Path(id): Path<Uuid>,
    Json(request): Json<AcknowledgeRequest>,
) -> Result<Json<DomainEvent>, EventError> {
    let event = state.acknowledge(&id, &request.acknowledged_by).await?;
    Ok(Json(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryEventRepository;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let service = Arc::new(EventService::new(InMemoryEventRepository::new()));
        Router::new()
            .nest("/events", events_router())
            .with_state(service)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_get_acknowledge() {
        let app = app();

        let response = app
            .clone()
            .oneshot(post_json(
                "/events",
                json!({
                    "eventType": "EquipmentFailure",
                    "severity": "Critical",
                    "title": "Crane 3 hydraulic failure",
                    "berthId": 42
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["category"], "Berth");
        assert_eq!(created["priority"], "Critical");
        let id = created["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(Request::builder().uri(format!("/events/{id}")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(post_json(
                &format!("/events/{id}/acknowledge"),
                json!({"acknowledgedBy": "harbour-master"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let acked = body_json(response).await;
        assert_eq!(acked["status"], "Acknowledged");
        assert_eq!(acked["acknowledgedBy"], "harbour-master");
    }

    #[tokio::test]
    async fn test_get_unknown_event_is_404() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri(format!("/events/{}", Uuid::now_v7()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "NotFound");
    }
}
