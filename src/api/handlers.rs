//! HTTP request handlers
//!
//! Handlers stay thin: parse, call the planner, map the result.

use super::types::{
    AccommodationRequest, ActionsRequest, ActionsResponse, CreateSessionRequest, ErrorResponse, FlightsRequest,
    RejectionBody, SessionResponse, SuggestionsResponse, TransitionRequest, TravelResponse, TurnRequest,
    TurnResponse,
};
use super::AppState;
use crate::dispatch::DispatchPolicy;
use crate::error::EngineError;
use crate::session::{SessionPatch, TripInfoPatch};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/sessions", post(create_session))
        .route(
            "/api/sessions/:id",
            get(get_session).patch(update_session).delete(delete_session),
        )
        .route("/api/sessions/:id/trip", patch(patch_trip))
        .route("/api/sessions/:id/transition", post(transition))
        .route("/api/sessions/:id/actions", post(apply_actions))
        .route("/api/sessions/:id/turn", post(take_turn))
        .route("/api/sessions/:id/research", post(run_research))
        .route("/api/sessions/:id/activities", post(suggest_activities))
        .route("/api/sessions/:id/restaurants", post(suggest_restaurants))
        .route("/api/sessions/:id/accommodation", post(suggest_accommodation))
        .route("/api/sessions/:id/flights", post(suggest_flights))
        .route("/version", get(get_version))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================
// Sessions
// ============================================================

/// A request without a JSON body gets the defaults
fn optional_body<T: Default>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    match body {
        Ok(Json(req)) => Ok(req),
        Err(JsonRejection::MissingJsonContentType(_)) => Ok(T::default()),
        Err(rejection) => Err(rejection.into()),
    }
}

async fn create_session(
    State(state): State<AppState>,
    body: Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let req = optional_body(body)?;
    let session = state.planner.create(req.flow).await;
    Ok((StatusCode::CREATED, Json(SessionResponse { session })))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.planner.get(&id).await?;
    Ok(Json(SessionResponse { session }))
}

async fn update_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<SessionPatch>, JsonRejection>,
) -> Result<Json<SessionResponse>, AppError> {
    let Json(patch) = body?;
    let session = state.planner.update(&id, patch).await?;
    Ok(Json(SessionResponse { session }))
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, AppError> {
    state.planner.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn patch_trip(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<TripInfoPatch>, JsonRejection>,
) -> Result<Json<SessionResponse>, AppError> {
    let Json(patch) = body?;
    let session = state.planner.patch_trip(&id, patch).await?;
    Ok(Json(SessionResponse { session }))
}

async fn transition(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<TransitionRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, AppError> {
    let Json(req) = body?;
    let session = state.planner.transition(&id, &req.stage).await?;
    Ok(Json(SessionResponse { session }))
}

// ============================================================
// Actions and turns
// ============================================================

async fn apply_actions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ActionsRequest>, JsonRejection>,
) -> Result<Json<ActionsResponse>, AppError> {
    let Json(req) = body?;
    let policy = if req.atomic {
        DispatchPolicy::AllOrNothing
    } else {
        DispatchPolicy::Partial
    };
    let outcome = state.planner.apply_ui_actions(&id, &req.actions, policy).await?;
    Ok(Json(ActionsResponse {
        rejection: outcome.rejection.as_ref().map(RejectionBody::from),
        session: outcome.session,
        applied: outcome.applied,
    }))
}

async fn take_turn(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Json<TurnResponse>, AppError> {
    let Json(req) = body?;
    let outcome = state.planner.take_turn(&id, &req.message, &req.actions).await?;
    Ok(Json(TurnResponse {
        rejection: outcome.rejection.as_ref().map(RejectionBody::from),
        session: outcome.session,
        reply: outcome.reply,
        applied: outcome.applied,
        degraded: outcome.degraded,
    }))
}

// ============================================================
// Generation
// ============================================================

async fn run_research(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuggestionsResponse>, AppError> {
    let (session, summary) = state.planner.run_research(&id).await?;
    Ok(Json(SuggestionsResponse {
        session,
        merged: summary.into(),
        enrichment: None,
    }))
}

async fn suggest_activities(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuggestionsResponse>, AppError> {
    let outcome = state.planner.suggest_activities(&id).await?;
    Ok(Json(SuggestionsResponse {
        session: outcome.session,
        merged: outcome.merge.into(),
        enrichment: Some(outcome.enrichment.into()),
    }))
}

async fn suggest_restaurants(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let session = state.planner.suggest_restaurants(&id).await?;
    Ok(Json(SessionResponse { session }))
}

async fn suggest_accommodation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<AccommodationRequest>, JsonRejection>,
) -> Result<Json<TravelResponse>, AppError> {
    let req = optional_body(body)?;
    let outcome = state.planner.suggest_accommodation(&id, req.preference).await?;
    Ok(Json(TravelResponse {
        session: outcome.session,
        recommended: outcome.recommended,
    }))
}

async fn suggest_flights(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<FlightsRequest>, JsonRejection>,
) -> Result<Json<TravelResponse>, AppError> {
    let req = optional_body(body)?;
    let outcome = state.planner.suggest_flights(&id, req.cabin, req.preference).await?;
    Ok(Json(TravelResponse {
        session: outcome.session,
        recommended: outcome.recommended,
    }))
}

async fn get_version() -> &'static str {
    concat!("trip-planner ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

pub struct AppError(EngineError);

impl From<EngineError> for AppError {
    fn from(error: EngineError) -> Self {
        Self(error)
    }
}

/// Unreadable bodies are validation errors like any other bad input
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self(EngineError::validation(rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::TransitionRejected { .. } | EngineError::Conflict { .. } => StatusCode::CONFLICT,
            EngineError::Collaborator(_) => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        let body = Json(ErrorResponse::new(self.0.to_string(), self.0.kind()));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{Planner, FALLBACK_REPLY};
    use crate::providers::testing::{MockChatModel, MockPlaces, MockTravel};
    use crate::providers::{ProviderError, TextGenerator};
    use crate::session::clock::ManualClock;
    use crate::session::{InMemorySessionStore, TripLimits};
    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<MockChatModel>) {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(InMemorySessionStore::new(
            Duration::from_secs(1800),
            clock.clone(),
            TripLimits::default(),
        ));
        let model = Arc::new(MockChatModel::new("mock"));
        let generator = TextGenerator::new(model.clone()).with_retry(1, Duration::ZERO);
        let planner = Planner::new(
            store,
            generator,
            Arc::new(MockPlaces::new()),
            Arc::new(MockTravel::new()),
            clock,
        );
        (create_router(AppState::new(Arc::new(planner))), model)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn send_text(app: &Router, uri: &str, content_type: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn create(app: &Router) -> String {
        let (status, body) = send(app, Method::POST, "/api/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        body["session"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (app, _) = app();
        let id = create(&app).await;

        let (status, body) = send(&app, Method::GET, &format!("/api/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["workflowState"], "INFO_GATHERING");
        assert_eq!(body["session"]["flow"], "standard");

        let (status, body) =
            send(&app, Method::POST, "/api/sessions", Some(json!({"flow": "legacy"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["session"]["flow"], "legacy");
    }

    #[tokio::test]
    async fn test_error_kinds_map_to_status() {
        let (app, _) = app();
        let (status, body) = send(&app, Method::GET, "/api/sessions/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");

        let id = create(&app).await;
        let (status, body) = send(
            &app,
            Method::PATCH,
            &format!("/api/sessions/{id}/trip"),
            Some(json!({"startDate": "2025-06-03", "endDate": "2025-06-01"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/sessions/{id}/transition"),
            Some(json!({"stage": "REVIEW"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "transition_rejected");
    }

    #[tokio::test]
    async fn test_unreadable_bodies_are_validation_errors() {
        let (app, _) = app();
        let id = create(&app).await;

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/sessions/{id}/transition"),
            Some(json!({"stage": "PACKING"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");
        assert!(body["error"].as_str().unwrap().contains("PACKING"));

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/sessions/{id}/actions"),
            Some(json!({"actions": [{"action": "pack_suitcase"}]})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");

        let turn = format!("/api/sessions/{id}/turn");
        let (status, body) = send_text(&app, &turn, "application/json", "{\"message\":").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");

        let transition_uri = format!("/api/sessions/{id}/transition");
        let (status, body) = send_text(&app, &transition_uri, "text/plain", "REVIEW").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");

        let (status, body) = send(&app, Method::GET, &format!("/api/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["workflowState"], "INFO_GATHERING");
    }

    #[tokio::test]
    async fn test_collaborator_failure_is_bad_gateway() {
        let (app, model) = app();
        let id = create(&app).await;
        send(
            &app,
            Method::PATCH,
            &format!("/api/sessions/{id}/trip"),
            Some(json!({"destination": "Lisbon", "startDate": "2025-06-01", "endDate": "2025-06-03"})),
        )
        .await;

        model.queue_error(ProviderError::server_error("overloaded"));
        let (status, body) = send(&app, Method::POST, &format!("/api/sessions/{id}/research"), None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["kind"], "collaborator_failure");
    }

    #[tokio::test]
    async fn test_trip_patch_and_research() {
        let (app, model) = app();
        let id = create(&app).await;

        let (status, body) = send(
            &app,
            Method::PATCH,
            &format!("/api/sessions/{id}/trip"),
            Some(json!({"destination": "Lisbon", "startDate": "2025-06-01", "endDate": "2025-06-03"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["tripInfo"]["durationDays"], 3);

        model.queue_json(&json!({"options": [{"id": "o1", "title": "Alfama", "category": "neighborhood"}]}));
        let (status, body) = send(&app, Method::POST, &format!("/api/sessions/{id}/research"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["merged"]["added"], 1);
        assert_eq!(body["session"]["workflowState"], "INITIAL_RESEARCH");
    }

    #[tokio::test]
    async fn test_actions_report_partial_application() {
        let (app, _) = app();
        let id = create(&app).await;
        send(&app, Method::POST, &format!("/api/sessions/{id}/transition"), Some(json!({"stage": "INITIAL_RESEARCH"})))
            .await;

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/sessions/{id}/actions"),
            Some(json!({"actions": [
                {"action": "skip_flight"},
                {"action": "select_activities", "activity_ids": ["ghost"]},
                {"action": "skip_accommodation"}
            ]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["applied"], json!(["skip_flight"]));
        assert_eq!(body["rejection"]["index"], 1);
        assert_eq!(body["rejection"]["kind"], "validation");
        assert_eq!(body["session"]["flightChoice"]["type"], "skipped");
        assert!(body["session"]["accommodationChoice"].is_null());
    }

    #[tokio::test]
    async fn test_atomic_actions_keep_the_session() {
        let (app, _) = app();
        let id = create(&app).await;
        send(&app, Method::POST, &format!("/api/sessions/{id}/transition"), Some(json!({"stage": "INITIAL_RESEARCH"})))
            .await;

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/sessions/{id}/actions"),
            Some(json!({
                "atomic": true,
                "actions": [
                    {"action": "skip_flight"},
                    {"action": "select_activities", "activity_ids": ["ghost"]}
                ]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["applied"], json!([]));
        assert_eq!(body["rejection"]["index"], 1);
        assert!(body["session"]["flightChoice"].is_null());
    }

    #[tokio::test]
    async fn test_accommodation_and_flight_search() {
        let (app, _) = app();
        let id = create(&app).await;

        let (status, body) = send(&app, Method::POST, &format!("/api/sessions/{id}/accommodation"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");

        send(
            &app,
            Method::PATCH,
            &format!("/api/sessions/{id}/trip"),
            Some(json!({"destination": "Lisbon", "startDate": "2025-06-01", "endDate": "2025-06-03"})),
        )
        .await;
        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/sessions/{id}/accommodation"),
            Some(json!({"preference": "rating"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let options = body["session"]["accommodationOptions"].as_array().unwrap();
        assert!(!options.is_empty());
        let recommended = body["recommended"].as_str().unwrap();
        assert!(options.iter().any(|o| o["id"] == recommended));

        let (status, body) = send(&app, Method::POST, &format!("/api/sessions/{id}/flights"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/sessions/{id}/flights"),
            Some(json!({"cabin": "steerage"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "validation");
    }

    #[tokio::test]
    async fn test_turn_and_delete() {
        let (app, _) = app();
        let id = create(&app).await;

        let (status, body) = send(
            &app,
            Method::POST,
            &format!("/api/sessions/{id}/turn"),
            Some(json!({"message": "I want to go to Lisbon"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], FALLBACK_REPLY);
        assert_eq!(body["degraded"], true);
        assert_eq!(body["session"]["conversationHistory"].as_array().unwrap().len(), 2);

        let (status, _) = send(&app, Method::DELETE, &format!("/api/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::GET, &format!("/api/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_version() {
        let (app, _) = app();
        let response = app
            .oneshot(Request::builder().uri("/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).starts_with("trip-planner "));
    }
}
