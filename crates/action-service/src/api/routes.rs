use super::error::ApiError;
use crate::recognition::plugin_info;
use crate::state::ActionServiceState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::actions::{ActionResult, SessionInfo, SessionListResponse, VideoFrame};
use serde_json::json;
use std::collections::HashMap;

/// Feed one frame of a stream; the session is created on first use
pub async fn submit_frame(
    State(state): State<ActionServiceState>,
    Path(session_id): Path<String>,
    Json(frame): Json<VideoFrame>,
) -> Result<Json<ActionResult>, ApiError> {
    let result = state.process_frame(&session_id, frame).await?;
    Ok(Json(result))
}

/// Start a new sequence on a stream
pub async fn reset_session(
    State(state): State<ActionServiceState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    Ok(Json(state.reset(&session_id).await?))
}

/// Partially update a stream's parameters from a string map
pub async fn update_params(
    State(state): State<ActionServiceState>,
    Path(session_id): Path<String>,
    Json(updates): Json<HashMap<String, String>>,
) -> Result<Json<SessionInfo>, ApiError> {
    Ok(Json(state.reconfigure(&session_id, updates).await?))
}

pub async fn get_session(
    State(state): State<ActionServiceState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    Ok(Json(state.session_info(&session_id).await?))
}

pub async fn list_sessions(State(state): State<ActionServiceState>) -> impl IntoResponse {
    let sessions = state.list_sessions().await;
    Json(SessionListResponse { sessions })
}

pub async fn remove_session(
    State(state): State<ActionServiceState>,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.remove_session(&session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Model metadata and label count
pub async fn info(State(state): State<ActionServiceState>) -> impl IntoResponse {
    Json(plugin_info(state.labels().len()))
}

/// Health check endpoint
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "action-service"
        })),
    )
}

/// Readiness check endpoint
pub async fn readyz(State(state): State<ActionServiceState>) -> impl IntoResponse {
    let model = state.default_params().model_name.clone();
    if state.is_ready() {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "node_id": state.node_id(),
                "model": model
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "not ready",
                "node_id": state.node_id(),
                "model": model
            })),
        )
    }
}

/// Metrics endpoint (Prometheus format)
pub async fn metrics() -> impl IntoResponse {
    match telemetry::metrics::encode_text() {
        Ok(body) => body.into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}
