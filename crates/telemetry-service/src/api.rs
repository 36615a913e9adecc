use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use domain::DomainError;
use serde::Deserialize;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub to_state: String,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/equipment", get(list_equipment))
        .route("/api/equipment/{id}", get(get_equipment))
        .route("/api/equipment/{id}/trigger", post(trigger_transition))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.health().await)
}

async fn list_equipment(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.equipment())
}

async fn get_equipment(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> Response {
    match state.equipment().into_iter().find(|e| e.equipment_id == id) {
        Some(status) => Json(status).into_response(),
        None => error(StatusCode::NOT_FOUND, format!("equipment '{id}' not found")),
    }
}

async fn trigger_transition(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<TriggerRequest>,
) -> Response {
    let Some(simulator) = &state.simulator else {
        return error(StatusCode::CONFLICT, "simulator is not running in this role");
    };

    match simulator.trigger(&id, &request.to_state).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "status": "requested",
                "equipmentId": id,
                "toState": request.to_state,
            })),
        )
            .into_response(),
        Err(DomainError::EquipmentNotFound(_)) => {
            error(StatusCode::NOT_FOUND, format!("equipment '{id}' not found"))
        }
        Err(e @ DomainError::Validation(_)) => error(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}
