use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::health::HealthSnapshot;
use crate::models::ApiResponse;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub registered_oracles: usize,
    #[serde(flatten)]
    pub fleet: HealthSnapshot,
}

pub async fn root() -> &'static str {
    "FlightSurety Oracle Server"
}

pub async fn api_info() -> Json<Value> {
    Json(json!({
        "message": "An API for use with your Dapp!"
    }))
}

/// 200 while the request subscription is up, 503 otherwise.
pub async fn health_check(State(app_state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let fleet = app_state.health.snapshot().await;
    let (code, status) = if fleet.listener_connected {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(HealthResponse {
            status,
            registered_oracles: app_state.registry.len(),
            fleet,
        }),
    )
}

pub async fn not_found() -> (StatusCode, Json<ApiResponse<()>>) {
    (StatusCode::NOT_FOUND, Json(ApiResponse::err("route not found")))
}
