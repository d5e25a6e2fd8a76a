use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;

use crate::dto::{DependencyStatus, HealthResponse, ReadyResponse};
use crate::state::AppState;

pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn ready_handler(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let storage = match state.cluster_repository.list().await {
        Ok(_) => DependencyStatus {
            status: "ok",
            detail: None,
        },
        Err(error) => DependencyStatus {
            status: "error",
            detail: Some(format!("storage check failed: {error}")),
        },
    };

    let ready = storage.status == "ok";
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            status: if ready { "ok" } else { "degraded" },
            storage,
        }),
    )
}
