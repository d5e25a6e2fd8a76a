use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use jit_core::CallerIdentity;

use crate::dto::{ClusterRequest, ClusterResponse};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_clusters_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
) -> ApiResult<Json<Vec<ClusterResponse>>> {
    let clusters = state
        .cluster_service
        .list(&caller)
        .await?
        .into_iter()
        .map(ClusterResponse::from)
        .collect();

    Ok(Json(clusters))
}

pub async fn create_cluster_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(payload): Json<ClusterRequest>,
) -> ApiResult<(StatusCode, Json<ClusterResponse>)> {
    let cluster = state
        .cluster_service
        .create(&caller, payload.into())
        .await?;

    Ok((StatusCode::CREATED, Json(ClusterResponse::from(cluster))))
}

pub async fn get_cluster_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(cluster_id): Path<String>,
) -> ApiResult<Json<ClusterResponse>> {
    let cluster = state.cluster_service.get(&caller, &cluster_id).await?;

    Ok(Json(ClusterResponse::from(cluster)))
}

pub async fn update_cluster_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(cluster_id): Path<String>,
    Json(payload): Json<ClusterRequest>,
) -> ApiResult<Json<ClusterResponse>> {
    let cluster = state
        .cluster_service
        .update(&caller, &cluster_id, payload.into())
        .await?;

    Ok(Json(ClusterResponse::from(cluster)))
}

pub async fn delete_cluster_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(cluster_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.cluster_service.delete(&caller, &cluster_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
