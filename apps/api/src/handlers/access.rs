use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use jit_application::{AccessListFilter, CreateAccessRequestInput};
use jit_core::CallerIdentity;
use jit_domain::ApprovalOutcome;

use crate::dto::{
    AccessIdQuery, AccessIdRequest, AccessListQuery, AccessRequestResponse, ApproveAccessRequest,
    ApproveAccessResponse, CleanupRequest, DenyAccessRequest, GrantAccessRequest,
    SweepReportResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn grant_access_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(payload): Json<GrantAccessRequest>,
) -> ApiResult<(StatusCode, Json<AccessRequestResponse>)> {
    let request = state
        .access_request_service
        .create(
            &caller,
            CreateAccessRequestInput {
                cluster: payload.cluster,
                reason: payload.reason,
                duration: payload.duration,
                permissions: payload.permissions,
                namespaces: payload.namespaces,
                approvers: payload.approvers,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AccessRequestResponse::from(request)),
    ))
}

pub async fn revoke_access_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(payload): Json<AccessIdRequest>,
) -> ApiResult<Json<AccessRequestResponse>> {
    let request = state
        .access_request_service
        .revoke(&caller, &payload.access_id)
        .await?;

    Ok(Json(AccessRequestResponse::from(request)))
}

pub async fn approve_access_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(payload): Json<ApproveAccessRequest>,
) -> ApiResult<Json<ApproveAccessResponse>> {
    let (request, outcome) = state
        .access_request_service
        .approve(&caller, &payload.access_id, payload.comment)
        .await?;

    Ok(Json(ApproveAccessResponse {
        recorded: outcome == ApprovalOutcome::Recorded,
        request: AccessRequestResponse::from(request),
    }))
}

pub async fn deny_access_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(payload): Json<DenyAccessRequest>,
) -> ApiResult<Json<AccessRequestResponse>> {
    let request = state
        .access_request_service
        .deny(&caller, &payload.access_id, payload.reason)
        .await?;

    Ok(Json(AccessRequestResponse::from(request)))
}

pub async fn list_access_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Query(query): Query<AccessListQuery>,
) -> ApiResult<Json<Vec<AccessRequestResponse>>> {
    let requests = state
        .access_request_service
        .list(
            &caller,
            AccessListFilter {
                user_id: query.user_id,
                cluster_id: query.cluster_id,
                active: query.active,
            },
        )
        .await?
        .into_iter()
        .map(AccessRequestResponse::from)
        .collect();

    Ok(Json(requests))
}

pub async fn access_status_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Query(query): Query<AccessIdQuery>,
) -> ApiResult<Json<AccessRequestResponse>> {
    let request = state.access_request_service.get(&caller, &query.id).await?;

    Ok(Json(AccessRequestResponse::from(request)))
}

pub async fn kubeconfig_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Query(query): Query<AccessIdQuery>,
) -> ApiResult<impl IntoResponse> {
    let document = state
        .access_request_service
        .kubeconfig(&caller, &query.id)
        .await?;

    Ok(([(CONTENT_TYPE, "application/yaml")], document))
}

pub async fn cleanup_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(payload): Json<CleanupRequest>,
) -> ApiResult<Json<SweepReportResponse>> {
    let report = state
        .access_request_service
        .run_cleanup(&caller, &payload.cluster)
        .await?;

    Ok(Json(SweepReportResponse::from(report)))
}

pub async fn delete_access_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(access_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .access_request_service
        .delete(&caller, &access_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
