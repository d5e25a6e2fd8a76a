use std::str::FromStr;

use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use jit_core::CallerIdentity;
use jit_domain::{OperatorRole, UserId};

use crate::dto::AssignRoleRequest;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn assign_role_handler(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(payload): Json<AssignRoleRequest>,
) -> ApiResult<StatusCode> {
    let user_id = UserId::new(payload.user_id)?;
    let role = OperatorRole::from_str(payload.role.as_str())?;

    state
        .authorization_service
        .assign_role(&caller, &user_id, role)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
