use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use jit_core::{AppError, CallerIdentity};

use crate::error::ApiResult;

/// Header carrying the authenticated caller's chat user id.
pub const CALLER_ID_HEADER: &str = "x-jit-user-id";
/// Optional header carrying the caller's display name.
pub const CALLER_NAME_HEADER: &str = "x-jit-user-name";

pub async fn require_caller(mut request: Request, next: Next) -> ApiResult<Response> {
    let identity = caller_from_headers(request.headers())?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

pub async fn enforce_timeout(
    State(limit): State<Duration>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    tokio::time::timeout(limit, next.run(request))
        .await
        .map_err(|_| AppError::Transient("request timed out".to_owned()).into())
}

fn caller_from_headers(headers: &HeaderMap) -> Result<CallerIdentity, AppError> {
    let subject = headers
        .get(CALLER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Unauthorized("caller identity required".to_owned()))?;
    let display_name = headers
        .get(CALLER_NAME_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(subject);

    Ok(CallerIdentity::new(subject, display_name, None))
}
