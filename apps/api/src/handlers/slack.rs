use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use jit_core::{AppError, CallerIdentity};
use serde::Serialize;

use crate::chat::{self, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::error::ApiResult;
use crate::state::AppState;

/// Reply rendered back into the channel, visible to the caller only.
#[derive(Debug, Serialize)]
pub struct SlackCommandResponse {
    response_type: &'static str,
    text: String,
}

#[derive(Debug, Default)]
struct SlashCommandForm {
    text: String,
    user_id: String,
    user_name: String,
}

pub async fn slack_command_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<SlackCommandResponse>> {
    let timestamp = header(&headers, TIMESTAMP_HEADER)?;
    let signature = header(&headers, SIGNATURE_HEADER)?;
    chat::verify_signature(
        &state.signing_secret,
        timestamp,
        &body,
        signature,
        state.clock.now().timestamp(),
    )?;

    let form = parse_form(&body);
    if form.user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id is required".to_owned()).into());
    }
    let caller = CallerIdentity::new(form.user_id.as_str(), form.user_name.as_str(), None);

    Ok(Json(SlackCommandResponse {
        response_type: "ephemeral",
        text: chat::respond(&state, &caller, &form.text).await,
    }))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized(format!("missing {name} header")))
}

fn parse_form(body: &[u8]) -> SlashCommandForm {
    let mut form = SlashCommandForm::default();
    for (key, value) in url::form_urlencoded::parse(body) {
        match key.as_ref() {
            "text" => form.text = value.into_owned(),
            "user_id" => form.user_id = value.into_owned(),
            "user_name" => form.user_name = value.into_owned(),
            _ => {}
        }
    }
    form
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_fields_are_decoded() {
        let form = parse_form(
            b"command=%2Fjit&text=request+dev-east-1+fix+%234217&user_id=U0000000001&user_name=dana&channel_id=C1",
        );

        assert_eq!(form.text, "request dev-east-1 fix #4217");
        assert_eq!(form.user_id, "U0000000001");
        assert_eq!(form.user_name, "dana");
    }
}
