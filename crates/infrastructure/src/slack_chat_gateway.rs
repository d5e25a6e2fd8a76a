//! Slack Web API chat gateway.

use async_trait::async_trait;
use jit_application::ChatGateway;
use jit_core::{AppError, AppResult};
use jit_domain::{EmailAddress, UserId};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

/// Default Slack Web API base URL.
pub const DEFAULT_SLACK_API_BASE_URL: &str = "https://slack.com/api";

#[derive(Debug, Default, Deserialize)]
struct SlackEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    user: Option<SlackUser>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackUser {
    #[serde(default)]
    profile: SlackProfile,
}

#[derive(Debug, Default, Deserialize)]
struct SlackProfile {
    #[serde(default)]
    email: Option<String>,
}

/// Chat gateway posting direct messages through the Slack Web API.
#[derive(Clone)]
pub struct SlackChatGateway {
    http_client: reqwest::Client,
    api_base_url: String,
    token: String,
}

impl SlackChatGateway {
    /// Creates a gateway authenticating with a bot token.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        api_base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_owned(),
            token: token.into(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base_url)
    }

    async fn read_response(
        method: &str,
        response: Result<reqwest::Response, reqwest::Error>,
    ) -> AppResult<SlackEnvelope> {
        let response = response.map_err(|error| {
            AppError::Transient(format!("slack {method} transport error: {error}"))
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|error| {
            AppError::Transient(format!("slack {method} response unreadable: {error}"))
        })?;
        parse_envelope(method, status, body.as_str())
    }
}

fn parse_envelope(method: &str, status: StatusCode, body: &str) -> AppResult<SlackEnvelope> {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(AppError::Transient(format!(
            "slack {method} returned transient status {status}"
        )));
    }
    if !status.is_success() {
        return Err(AppError::ExternalFailure(format!(
            "slack {method} returned status {status}"
        )));
    }

    serde_json::from_str(body).map_err(|error| {
        AppError::ExternalFailure(format!("slack {method} returned malformed JSON: {error}"))
    })
}

fn envelope_error(method: &str, envelope: &SlackEnvelope) -> AppError {
    let code = envelope.error.as_deref().unwrap_or("unknown_error");
    if code == "ratelimited" {
        return AppError::Transient(format!("slack {method} rate limited"));
    }
    AppError::ExternalFailure(format!("slack {method} failed: {code}"))
}

#[async_trait]
impl ChatGateway for SlackChatGateway {
    async fn notify_user(&self, user_id: &UserId, message: &str) -> AppResult<()> {
        let response = self
            .http_client
            .post(self.url("chat.postMessage"))
            .bearer_auth(self.token.as_str())
            .json(&serde_json::json!({
                "channel": user_id.as_str(),
                "text": message,
            }))
            .send()
            .await;

        let envelope = Self::read_response("chat.postMessage", response).await?;
        if !envelope.ok {
            return Err(envelope_error("chat.postMessage", &envelope));
        }

        debug!(user_id = %user_id.as_str(), "slack message delivered");
        Ok(())
    }

    async fn lookup_email(&self, user_id: &UserId) -> AppResult<Option<EmailAddress>> {
        let response = self
            .http_client
            .get(self.url("users.info"))
            .bearer_auth(self.token.as_str())
            .query(&[("user", user_id.as_str())])
            .send()
            .await;

        let envelope = Self::read_response("users.info", response).await?;
        if !envelope.ok {
            if envelope.error.as_deref() == Some("user_not_found") {
                return Ok(None);
            }
            return Err(envelope_error("users.info", &envelope));
        }

        let email = envelope.user.and_then(|user| user.profile.email);
        match email.map(EmailAddress::new).transpose() {
            Ok(email) => Ok(email),
            Err(error) => {
                warn!(
                    user_id = %user_id.as_str(),
                    error = %error,
                    "slack profile email rejected"
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttled_and_server_errors_are_transient() {
        let throttled = parse_envelope("users.info", StatusCode::TOO_MANY_REQUESTS, "");
        assert!(matches!(throttled, Err(AppError::Transient(_))));

        let unavailable = parse_envelope("users.info", StatusCode::BAD_GATEWAY, "");
        assert!(matches!(unavailable, Err(AppError::Transient(_))));

        let forbidden = parse_envelope("users.info", StatusCode::FORBIDDEN, "");
        assert!(matches!(forbidden, Err(AppError::ExternalFailure(_))));
    }

    #[test]
    fn profile_email_is_read_from_user_payload() {
        let envelope = parse_envelope(
            "users.info",
            StatusCode::OK,
            r#"{"ok":true,"user":{"id":"U0000000001","profile":{"email":"dev@example.com"}}}"#,
        )
        .unwrap_or_default();

        assert!(envelope.ok);
        assert_eq!(
            envelope.user.and_then(|user| user.profile.email).as_deref(),
            Some("dev@example.com")
        );
    }

    #[test]
    fn rate_limited_envelope_is_transient() {
        let envelope = parse_envelope(
            "chat.postMessage",
            StatusCode::OK,
            r#"{"ok":false,"error":"ratelimited"}"#,
        )
        .unwrap_or_default();

        assert!(envelope_error("chat.postMessage", &envelope).is_retryable());
        let denied = SlackEnvelope {
            ok: false,
            error: Some("channel_not_found".to_owned()),
            user: None,
        };
        assert!(matches!(
            envelope_error("chat.postMessage", &denied),
            AppError::ExternalFailure(_)
        ));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let gateway =
            SlackChatGateway::new(reqwest::Client::new(), "https://slack.test/api/", "xoxb");
        assert_eq!(gateway.url("users.info"), "https://slack.test/api/users.info");
    }
}
