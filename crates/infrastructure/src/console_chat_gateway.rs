//! Console chat gateway for development. Logs messages to tracing output.

use async_trait::async_trait;
use jit_application::ChatGateway;
use jit_core::AppResult;
use jit_domain::{EmailAddress, UserId};
use tracing::info;

/// Development chat gateway that logs direct messages.
#[derive(Clone, Default)]
pub struct ConsoleChatGateway;

impl ConsoleChatGateway {
    /// Creates a new console chat gateway.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChatGateway for ConsoleChatGateway {
    async fn notify_user(&self, user_id: &UserId, message: &str) -> AppResult<()> {
        info!(
            user_id = %user_id.as_str(),
            "--- CHAT (console) ---\nTo: {}\n\n{}\n--- END CHAT ---",
            user_id.as_str(),
            message
        );

        Ok(())
    }

    async fn lookup_email(&self, _user_id: &UserId) -> AppResult<Option<EmailAddress>> {
        Ok(None)
    }
}
