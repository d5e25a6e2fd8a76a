use async_trait::async_trait;
use jit_core::AppResult;
use jit_domain::{EmailAddress, UserId};

/// Outbound chat integration.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Sends a direct message to a user.
    async fn notify_user(&self, user_id: &UserId, message: &str) -> AppResult<()>;

    /// Looks up the email on the user's chat profile.
    async fn lookup_email(&self, user_id: &UserId) -> AppResult<Option<EmailAddress>>;
}
