use std::sync::Arc;

use jit_core::{AppError, AppResult, CallerIdentity};
use jit_domain::{OperatorPermission, OperatorRole, UserId};
use tracing::info;

use crate::access_ports::RoleRegistry;

/// Application service for operator role checks.
#[derive(Clone)]
pub struct AuthorizationService {
    roles: Arc<dyn RoleRegistry>,
}

impl AuthorizationService {
    /// Creates a new authorization service from a role registry.
    #[must_use]
    pub fn new(roles: Arc<dyn RoleRegistry>) -> Self {
        Self { roles }
    }

    /// Returns the caller's role.
    pub async fn role_of(&self, actor: &CallerIdentity) -> AppResult<OperatorRole> {
        let user_id = UserId::new(actor.subject())
            .map_err(|_| AppError::Unauthorized(format!("unknown caller '{}'", actor.subject())))?;
        self.roles.role_for(&user_id).await
    }

    /// Returns whether the caller's role grants `permission`.
    pub async fn has_permission(
        &self,
        actor: &CallerIdentity,
        permission: OperatorPermission,
    ) -> AppResult<bool> {
        Ok(self.role_of(actor).await?.grants(permission))
    }

    /// Ensures the caller's role grants `permission`.
    pub async fn require_permission(
        &self,
        actor: &CallerIdentity,
        permission: OperatorPermission,
    ) -> AppResult<()> {
        let role = self.role_of(actor).await?;
        if role.grants(permission) {
            return Ok(());
        }

        Err(AppError::Forbidden(format!(
            "caller '{}' with role '{role}' is missing permission '{}'",
            actor.subject(),
            permission.as_str()
        )))
    }

    /// Assigns a role to a user. Requires `manage-users`.
    pub async fn assign_role(
        &self,
        actor: &CallerIdentity,
        user_id: &UserId,
        role: OperatorRole,
    ) -> AppResult<()> {
        self.require_permission(actor, OperatorPermission::ManageUsers)
            .await?;
        self.roles.assign_role(user_id, role).await?;

        info!(
            actor = %actor.subject(),
            user_id = %user_id,
            role = %role,
            "operator role assigned"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeRoleRegistry, caller, user};

    async fn service() -> AuthorizationService {
        let roles = FakeRoleRegistry::default()
            .with_role(2, OperatorRole::Approver)
            .await
            .with_role(3, OperatorRole::Admin)
            .await;
        AuthorizationService::new(Arc::new(roles))
    }

    #[tokio::test]
    async fn unknown_users_default_to_requester() {
        let service = service().await;
        let role = service.role_of(&caller(1)).await;
        assert!(matches!(role, Ok(OperatorRole::Requester)));
    }

    #[tokio::test]
    async fn require_permission_rejects_missing_grant() {
        let service = service().await;
        let result = service
            .require_permission(&caller(1), OperatorPermission::ApproveRequests)
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        let approver = service
            .require_permission(&caller(2), OperatorPermission::ApproveRequests)
            .await;
        assert!(approver.is_ok());
    }

    #[tokio::test]
    async fn malformed_subject_is_unauthorized() {
        let service = service().await;
        let result = service
            .role_of(&CallerIdentity::new("not-a-user", "mallory", None))
            .await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn only_admins_assign_roles() {
        let service = service().await;

        let denied = service
            .assign_role(&caller(2), &user(5), OperatorRole::Admin)
            .await;
        assert!(matches!(denied, Err(AppError::Forbidden(_))));

        let assigned = service
            .assign_role(&caller(3), &user(5), OperatorRole::Approver)
            .await;
        assert!(assigned.is_ok());
        assert!(matches!(
            service.role_of(&caller(5)).await,
            Ok(OperatorRole::Approver)
        ));
    }
}
