use std::fmt::{Display, Formatter};
use std::str::FromStr;

use jit_core::AppError;
use serde::{Deserialize, Serialize};

/// Permissions enforced by operator-side authorization checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperatorPermission {
    /// Allows filing access requests.
    CreateRequests,
    /// Allows reading one's own requests.
    ViewOwnRequests,
    /// Allows approving or denying requests.
    ApproveRequests,
    /// Allows revoking any active request.
    RevokeRequests,
    /// Allows reading every request.
    ViewAllRequests,
    /// Allows cluster registry writes.
    ManageClusters,
    /// Allows role assignment.
    ManageUsers,
    /// Allows forcing an expiry sweep.
    RunCleanup,
}

impl OperatorPermission {
    /// Returns a stable transport value for this permission.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateRequests => "create-requests",
            Self::ViewOwnRequests => "view-own-requests",
            Self::ApproveRequests => "approve-requests",
            Self::RevokeRequests => "revoke-requests",
            Self::ViewAllRequests => "view-all-requests",
            Self::ManageClusters => "manage-clusters",
            Self::ManageUsers => "manage-users",
            Self::RunCleanup => "run-cleanup",
        }
    }
}

/// Fixed operator roles.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OperatorRole {
    /// May file and view own requests.
    #[default]
    Requester,
    /// Requester plus approval and revocation.
    Approver,
    /// Everything.
    Admin,
}

impl OperatorRole {
    /// Returns the stable transport value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requester => "requester",
            Self::Approver => "approver",
            Self::Admin => "admin",
        }
    }

    /// Returns the permission set granted by this role.
    #[must_use]
    pub fn permissions(&self) -> &'static [OperatorPermission] {
        const REQUESTER: &[OperatorPermission] = &[
            OperatorPermission::CreateRequests,
            OperatorPermission::ViewOwnRequests,
        ];
        const APPROVER: &[OperatorPermission] = &[
            OperatorPermission::CreateRequests,
            OperatorPermission::ViewOwnRequests,
            OperatorPermission::ApproveRequests,
            OperatorPermission::RevokeRequests,
            OperatorPermission::ViewAllRequests,
        ];
        const ADMIN: &[OperatorPermission] = &[
            OperatorPermission::CreateRequests,
            OperatorPermission::ViewOwnRequests,
            OperatorPermission::ApproveRequests,
            OperatorPermission::RevokeRequests,
            OperatorPermission::ViewAllRequests,
            OperatorPermission::ManageClusters,
            OperatorPermission::ManageUsers,
            OperatorPermission::RunCleanup,
        ];

        match self {
            Self::Requester => REQUESTER,
            Self::Approver => APPROVER,
            Self::Admin => ADMIN,
        }
    }

    /// Returns whether the role grants a permission.
    #[must_use]
    pub fn grants(&self, permission: OperatorPermission) -> bool {
        self.permissions().contains(&permission)
    }
}

impl Display for OperatorRole {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for OperatorRole {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "requester" => Ok(Self::Requester),
            "approver" => Ok(Self::Approver),
            "admin" => Ok(Self::Admin),
            _ => Err(AppError::Validation(format!("unknown role '{value}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_are_cumulative() {
        for permission in OperatorRole::Requester.permissions() {
            assert!(OperatorRole::Approver.grants(*permission));
        }
        for permission in OperatorRole::Approver.permissions() {
            assert!(OperatorRole::Admin.grants(*permission));
        }
    }

    #[test]
    fn requester_cannot_approve() {
        assert!(!OperatorRole::Requester.grants(OperatorPermission::ApproveRequests));
        assert!(OperatorRole::Approver.grants(OperatorPermission::ApproveRequests));
        assert!(!OperatorRole::Approver.grants(OperatorPermission::ManageClusters));
    }

    #[test]
    fn role_parsing_is_case_insensitive() {
        assert_eq!(OperatorRole::from_str("Admin").ok(), Some(OperatorRole::Admin));
        assert!(OperatorRole::from_str("root").is_err());
    }
}
