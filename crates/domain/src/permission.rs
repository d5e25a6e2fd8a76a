use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use jit_core::AppError;
use serde::{Deserialize, Serialize};

use crate::NamespaceName;

/// Cluster permission that a requester may ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessPermission {
    /// Read-only access.
    View,
    /// Mutating access to namespaced workloads.
    Edit,
    /// Administrative access.
    Admin,
    /// Unrestricted cluster-wide access.
    ClusterAdmin,
    /// Ephemeral debug containers.
    Debug,
    /// Pod log access.
    Logs,
    /// Exec into running pods.
    Exec,
    /// Port forwarding to pods.
    PortForward,
}

impl AccessPermission {
    /// Returns the stable transport value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Edit => "edit",
            Self::Admin => "admin",
            Self::ClusterAdmin => "cluster-admin",
            Self::Debug => "debug",
            Self::Logs => "logs",
            Self::Exec => "exec",
            Self::PortForward => "port-forward",
        }
    }

    /// Returns every permission in the allow-list.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[AccessPermission] = &[
            AccessPermission::View,
            AccessPermission::Edit,
            AccessPermission::Admin,
            AccessPermission::ClusterAdmin,
            AccessPermission::Debug,
            AccessPermission::Logs,
            AccessPermission::Exec,
            AccessPermission::PortForward,
        ];

        ALL
    }

    /// Returns whether this permission counts as elevated.
    #[must_use]
    pub fn is_elevated(&self) -> bool {
        !matches!(self, Self::View | Self::Logs)
    }

    /// Returns whether this permission only makes sense cluster-wide.
    #[must_use]
    pub fn is_cluster_wide(&self) -> bool {
        matches!(self, Self::Admin | Self::ClusterAdmin)
    }

    /// Returns the managed cluster policy backing this permission.
    #[must_use]
    pub fn cluster_policy(&self) -> ClusterPolicy {
        match self {
            Self::View | Self::Logs => ClusterPolicy::View,
            Self::Edit | Self::Debug | Self::Exec | Self::PortForward => ClusterPolicy::Edit,
            Self::Admin | Self::ClusterAdmin => ClusterPolicy::ClusterAdmin,
        }
    }
}

impl Display for AccessPermission {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for AccessPermission {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|permission| permission.as_str() == value)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "unknown permission '{value}', expected one of: {}",
                    Self::all()
                        .iter()
                        .map(AccessPermission::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })
    }
}

/// Returns whether any of the permissions is elevated.
#[must_use]
pub fn any_elevated(permissions: &[AccessPermission]) -> bool {
    permissions.iter().any(AccessPermission::is_elevated)
}

/// Managed access policy attached to a cluster access entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClusterPolicy {
    /// Read-only policy.
    View,
    /// Edit policy.
    Edit,
    /// Cluster admin policy.
    ClusterAdmin,
}

impl ClusterPolicy {
    /// Returns the managed policy name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::View => "AmazonEKSViewPolicy",
            Self::Edit => "AmazonEKSEditPolicy",
            Self::ClusterAdmin => "AmazonEKSClusterAdminPolicy",
        }
    }

    /// Returns the policy ARN understood by the access entry API.
    #[must_use]
    pub fn arn(&self) -> String {
        format!(
            "arn:aws:eks::aws:cluster-access-policy/{}",
            self.name()
        )
    }
}

/// Scope an access policy applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "namespaces")]
pub enum AccessScope {
    /// Entire cluster.
    Cluster,
    /// Listed namespaces only.
    Namespace(Vec<NamespaceName>),
}

/// Maps requested permissions to the policies and scopes to attach.
///
/// Cluster-admin policies are always cluster-wide. Other policies are
/// namespace-scoped when namespaces were supplied.
#[must_use]
pub fn policy_bindings(
    permissions: &[AccessPermission],
    namespaces: &[NamespaceName],
) -> Vec<(ClusterPolicy, AccessScope)> {
    let policies = permissions
        .iter()
        .map(AccessPermission::cluster_policy)
        .collect::<BTreeSet<_>>();

    policies
        .into_iter()
        .map(|policy| {
            let scope = if policy == ClusterPolicy::ClusterAdmin || namespaces.is_empty() {
                AccessScope::Cluster
            } else {
                AccessScope::Namespace(namespaces.to_vec())
            };
            (policy, scope)
        })
        .collect()
}
