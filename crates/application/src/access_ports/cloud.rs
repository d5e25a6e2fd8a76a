use std::fmt::{Debug, Formatter};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jit_core::AppResult;
use jit_domain::{AccessDuration, AccessScope, ClusterPolicy, ClusterTarget, SessionName};
use serde::{Deserialize, Serialize};

/// Input for minting one short-lived session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintSessionInput {
    /// Durable role to assume.
    pub role_identity: String,
    /// Deterministic session name.
    pub session_name: SessionName,
    /// Requested session lifetime.
    pub ttl: AccessDuration,
    /// Inline least-privilege policy document.
    pub inline_policy: String,
    /// Session tags.
    pub tags: Vec<(String, String)>,
}

/// Temporary credentials issued by the session minter.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCredentials {
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Session token.
    pub session_token: String,
    /// Upstream expiry.
    pub expires_at: DateTime<Utc>,
}

impl Debug for SessionCredentials {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SessionCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Cloud session service (role assumption).
///
/// Denied or invalid calls surface as `ExternalFailure`; throttling and
/// network errors as `Transient`.
#[async_trait]
pub trait SessionMinter: Send + Sync {
    /// Exchanges the durable role for session credentials.
    async fn mint(&self, input: MintSessionInput) -> AppResult<SessionCredentials>;
}

/// One access entry to create on a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessBinding {
    /// Target cluster.
    pub cluster: ClusterTarget,
    /// Session principal ARN.
    pub principal: String,
    /// Kubernetes username, informational only.
    pub username: String,
    /// Policies and scopes to associate.
    pub policies: Vec<(ClusterPolicy, AccessScope)>,
}

/// Connection details of a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterDescription {
    /// Cluster name.
    pub name: String,
    /// Cluster ARN.
    pub arn: String,
    /// API server endpoint.
    pub endpoint: String,
    /// Base64 encoded certificate authority bundle.
    pub certificate_authority: String,
}

/// Cluster access-entry API.
#[async_trait]
pub trait ClusterAccessBinder: Send + Sync {
    /// Creates the access entry and associates policies.
    ///
    /// An existing entry for the same principal counts as success.
    async fn bind(&self, binding: &AccessBinding) -> AppResult<()>;

    /// Deletes the access entry; fails with `NotFound` when absent.
    async fn unbind(&self, cluster: &ClusterTarget, principal: &str) -> AppResult<()>;

    /// Lists principals of all access entries on the cluster.
    async fn list_access_entries(&self, cluster: &ClusterTarget) -> AppResult<Vec<String>>;

    /// Describes the cluster endpoint and certificate authority.
    async fn describe_cluster(&self, cluster: &ClusterTarget) -> AppResult<ClusterDescription>;
}
