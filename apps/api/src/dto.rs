use chrono::{DateTime, Utc};
use jit_application::SweepReport;
use jit_domain::{AccessRequest, Cluster, ClusterInput, Condition, Environment};
use serde::{Deserialize, Serialize};

/// Health response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Dependency check reported by readiness.
#[derive(Debug, Serialize)]
pub struct DependencyStatus {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Readiness response payload.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub storage: DependencyStatus,
}

/// Incoming payload for cluster registration and replacement.
#[derive(Debug, Deserialize)]
pub struct ClusterRequest {
    pub name: String,
    pub display_name: Option<String>,
    pub account: String,
    pub region: String,
    pub environment: Environment,
    pub max_duration: Option<String>,
    #[serde(default)]
    pub required_approvers_count: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl From<ClusterRequest> for ClusterInput {
    fn from(value: ClusterRequest) -> Self {
        Self {
            name: value.name,
            display_name: value.display_name,
            account: value.account,
            region: value.region,
            environment: value.environment,
            max_duration: value.max_duration,
            required_approvers_count: value.required_approvers_count,
            enabled: value.enabled,
        }
    }
}

/// API representation of a registered cluster.
#[derive(Debug, Serialize)]
pub struct ClusterResponse {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub arn: String,
    pub account: String,
    pub region: String,
    pub environment: &'static str,
    pub max_duration: String,
    pub required_approvers_count: u32,
    pub enabled: bool,
}

impl From<Cluster> for ClusterResponse {
    fn from(value: Cluster) -> Self {
        Self {
            id: value.id().to_owned(),
            name: value.name().as_str().to_owned(),
            display_name: value.display_name().to_owned(),
            arn: value.target().arn(),
            account: value.account().as_str().to_owned(),
            region: value.region().as_str().to_owned(),
            environment: value.environment().as_str(),
            max_duration: value.max_duration().to_string(),
            required_approvers_count: value.required_approvers_count(),
            enabled: value.enabled(),
        }
    }
}

/// Incoming payload for operator role assignment.
#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub user_id: String,
    pub role: String,
}

/// Incoming payload for a direct access grant.
#[derive(Debug, Deserialize)]
pub struct GrantAccessRequest {
    pub cluster: String,
    pub reason: String,
    pub duration: Option<String>,
    pub permissions: Option<Vec<String>>,
    #[serde(default)]
    pub namespaces: Vec<String>,
    pub approvers: Option<Vec<String>>,
}

/// Incoming payload addressing one request.
#[derive(Debug, Deserialize)]
pub struct AccessIdRequest {
    pub access_id: String,
}

/// Incoming payload for approvals.
#[derive(Debug, Deserialize)]
pub struct ApproveAccessRequest {
    pub access_id: String,
    pub comment: Option<String>,
}

/// Incoming payload for denials.
#[derive(Debug, Deserialize)]
pub struct DenyAccessRequest {
    pub access_id: String,
    pub reason: Option<String>,
}

/// Incoming payload for a forced sweep.
#[derive(Debug, Deserialize)]
pub struct CleanupRequest {
    pub cluster: String,
}

/// Query string of the access listing.
#[derive(Debug, Default, Deserialize)]
pub struct AccessListQuery {
    pub user_id: Option<String>,
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub active: bool,
}

/// Query string addressing one request.
#[derive(Debug, Deserialize)]
pub struct AccessIdQuery {
    pub id: String,
}

/// API representation of one approval.
#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub approver_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// API representation of a condition entry.
#[derive(Debug, Serialize)]
pub struct ConditionResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub message: String,
}

impl From<&Condition> for ConditionResponse {
    fn from(value: &Condition) -> Self {
        Self {
            kind: value.kind.clone(),
            timestamp: value.timestamp,
            reason: value.reason.clone(),
            message: value.message.clone(),
        }
    }
}

/// API representation of a live or past grant.
#[derive(Debug, Serialize)]
pub struct AccessEntryResponse {
    pub principal: String,
    pub session_name: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// API representation of an access request.
#[derive(Debug, Serialize)]
pub struct AccessRequestResponse {
    pub access_id: String,
    pub requester_id: String,
    pub requester_email: String,
    pub cluster: String,
    pub cluster_arn: String,
    pub reason: String,
    pub duration: String,
    pub permissions: Vec<String>,
    pub namespaces: Vec<String>,
    pub required_approvers: Vec<String>,
    pub approvals: Vec<ApprovalResponse>,
    pub phase: &'static str,
    pub conditions: Vec<ConditionResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_entry: Option<AccessEntryResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AccessRequest> for AccessRequestResponse {
    fn from(value: AccessRequest) -> Self {
        Self {
            access_id: value.id().to_owned(),
            requester_id: value.requester_id().as_str().to_owned(),
            requester_email: value.requester_email().as_str().to_owned(),
            cluster: value.target().name.as_str().to_owned(),
            cluster_arn: value.target().arn(),
            reason: value.reason().to_owned(),
            duration: value.duration().to_string(),
            permissions: value
                .permissions()
                .iter()
                .map(|permission| permission.as_str().to_owned())
                .collect(),
            namespaces: value
                .namespaces()
                .iter()
                .map(|namespace| namespace.as_str().to_owned())
                .collect(),
            required_approvers: value
                .required_approvers()
                .iter()
                .map(|approver| approver.as_str().to_owned())
                .collect(),
            approvals: value
                .approvals()
                .iter()
                .map(|approval| ApprovalResponse {
                    approver_id: approval.approver_id.as_str().to_owned(),
                    timestamp: approval.timestamp,
                    comment: approval.comment.clone(),
                })
                .collect(),
            phase: value.phase().as_str(),
            conditions: value.conditions().iter().map(ConditionResponse::from).collect(),
            access_entry: value.access_entry().map(|entry| AccessEntryResponse {
                principal: entry.principal.clone(),
                session_name: entry.session_name.as_str().to_owned(),
                created_at: entry.created_at,
                expires_at: entry.expires_at,
            }),
            created_at: value.created_at(),
            updated_at: value.updated_at(),
        }
    }
}

/// Result of an approval.
#[derive(Debug, Serialize)]
pub struct ApproveAccessResponse {
    pub recorded: bool,
    pub request: AccessRequestResponse,
}

/// Counters from a forced sweep.
#[derive(Debug, Serialize)]
pub struct SweepReportResponse {
    pub scanned: usize,
    pub orphans_removed: usize,
    pub expired: usize,
}

impl From<SweepReport> for SweepReportResponse {
    fn from(value: SweepReport) -> Self {
        Self {
            scanned: value.scanned,
            orphans_removed: value.orphans_removed,
            expired: value.expired,
        }
    }
}
