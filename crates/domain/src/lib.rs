//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod access_job;
mod access_request;
mod cluster;
mod condition;
mod duration;
mod permission;
mod security;
mod session_name;
mod target;
mod user;

pub use access_job::{AccessJob, CleanupPolicy, IssuedGrant, JobAccessEntry, JobPhase};
pub use access_request::{
    AccessRequest, Approval, ApprovalOutcome, CLUSTER_ADMIN_REASON_MIN_LENGTH, NewAccessRequest,
    REASON_MAX_LENGTH, REASON_MIN_LENGTH, RequestAccessEntry, RequestPhase,
};
pub use cluster::{Cluster, ClusterInput, Environment};
pub use condition::Condition;
pub use duration::AccessDuration;
pub use permission::{AccessPermission, AccessScope, ClusterPolicy, any_elevated, policy_bindings};
pub use security::{OperatorPermission, OperatorRole};
pub use session_name::{SessionName, SessionNameParts};
pub use target::{AccountId, ClusterName, ClusterTarget, NamespaceName, Region};
pub use user::{ApproverId, EmailAddress, TeamName, UserId};
