use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use jit_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::{
    AccessDuration, AccessPermission, AccessRequest, ClusterTarget, Condition, NamespaceName,
    SessionName, UserId,
};

/// Lifecycle phase of an access job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobPhase {
    /// Created, not started.
    Pending,
    /// Window fixed, grant in progress.
    Creating,
    /// Binding and credentials are live.
    Active,
    /// Revocation in progress.
    Expiring,
    /// Revoked and cleaned up.
    Completed,
    /// Grant could not be completed.
    Failed,
}

impl JobPhase {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Creating => "Creating",
            Self::Active => "Active",
            Self::Expiring => "Expiring",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }

    /// Returns whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl Display for JobPhase {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for JobPhase {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Pending" => Ok(Self::Pending),
            "Creating" => Ok(Self::Creating),
            "Active" => Ok(Self::Active),
            "Expiring" => Ok(Self::Expiring),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!("unknown job phase '{value}'"))),
        }
    }
}

/// Retention of the job record once it is `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CleanupPolicy {
    /// Delete the record as soon as it completes.
    OnExpiry,
    /// Keep the record until the parent request is deleted.
    #[default]
    OnDelete,
    /// Never delete the record automatically.
    Manual,
}

impl FromStr for CleanupPolicy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "OnExpiry" => Ok(Self::OnExpiry),
            "OnDelete" => Ok(Self::OnDelete),
            "Manual" => Ok(Self::Manual),
            _ => Err(AppError::Validation(format!(
                "unknown cleanup policy '{value}'"
            ))),
        }
    }
}

/// Live binding owned by an active job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccessEntry {
    /// Session principal ARN.
    pub principal: String,
    /// Opaque handle of the credentials secret.
    pub credentials_ref: String,
    /// When the current cloud session ends.
    pub session_expires_at: DateTime<Utc>,
}

/// Handles produced by a successful grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedGrant {
    /// Session principal ARN.
    pub principal: String,
    /// Opaque handle of the credentials secret.
    pub credentials_ref: String,
    /// Opaque handle of the kubeconfig secret.
    pub kubeconfig_ref: String,
    /// When the minted session ends.
    pub session_expires_at: DateTime<Utc>,
}

/// Intended effect enacting one approved request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessJob {
    id: String,
    request_ref: String,
    requester_id: UserId,
    target: ClusterTarget,
    duration: AccessDuration,
    permissions: Vec<AccessPermission>,
    namespaces: Vec<NamespaceName>,
    role_identity: String,
    cleanup_policy: CleanupPolicy,
    phase: JobPhase,
    start_time: Option<DateTime<Utc>>,
    expiry_time: Option<DateTime<Utc>>,
    session_name: Option<SessionName>,
    access_entry: Option<JobAccessEntry>,
    kubeconfig_ref: Option<String>,
    conditions: Vec<Condition>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resource_version: u64,
}

impl AccessJob {
    /// Creates a `Pending` job for an approved request.
    #[must_use]
    pub fn for_request(
        id: impl Into<String>,
        request: &AccessRequest,
        role_identity: impl Into<String>,
        cleanup_policy: CleanupPolicy,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            request_ref: request.id().to_owned(),
            requester_id: request.requester_id().clone(),
            target: request.target().clone(),
            duration: request.duration(),
            permissions: request.permissions().to_vec(),
            namespaces: request.namespaces().to_vec(),
            role_identity: role_identity.into(),
            cleanup_policy,
            phase: JobPhase::Pending,
            start_time: None,
            expiry_time: None,
            session_name: None,
            access_entry: None,
            kubeconfig_ref: None,
            conditions: Vec::new(),
            created_at: now,
            updated_at: now,
            resource_version: 0,
        }
    }

    /// Returns the job identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the owning request identifier.
    #[must_use]
    pub fn request_ref(&self) -> &str {
        self.request_ref.as_str()
    }

    /// Returns the requesting user.
    #[must_use]
    pub fn requester_id(&self) -> &UserId {
        &self.requester_id
    }

    /// Returns the target cluster.
    #[must_use]
    pub fn target(&self) -> &ClusterTarget {
        &self.target
    }

    /// Returns the grant window.
    #[must_use]
    pub fn duration(&self) -> AccessDuration {
        self.duration
    }

    /// Returns the permissions to bind.
    #[must_use]
    pub fn permissions(&self) -> &[AccessPermission] {
        &self.permissions
    }

    /// Returns the namespace scope.
    #[must_use]
    pub fn namespaces(&self) -> &[NamespaceName] {
        &self.namespaces
    }

    /// Returns the durable role the minter assumes.
    #[must_use]
    pub fn role_identity(&self) -> &str {
        self.role_identity.as_str()
    }

    /// Returns the last path segment of the role identity.
    #[must_use]
    pub fn role_name(&self) -> &str {
        self.role_identity
            .rsplit('/')
            .next()
            .unwrap_or(self.role_identity.as_str())
    }

    /// Returns the record retention policy.
    #[must_use]
    pub fn cleanup_policy(&self) -> CleanupPolicy {
        self.cleanup_policy
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> JobPhase {
        self.phase
    }

    /// Returns when the window started.
    #[must_use]
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// Returns when the window ends.
    #[must_use]
    pub fn expiry_time(&self) -> Option<DateTime<Utc>> {
        self.expiry_time
    }

    /// Returns the deterministic session name once the window is fixed.
    #[must_use]
    pub fn session_name(&self) -> Option<&SessionName> {
        self.session_name.as_ref()
    }

    /// Returns the live binding.
    #[must_use]
    pub fn access_entry(&self) -> Option<&JobAccessEntry> {
        self.access_entry.as_ref()
    }

    /// Returns the kubeconfig secret handle.
    #[must_use]
    pub fn kubeconfig_ref(&self) -> Option<&str> {
        self.kubeconfig_ref.as_deref()
    }

    /// Returns the ordered condition log.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last mutation timestamp.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the optimistic concurrency token.
    #[must_use]
    pub fn resource_version(&self) -> u64 {
        self.resource_version
    }

    /// Returns a copy carrying the stored concurrency token.
    #[must_use]
    pub fn with_resource_version(mut self, resource_version: u64) -> Self {
        self.resource_version = resource_version;
        self
    }

    /// Returns whether the window has elapsed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_time.is_some_and(|expiry_time| now >= expiry_time)
    }

    /// Appends a condition entry.
    pub fn push_condition(&mut self, condition: Condition) {
        self.updated_at = condition.timestamp;
        self.conditions.push(condition);
    }

    /// Fixes the window and session name, moving `Pending` to `Creating`.
    pub fn begin_creating(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.expect_phase(&[JobPhase::Pending], JobPhase::Creating)?;

        let expiry_time = now
            .checked_add_signed(self.duration.to_time_delta()?)
            .ok_or_else(|| AppError::Validation("expiry time is out of range".to_owned()))?;

        self.start_time = Some(now);
        self.expiry_time = Some(expiry_time);
        self.session_name = Some(SessionName::build(
            &self.requester_id,
            &self.target.name,
            now,
        ));
        self.phase = JobPhase::Creating;
        self.push_condition(Condition::new(
            "Creating",
            now,
            "WindowFixed",
            format!("access window ends at {}", expiry_time.to_rfc3339()),
        ));
        Ok(())
    }

    /// Records a successful grant, moving `Creating` to `Active`.
    pub fn activate(&mut self, grant: IssuedGrant, now: DateTime<Utc>) -> AppResult<()> {
        self.expect_phase(&[JobPhase::Creating], JobPhase::Active)?;

        self.access_entry = Some(JobAccessEntry {
            principal: grant.principal,
            credentials_ref: grant.credentials_ref,
            session_expires_at: grant.session_expires_at,
        });
        self.kubeconfig_ref = Some(grant.kubeconfig_ref);
        self.phase = JobPhase::Active;
        self.push_condition(Condition::new(
            "Active",
            now,
            "GrantSucceeded",
            "binding and credentials issued",
        ));
        Ok(())
    }

    /// Records a re-minted session on an `Active` job.
    pub fn refresh_session(
        &mut self,
        session_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        if self.phase != JobPhase::Active {
            return Err(self.conflict("refresh its session"));
        }

        let entry = self
            .access_entry
            .as_mut()
            .ok_or_else(|| AppError::Internal("active job has no access entry".to_owned()))?;
        entry.session_expires_at = session_expires_at;
        self.push_condition(Condition::new(
            "SessionRefreshed",
            now,
            "SessionRefreshed",
            format!("session renewed until {}", session_expires_at.to_rfc3339()),
        ));
        Ok(())
    }

    /// Moves `Creating` to `Failed`.
    pub fn fail(&mut self, reason: &str, message: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.expect_phase(&[JobPhase::Creating], JobPhase::Failed)?;
        self.phase = JobPhase::Failed;
        self.push_condition(Condition::new("Failed", now, reason, message));
        Ok(())
    }

    /// Starts revocation.
    ///
    /// Allowed from `Pending` and `Creating` too, so a job whose parent
    /// vanished mid-grant still unwinds any partial binding.
    pub fn begin_expiring(&mut self, reason: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.expect_phase(
            &[JobPhase::Pending, JobPhase::Creating, JobPhase::Active],
            JobPhase::Expiring,
        )?;
        self.phase = JobPhase::Expiring;
        self.push_condition(Condition::new(
            "Expiring",
            now,
            reason,
            "revoking binding and credentials",
        ));
        Ok(())
    }

    /// Moves `Expiring` to `Completed`, dropping both secret handles.
    pub fn complete(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        self.expect_phase(&[JobPhase::Expiring], JobPhase::Completed)?;
        self.access_entry = None;
        self.kubeconfig_ref = None;
        self.phase = JobPhase::Completed;
        self.push_condition(Condition::new(
            "Completed",
            now,
            "Revoked",
            "binding removed and secrets deleted",
        ));
        Ok(())
    }

    fn expect_phase(&self, allowed: &[JobPhase], next: JobPhase) -> AppResult<()> {
        if allowed.contains(&self.phase) {
            return Ok(());
        }

        Err(self.conflict(&format!("move to {next}")))
    }

    fn conflict(&self, action: &str) -> AppError {
        AppError::Conflict(format!(
            "job '{}' in phase {} cannot {action}",
            self.id, self.phase
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::{
        AccountId, ApproverId, ClusterName, EmailAddress, NewAccessRequest, Region,
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7)
            .single()
            .unwrap_or_else(|| unreachable!())
    }

    fn job() -> AccessJob {
        let request = AccessRequest::new(NewAccessRequest {
            id: "req-1".to_owned(),
            requester_id: UserId::new("U0000000001").unwrap_or_else(|_| unreachable!()),
            requester_email: EmailAddress::new("dev@example.com")
                .unwrap_or_else(|_| unreachable!()),
            target: ClusterTarget {
                name: ClusterName::new("dev-east-1").unwrap_or_else(|_| unreachable!()),
                account: AccountId::new("123456789012").unwrap_or_else(|_| unreachable!()),
                region: Region::new("us-east-1").unwrap_or_else(|_| unreachable!()),
            },
            reason: "debugging ticket 4217".to_owned(),
            duration: AccessDuration::DEFAULT,
            permissions: vec![AccessPermission::View],
            namespaces: Vec::new(),
            required_approvers: vec![
                ApproverId::from_str("platform-team").unwrap_or_else(|_| unreachable!()),
            ],
            created_at: now(),
        })
        .unwrap_or_else(|_| unreachable!());

        AccessJob::for_request(
            "job-1",
            &request,
            "arn:aws:iam::123456789012:role/jit-access",
            CleanupPolicy::OnDelete,
            now(),
        )
    }

    fn grant() -> IssuedGrant {
        IssuedGrant {
            principal: "arn:aws:sts::123456789012:assumed-role/jit-access/x".to_owned(),
            credentials_ref: "job-1-credentials".to_owned(),
            kubeconfig_ref: "job-1-kubeconfig".to_owned(),
            session_expires_at: now() + TimeDelta::hours(1),
        }
    }

    #[test]
    fn creating_fixes_window_and_session_name() {
        let mut job = job();
        assert!(job.begin_creating(now()).is_ok());

        assert_eq!(job.start_time(), Some(now()));
        assert_eq!(job.expiry_time(), Some(now() + TimeDelta::hours(1)));
        assert_eq!(
            job.session_name().map(SessionName::as_str),
            Some("jit-U0000000001-dev-east-1-20250304-050607")
        );
        assert!(job.begin_creating(now() + TimeDelta::minutes(5)).is_err());
        assert_eq!(job.start_time(), Some(now()));
    }

    #[test]
    fn role_name_is_last_path_segment() {
        assert_eq!(job().role_name(), "jit-access");
    }

    #[test]
    fn secret_handles_exist_only_while_live() {
        let mut job = job();
        let _ = job.begin_creating(now());
        assert!(job.kubeconfig_ref().is_none());

        assert!(job.activate(grant(), now()).is_ok());
        assert!(job.kubeconfig_ref().is_some());
        assert!(job.access_entry().is_some());

        assert!(job.begin_expiring("WindowElapsed", now()).is_ok());
        assert!(job.kubeconfig_ref().is_some());
        assert!(job.complete(now()).is_ok());
        assert!(job.kubeconfig_ref().is_none());
        assert!(job.access_entry().is_none());
        assert!(job.session_name().is_some());
    }

    #[test]
    fn failed_is_terminal() {
        let mut job = job();
        let _ = job.begin_creating(now());
        assert!(job.fail("GrantFailed", "access denied", now()).is_ok());
        assert!(job.phase().is_terminal());
        assert!(job.begin_expiring("WindowElapsed", now()).is_err());
    }

    #[test]
    fn expiry_is_inclusive() {
        let mut job = job();
        let _ = job.begin_creating(now());
        assert!(!job.is_expired_at(now() + TimeDelta::minutes(59)));
        assert!(job.is_expired_at(now() + TimeDelta::hours(1)));
    }
}
