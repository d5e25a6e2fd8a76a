use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use jit_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::{
    AccessDuration, AccessPermission, ApproverId, ClusterTarget, Condition, EmailAddress,
    NamespaceName, SessionName, TeamName, UserId,
};

/// Shortest accepted justification.
pub const REASON_MIN_LENGTH: usize = 10;
/// Longest accepted justification.
pub const REASON_MAX_LENGTH: usize = 500;
/// Shortest justification accepted alongside `cluster-admin`.
pub const CLUSTER_ADMIN_REASON_MIN_LENGTH: usize = 50;

/// Lifecycle phase of an access request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestPhase {
    /// Waiting for approvals.
    Pending,
    /// Approved, grant not yet in place.
    Approved,
    /// Rejected before approval.
    Denied,
    /// Access is live.
    Active,
    /// The window elapsed.
    Expired,
    /// Access was withdrawn early.
    Revoked,
}

impl RequestPhase {
    /// Returns the stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Denied => "Denied",
            Self::Active => "Active",
            Self::Expired => "Expired",
            Self::Revoked => "Revoked",
        }
    }

    /// Returns whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Denied | Self::Expired | Self::Revoked)
    }

    /// Returns whether the phase carries an access entry.
    #[must_use]
    pub fn has_access_entry(&self) -> bool {
        matches!(self, Self::Active | Self::Expired | Self::Revoked)
    }

    fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved | Self::Denied)
                | (Self::Approved, Self::Active)
                | (Self::Active, Self::Expired | Self::Revoked)
        )
    }
}

impl Display for RequestPhase {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for RequestPhase {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Pending" => Ok(Self::Pending),
            "Approved" => Ok(Self::Approved),
            "Denied" => Ok(Self::Denied),
            "Active" => Ok(Self::Active),
            "Expired" => Ok(Self::Expired),
            "Revoked" => Ok(Self::Revoked),
            _ => Err(AppError::Validation(format!(
                "unknown request phase '{value}'"
            ))),
        }
    }
}

/// One approval cast on a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    /// Approving user.
    pub approver_id: UserId,
    /// When the approval was cast.
    pub timestamp: DateTime<Utc>,
    /// Optional free-text comment.
    pub comment: Option<String>,
}

/// Cluster access entry reported on the request status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAccessEntry {
    /// Session principal ARN.
    pub principal: String,
    /// Session name used for the binding.
    pub session_name: SessionName,
    /// When the grant became active.
    pub created_at: DateTime<Utc>,
    /// When the grant ends.
    pub expires_at: DateTime<Utc>,
}

/// Result of recording an approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// A new approval was appended.
    Recorded,
    /// The approver had already approved; nothing changed.
    Duplicate,
}

/// Validated fields of a new access request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccessRequest {
    /// Request identifier.
    pub id: String,
    /// Requesting user.
    pub requester_id: UserId,
    /// Requester email resolved at ingress.
    pub requester_email: EmailAddress,
    /// Target cluster.
    pub target: ClusterTarget,
    /// Justification.
    pub reason: String,
    /// Requested window.
    pub duration: AccessDuration,
    /// Requested permissions.
    pub permissions: Vec<AccessPermission>,
    /// Namespace scope; empty means cluster-wide.
    pub namespaces: Vec<NamespaceName>,
    /// Identities whose approval is required.
    pub required_approvers: Vec<ApproverId>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// User intent to obtain time-bounded cluster access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    id: String,
    requester_id: UserId,
    requester_email: EmailAddress,
    target: ClusterTarget,
    reason: String,
    duration: AccessDuration,
    permissions: Vec<AccessPermission>,
    namespaces: Vec<NamespaceName>,
    required_approvers: Vec<ApproverId>,
    approvals: Vec<Approval>,
    phase: RequestPhase,
    conditions: Vec<Condition>,
    access_entry: Option<RequestAccessEntry>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resource_version: u64,
}

impl AccessRequest {
    /// Creates a `Pending` request after checking structural invariants.
    pub fn new(input: NewAccessRequest) -> AppResult<Self> {
        let reason = input.reason.trim().to_owned();
        let reason_length = reason.chars().count();
        if !(REASON_MIN_LENGTH..=REASON_MAX_LENGTH).contains(&reason_length) {
            return Err(AppError::Validation(format!(
                "reason must be between {REASON_MIN_LENGTH} and {REASON_MAX_LENGTH} characters"
            )));
        }

        if input.permissions.is_empty() {
            return Err(AppError::Validation(
                "at least one permission is required".to_owned(),
            ));
        }

        if input.permissions.contains(&AccessPermission::ClusterAdmin) {
            if !input.namespaces.is_empty() {
                return Err(AppError::PolicyViolation(
                    "cluster-admin applies cluster-wide; namespaces are not allowed".to_owned(),
                ));
            }
            if reason_length < CLUSTER_ADMIN_REASON_MIN_LENGTH {
                return Err(AppError::PolicyViolation(
                    "cluster-admin permission requires detailed justification".to_owned(),
                ));
            }
        }

        input.duration.ensure_within(AccessDuration::MAX)?;

        Ok(Self {
            id: input.id,
            requester_id: input.requester_id,
            requester_email: input.requester_email,
            target: input.target,
            reason,
            duration: input.duration,
            permissions: input.permissions,
            namespaces: input.namespaces,
            required_approvers: input.required_approvers,
            approvals: Vec::new(),
            phase: RequestPhase::Pending,
            conditions: Vec::new(),
            access_entry: None,
            created_at: input.created_at,
            updated_at: input.created_at,
            resource_version: 0,
        })
    }

    /// Returns the request identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the requesting user.
    #[must_use]
    pub fn requester_id(&self) -> &UserId {
        &self.requester_id
    }

    /// Returns the requester email.
    #[must_use]
    pub fn requester_email(&self) -> &EmailAddress {
        &self.requester_email
    }

    /// Returns the target cluster.
    #[must_use]
    pub fn target(&self) -> &ClusterTarget {
        &self.target
    }

    /// Returns the justification.
    #[must_use]
    pub fn reason(&self) -> &str {
        self.reason.as_str()
    }

    /// Returns the requested window.
    #[must_use]
    pub fn duration(&self) -> AccessDuration {
        self.duration
    }

    /// Returns the requested permissions.
    #[must_use]
    pub fn permissions(&self) -> &[AccessPermission] {
        &self.permissions
    }

    /// Returns the namespace scope.
    #[must_use]
    pub fn namespaces(&self) -> &[NamespaceName] {
        &self.namespaces
    }

    /// Returns the identities whose approval is required.
    #[must_use]
    pub fn required_approvers(&self) -> &[ApproverId] {
        &self.required_approvers
    }

    /// Returns approvals in the order they were cast.
    #[must_use]
    pub fn approvals(&self) -> &[Approval] {
        &self.approvals
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    /// Returns the ordered condition log.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns the live or historical access entry.
    #[must_use]
    pub fn access_entry(&self) -> Option<&RequestAccessEntry> {
        self.access_entry.as_ref()
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

    /// Returns whether the latest condition of `kind` is present.
    #[must_use]
    pub fn has_condition(&self, kind: &str) -> bool {
        self.conditions.iter().any(|condition| condition.kind == kind)
    }

    /// Appends a condition entry.
    pub fn push_condition(&mut self, condition: Condition) {
        self.updated_at = condition.timestamp;
        self.conditions.push(condition);
    }

    /// Records an approval by `approver`.
    ///
    /// Repeating an approval is a no-op. Approvals are only accepted while
    /// the request is `Pending`, and never from the requester.
    pub fn record_approval(
        &mut self,
        approver: &UserId,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> AppResult<ApprovalOutcome> {
        if self
            .approvals
            .iter()
            .any(|approval| &approval.approver_id == approver)
        {
            return Ok(ApprovalOutcome::Duplicate);
        }

        if approver == &self.requester_id {
            return Err(AppError::Forbidden(
                "requesters cannot approve their own request".to_owned(),
            ));
        }

        if self.phase != RequestPhase::Pending {
            return Err(AppError::Conflict(format!(
                "request '{}' is {} and no longer accepts approvals",
                self.id, self.phase
            )));
        }

        self.approvals.push(Approval {
            approver_id: approver.clone(),
            timestamp: now,
            comment: comment.filter(|value| !value.trim().is_empty()),
        });
        self.updated_at = now;

        Ok(ApprovalOutcome::Recorded)
    }

    /// Returns whether the approvals cast so far satisfy the requirement.
    ///
    /// Every required approver must be matched by a distinct approving user:
    /// a user matches a user entry by identity and a team entry by
    /// membership. At least `minimum` distinct approvals must exist.
    pub fn approvals_satisfied<F>(&self, minimum: usize, is_member: F) -> bool
    where
        F: Fn(&TeamName, &UserId) -> bool,
    {
        if self.approvals.len() < minimum {
            return false;
        }

        let approvers = self
            .approvals
            .iter()
            .map(|approval| &approval.approver_id)
            .collect::<Vec<_>>();
        let satisfies = |required: &ApproverId, user: &UserId| match required {
            ApproverId::User(required_user) => required_user == user,
            ApproverId::Team(team) => is_member(team, user),
        };

        // Kuhn's augmenting paths over required approvers x approving users.
        let mut owner: Vec<Option<usize>> = vec![None; approvers.len()];
        for required_index in 0..self.required_approvers.len() {
            let mut visited = vec![false; approvers.len()];
            if !augment(
                required_index,
                &self.required_approvers,
                &approvers,
                &satisfies,
                &mut visited,
                &mut owner,
            ) {
                return false;
            }
        }

        true
    }

    /// Moves `Pending` to `Approved`.
    pub fn approve(&mut self, reason: &str, message: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.transition(RequestPhase::Approved, now)?;
        self.push_condition(Condition::new("Approved", now, reason, message));
        Ok(())
    }

    /// Moves `Pending` to `Denied`.
    pub fn deny(&mut self, reason: &str, message: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.transition(RequestPhase::Denied, now)?;
        self.push_condition(Condition::new("Denied", now, reason, message));
        Ok(())
    }

    /// Moves `Approved` to `Active` with the provisioned access entry.
    pub fn activate(&mut self, entry: RequestAccessEntry, now: DateTime<Utc>) -> AppResult<()> {
        self.transition(RequestPhase::Active, now)?;
        let message = format!("access granted until {}", entry.expires_at.to_rfc3339());
        self.access_entry = Some(entry);
        self.push_condition(Condition::new("Active", now, "GrantSucceeded", message));
        Ok(())
    }

    /// Moves `Active` to `Expired`.
    pub fn expire(&mut self, reason: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.transition(RequestPhase::Expired, now)?;
        self.push_condition(Condition::new(
            "Expired",
            now,
            reason,
            "access window elapsed",
        ));
        Ok(())
    }

    /// Moves `Active` to `Revoked`.
    ///
    /// Returns `false` when the request already ended, which callers treat
    /// as a successful no-op.
    pub fn revoke(&mut self, revoked_by: &UserId, now: DateTime<Utc>) -> AppResult<bool> {
        if matches!(self.phase, RequestPhase::Revoked | RequestPhase::Expired) {
            return Ok(false);
        }

        self.transition(RequestPhase::Revoked, now)?;
        self.push_condition(Condition::new(
            "Revoked",
            now,
            "RevokedByOperator",
            format!("access revoked by {revoked_by}"),
        ));
        Ok(true)
    }

    fn transition(&mut self, next: RequestPhase, now: DateTime<Utc>) -> AppResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "request '{}' cannot move from {} to {next}",
                self.id, self.phase
            )));
        }

        self.phase = next;
        self.updated_at = now;
        Ok(())
    }
}

fn augment<F>(
    required_index: usize,
    required: &[ApproverId],
    approvers: &[&UserId],
    satisfies: &F,
    visited: &mut [bool],
    owner: &mut [Option<usize>],
) -> bool
where
    F: Fn(&ApproverId, &UserId) -> bool,
{
    for (approver_index, approver) in approvers.iter().enumerate() {
        if visited[approver_index] || !satisfies(&required[required_index], *approver) {
            continue;
        }
        visited[approver_index] = true;

        let free = match owner[approver_index] {
            None => true,
            Some(other) => augment(other, required, approvers, satisfies, visited, owner),
        };
        if free {
            owner[approver_index] = Some(required_index);
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::{TimeDelta, TimeZone};

    use super::*;
    use crate::{AccountId, ClusterName, Region};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(|| unreachable!())
    }

    fn user(suffix: &str) -> UserId {
        UserId::new(format!("U{suffix:0>10}")).unwrap_or_else(|_| unreachable!())
    }

    fn new_request(permissions: Vec<AccessPermission>, reason: &str) -> NewAccessRequest {
        NewAccessRequest {
            id: "req-1".to_owned(),
            requester_id: user("1"),
            requester_email: EmailAddress::new("dev@example.com")
                .unwrap_or_else(|_| unreachable!()),
            target: ClusterTarget {
                name: ClusterName::new("prod-east-1").unwrap_or_else(|_| unreachable!()),
                account: AccountId::new("123456789012").unwrap_or_else(|_| unreachable!()),
                region: Region::new("us-east-1").unwrap_or_else(|_| unreachable!()),
            },
            reason: reason.to_owned(),
            duration: AccessDuration::DEFAULT,
            permissions,
            namespaces: Vec::new(),
            required_approvers: vec![
                ApproverId::from_str("platform-team").unwrap_or_else(|_| unreachable!()),
                ApproverId::from_str("sre-team").unwrap_or_else(|_| unreachable!()),
            ],
            created_at: now(),
        }
    }

    fn pending() -> AccessRequest {
        AccessRequest::new(new_request(
            vec![AccessPermission::Edit],
            "debugging ticket 4217",
        ))
        .unwrap_or_else(|_| unreachable!())
    }

    fn entry() -> RequestAccessEntry {
        RequestAccessEntry {
            principal: "arn:aws:sts::123456789012:assumed-role/jit/jit-x".to_owned(),
            session_name: SessionName::try_from(
                "jit-U0000000001-prod-east-1-20250101-000000".to_owned(),
            )
            .unwrap_or_else(|_| unreachable!()),
            created_at: now(),
            expires_at: now() + TimeDelta::hours(1),
        }
    }

    fn membership(team: &TeamName, user_id: &UserId) -> bool {
        matches!(
            (team.as_str(), user_id.as_str()),
            ("platform-team", "U0000000002")
                | ("sre-team", "U0000000003")
                | ("platform-team" | "sre-team", "U0000000004")
        )
    }

    #[test]
    fn reason_length_is_bounded() {
        assert!(AccessRequest::new(new_request(vec![AccessPermission::View], "short")).is_err());
        assert!(
            AccessRequest::new(new_request(vec![AccessPermission::View], &"x".repeat(501)))
                .is_err()
        );
    }

    #[test]
    fn cluster_admin_requires_long_reason() {
        let result = AccessRequest::new(new_request(
            vec![AccessPermission::ClusterAdmin],
            "need access now",
        ));
        assert!(matches!(result, Err(AppError::PolicyViolation(_))));
    }

    #[test]
    fn approvals_need_distinct_users_per_required_approver() {
        let mut request = pending();
        request
            .record_approval(&user("4"), None, now())
            .unwrap_or_else(|_| unreachable!());
        assert!(!request.approvals_satisfied(0, membership));

        request
            .record_approval(&user("2"), None, now())
            .unwrap_or_else(|_| unreachable!());
        assert!(request.approvals_satisfied(0, membership));
        assert!(!request.approvals_satisfied(3, membership));
    }

    #[test]
    fn non_required_approval_is_stored_but_does_not_count() {
        let mut request = pending();
        let outcome = request.record_approval(&user("9"), Some("lgtm".to_owned()), now());
        assert_eq!(outcome, Ok(ApprovalOutcome::Recorded));
        assert_eq!(request.approvals().len(), 1);
        assert!(!request.approvals_satisfied(0, membership));
    }

    #[test]
    fn duplicate_approval_is_a_noop() {
        let mut request = pending();
        let _ = request.record_approval(&user("2"), None, now());
        let outcome = request.record_approval(&user("2"), None, now());

        assert_eq!(outcome, Ok(ApprovalOutcome::Duplicate));
        assert_eq!(request.approvals().len(), 1);
    }

    #[test]
    fn requester_cannot_self_approve() {
        let mut request = pending();
        assert!(matches!(
            request.record_approval(&user("1"), None, now()),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn new_approval_after_approval_conflicts() {
        let mut request = pending();
        let _ = request.approve("Approved", "approved", now());
        assert!(matches!(
            request.record_approval(&user("3"), None, now()),
            Err(AppError::Conflict(_))
        ));
    }

    #[test]
    fn phases_follow_the_lifecycle() {
        let mut request = pending();
        assert!(request.activate(entry(), now()).is_err());
        assert!(request.approve("Approved", "approved", now()).is_ok());
        assert!(request.activate(entry(), now()).is_ok());
        assert_eq!(request.phase(), RequestPhase::Active);
        assert!(request.access_entry().is_some());
        assert!(request.expire("WindowElapsed", now()).is_ok());
        assert!(request.phase().has_access_entry());
    }

    #[test]
    fn revoke_is_idempotent_after_end_and_conflicts_before_activation() {
        let mut request = pending();
        assert!(matches!(
            request.revoke(&user("2"), now()),
            Err(AppError::Conflict(_))
        ));

        let _ = request.approve("Approved", "approved", now());
        let _ = request.activate(entry(), now());
        assert_eq!(request.revoke(&user("2"), now()), Ok(true));
        assert_eq!(request.revoke(&user("2"), now()), Ok(false));
        assert_eq!(request.phase(), RequestPhase::Revoked);
    }

    #[test]
    fn denied_is_terminal() {
        let mut request = pending();
        assert!(request.deny("DeniedByApprover", "no", now()).is_ok());
        assert!(request.phase().is_terminal());
        assert!(request.approve("Approved", "approved", now()).is_err());
        assert!(request.has_condition("Denied"));
    }
}
