//! Validation and defaulting of incoming access requests.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use jit_core::{AppError, AppResult};
use jit_domain::{
    AccessDuration, AccessPermission, ApproverId, CLUSTER_ADMIN_REASON_MIN_LENGTH, Cluster,
    EmailAddress, Environment, NamespaceName, NewAccessRequest, OperatorPermission, OperatorRole,
    REASON_MAX_LENGTH, REASON_MIN_LENGTH, TeamName, UserId, any_elevated,
};

/// Generic phrases that do not justify cluster-admin access.
pub const BANNED_JUSTIFICATION_PHRASES: &[&str] = &[
    "need access",
    "want access",
    "need to debug",
    "want to check",
    "testing something",
    "trying to",
];

const PLATFORM_TEAM: &str = "platform-team";
const SRE_TEAM: &str = "sre-team";
const SECURITY_TEAM: &str = "security-team";

/// Raw request fields as received at ingress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequestDraft {
    /// Requesting chat user id.
    pub requester_id: String,
    /// Requester email.
    pub requester_email: String,
    /// Justification.
    pub reason: String,
    /// Requested window; defaults when absent.
    pub duration: Option<String>,
    /// Requested permissions; defaults to `view` when absent.
    pub permissions: Option<Vec<String>>,
    /// Namespace scope.
    pub namespaces: Vec<String>,
    /// Explicit approvers; derived from the environment when absent.
    pub approvers: Option<Vec<String>>,
}

/// Pure request validation and defaulting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPolicy {
    max_duration: AccessDuration,
    default_duration: AccessDuration,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            max_duration: AccessDuration::MAX,
            default_duration: AccessDuration::DEFAULT,
        }
    }
}

impl RequestPolicy {
    /// Creates a policy with operator-provided bounds.
    pub fn new(max_duration: AccessDuration, default_duration: AccessDuration) -> AppResult<Self> {
        max_duration.ensure_within(AccessDuration::MAX)?;
        default_duration.ensure_within(max_duration)?;

        Ok(Self {
            max_duration,
            default_duration,
        })
    }

    /// Validates a draft against the target cluster and produces the new request.
    pub fn evaluate(
        &self,
        id: impl Into<String>,
        draft: AccessRequestDraft,
        cluster: &Cluster,
        now: DateTime<Utc>,
    ) -> AppResult<NewAccessRequest> {
        let requester_id = UserId::new(draft.requester_id)?;
        let requester_email = EmailAddress::new(draft.requester_email)?;

        let reason = draft.reason.trim().to_owned();
        let reason_length = reason.chars().count();
        if !(REASON_MIN_LENGTH..=REASON_MAX_LENGTH).contains(&reason_length) {
            return Err(AppError::Validation(format!(
                "reason must be between {REASON_MIN_LENGTH} and {REASON_MAX_LENGTH} characters"
            )));
        }

        let duration = match draft.duration.as_deref().map(str::trim) {
            Some(value) if !value.is_empty() => AccessDuration::parse(value)?,
            _ => self.default_duration,
        };
        duration.ensure_within(self.max_duration.min(cluster.max_duration()))?;

        let permissions = parse_permissions(draft.permissions)?;
        let is_cluster_admin = permissions.contains(&AccessPermission::ClusterAdmin);
        if is_cluster_admin {
            if permissions.len() > 1 {
                return Err(AppError::PolicyViolation(
                    "cluster-admin cannot be combined with other permissions".to_owned(),
                ));
            }
            if !is_detailed_justification(reason.as_str()) {
                return Err(AppError::PolicyViolation(
                    "cluster-admin permission requires detailed justification".to_owned(),
                ));
            }
        }

        let namespaces = parse_namespaces(draft.namespaces)?;
        if !namespaces.is_empty()
            && let Some(permission) = permissions.iter().find(|permission| permission.is_cluster_wide())
        {
            return Err(AppError::PolicyViolation(format!(
                "{permission} applies cluster-wide; namespaces are not allowed"
            )));
        }

        let required_approvers = match draft.approvers {
            Some(approvers) if !approvers.is_empty() => parse_approvers(approvers)?,
            _ => default_approvers(cluster.environment(), permissions.as_slice()),
        };

        Ok(NewAccessRequest {
            id: id.into(),
            requester_id,
            requester_email,
            target: cluster.target(),
            reason,
            duration,
            permissions,
            namespaces,
            required_approvers,
            created_at: now,
        })
    }
}

/// Returns whether a request qualifies for auto-approval: view-only
/// permissions on a non-production cluster, from a principal allowed to
/// create requests.
#[must_use]
pub fn is_auto_approvable(
    environment: Environment,
    permissions: &[AccessPermission],
    requester_role: OperatorRole,
) -> bool {
    environment != Environment::Production
        && !permissions.is_empty()
        && permissions
            .iter()
            .all(|permission| *permission == AccessPermission::View)
        && requester_role.grants(OperatorPermission::CreateRequests)
}

/// Derives the required approver set from the environment.
#[must_use]
pub fn default_approvers(
    environment: Environment,
    permissions: &[AccessPermission],
) -> Vec<ApproverId> {
    let elevated = any_elevated(permissions);
    let teams: &[&str] = match environment {
        Environment::Production if elevated => &[PLATFORM_TEAM, SRE_TEAM, SECURITY_TEAM],
        Environment::Production => &[PLATFORM_TEAM, SRE_TEAM],
        Environment::Staging if elevated => &[PLATFORM_TEAM],
        Environment::Staging | Environment::Development => &[],
    };

    teams
        .iter()
        .filter_map(|team| TeamName::new(*team).ok().map(ApproverId::Team))
        .collect()
}

fn is_detailed_justification(reason: &str) -> bool {
    if reason.chars().count() < CLUSTER_ADMIN_REASON_MIN_LENGTH {
        return false;
    }

    let lowered = reason.to_lowercase();
    !BANNED_JUSTIFICATION_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
}

fn parse_permissions(values: Option<Vec<String>>) -> AppResult<Vec<AccessPermission>> {
    let Some(values) = values else {
        return Ok(vec![AccessPermission::View]);
    };

    if values.iter().all(|value| value.trim().is_empty()) {
        return Err(AppError::Validation(
            "at least one permission is required".to_owned(),
        ));
    }

    let mut seen = BTreeSet::new();
    let mut permissions = Vec::new();
    for value in values.iter().map(|value| value.trim().to_lowercase()) {
        if value.is_empty() {
            continue;
        }
        let permission = AccessPermission::from_str(value.as_str())?;
        if seen.insert(permission) {
            permissions.push(permission);
        }
    }

    Ok(permissions)
}

fn parse_namespaces(values: Vec<String>) -> AppResult<Vec<NamespaceName>> {
    let mut seen = BTreeSet::new();
    let mut namespaces = Vec::with_capacity(values.len());
    for value in values {
        let namespace = NamespaceName::new(value.trim())?;
        if !seen.insert(namespace.clone()) {
            return Err(AppError::Validation(format!(
                "namespace '{}' is listed more than once",
                namespace.as_str()
            )));
        }
        namespaces.push(namespace);
    }

    Ok(namespaces)
}

fn parse_approvers(values: Vec<String>) -> AppResult<Vec<ApproverId>> {
    let mut seen = BTreeSet::new();
    let mut approvers = Vec::with_capacity(values.len());
    for value in values {
        let approver = ApproverId::from_str(value.trim())?;
        if !seen.insert(approver.clone()) {
            return Err(AppError::Validation(format!(
                "approver '{approver}' is listed more than once"
            )));
        }
        approvers.push(approver);
    }

    Ok(approvers)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use jit_domain::ClusterInput;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(|| unreachable!())
    }

    fn cluster(name: &str, environment: Environment) -> Cluster {
        Cluster::new(
            format!("id-{name}"),
            ClusterInput {
                name: name.to_owned(),
                display_name: None,
                account: "123456789012".to_owned(),
                region: "us-east-1".to_owned(),
                environment,
                max_duration: None,
                required_approvers_count: 0,
                enabled: true,
            },
        )
        .unwrap_or_else(|_| unreachable!())
    }

    fn draft(reason: &str) -> AccessRequestDraft {
        AccessRequestDraft {
            requester_id: "U0000000001".to_owned(),
            requester_email: "dev@example.com".to_owned(),
            reason: reason.to_owned(),
            duration: None,
            permissions: None,
            namespaces: Vec::new(),
            approvers: None,
        }
    }

    fn permissions(values: &[&str]) -> Option<Vec<String>> {
        Some(values.iter().map(|value| (*value).to_owned()).collect())
    }

    #[test]
    fn defaults_to_view_for_one_hour_without_approvers_on_dev() {
        let request = RequestPolicy::default().evaluate(
            "req-1",
            draft("debugging ticket 4217"),
            &cluster("dev-east-1", Environment::Development),
            now(),
        );

        let request = request.unwrap_or_else(|_| unreachable!());
        assert_eq!(request.permissions, vec![AccessPermission::View]);
        assert_eq!(request.duration, AccessDuration::DEFAULT);
        assert!(request.required_approvers.is_empty());
        assert_eq!(request.target.name.as_str(), "dev-east-1");
    }

    #[test]
    fn production_edit_requires_three_teams() {
        let mut draft = draft("rolling back a broken deployment");
        draft.permissions = permissions(&["edit"]);

        let request = RequestPolicy::default()
            .evaluate("req-1", draft, &cluster("prod-east-1", Environment::Production), now())
            .unwrap_or_else(|_| unreachable!());

        let approvers = request
            .required_approvers
            .iter()
            .map(ApproverId::as_str)
            .collect::<Vec<_>>();
        assert_eq!(approvers, vec!["platform-team", "sre-team", "security-team"]);
    }

    #[test]
    fn production_view_requires_platform_and_sre() {
        assert_eq!(
            default_approvers(Environment::Production, &[AccessPermission::View])
                .iter()
                .map(ApproverId::as_str)
                .collect::<Vec<_>>(),
            vec!["platform-team", "sre-team"]
        );
        assert!(default_approvers(Environment::Staging, &[AccessPermission::Logs]).is_empty());
        assert_eq!(
            default_approvers(Environment::Staging, &[AccessPermission::Exec]).len(),
            1
        );
    }

    #[test]
    fn weak_cluster_admin_reason_is_a_policy_violation() {
        let mut draft = draft("need access now");
        draft.permissions = permissions(&["cluster-admin"]);

        let result = RequestPolicy::default().evaluate(
            "req-1",
            draft,
            &cluster("prod-east-1", Environment::Production),
            now(),
        );

        assert_eq!(
            result.err(),
            Some(AppError::PolicyViolation(
                "cluster-admin permission requires detailed justification".to_owned()
            ))
        );
    }

    #[test]
    fn long_reason_with_banned_phrase_is_rejected() {
        let mut draft = draft(
            "I am trying to figure out why the ingress controller keeps crashing overnight",
        );
        draft.permissions = permissions(&["cluster-admin"]);

        let result = RequestPolicy::default().evaluate(
            "req-1",
            draft,
            &cluster("prod-east-1", Environment::Production),
            now(),
        );

        assert!(matches!(result, Err(AppError::PolicyViolation(_))));
    }

    #[test]
    fn cluster_admin_with_namespace_applies_cluster_wide() {
        let mut draft = draft(
            "Incident 5521: etcd defragmentation requires cluster scoped resources to be patched",
        );
        draft.permissions = permissions(&["cluster-admin"]);
        draft.namespaces = vec!["default".to_owned()];

        let result = RequestPolicy::default().evaluate(
            "req-1",
            draft,
            &cluster("prod-east-1", Environment::Production),
            now(),
        );

        assert!(matches!(
            result,
            Err(AppError::PolicyViolation(message)) if message.contains("cluster-admin applies cluster-wide")
        ));
    }

    #[test]
    fn cluster_admin_is_exclusive() {
        let mut draft = draft(
            "Incident 5521: etcd defragmentation requires cluster scoped resources to be patched",
        );
        draft.permissions = permissions(&["cluster-admin", "view"]);

        let result = RequestPolicy::default().evaluate(
            "req-1",
            draft,
            &cluster("prod-east-1", Environment::Production),
            now(),
        );

        assert!(matches!(result, Err(AppError::PolicyViolation(_))));
    }

    #[test]
    fn duration_boundaries() {
        let policy = RequestPolicy::default();
        let target = cluster("dev-east-1", Environment::Development);
        for (value, accepted) in [("15m", true), ("14m59s", false), ("7d", true), ("7d1s", false)] {
            let mut draft = draft("debugging ticket 4217");
            draft.duration = Some(value.to_owned());
            assert_eq!(
                policy.evaluate("req-1", draft, &target, now()).is_ok(),
                accepted,
                "{value}"
            );
        }
    }

    #[test]
    fn duplicates_and_bad_grammar_are_rejected() {
        let policy = RequestPolicy::default();
        let target = cluster("dev-east-1", Environment::Development);

        let mut duplicate_namespaces = draft("debugging ticket 4217");
        duplicate_namespaces.namespaces = vec!["team-a".to_owned(), "team-a".to_owned()];
        assert!(policy.evaluate("r", duplicate_namespaces, &target, now()).is_err());

        let mut duplicate_approvers = draft("debugging ticket 4217");
        duplicate_approvers.approvers = Some(vec!["sre-team".to_owned(), "sre-team".to_owned()]);
        assert!(policy.evaluate("r", duplicate_approvers, &target, now()).is_err());

        let mut bad_user = draft("debugging ticket 4217");
        bad_user.requester_id = "alice".to_owned();
        assert!(matches!(
            policy.evaluate("r", bad_user, &target, now()),
            Err(AppError::Validation(_))
        ));

        let mut unknown_permission = draft("debugging ticket 4217");
        unknown_permission.permissions = permissions(&["root"]);
        assert!(policy.evaluate("r", unknown_permission, &target, now()).is_err());
    }

    #[test]
    fn auto_approval_is_limited_to_non_production_view() {
        assert!(is_auto_approvable(
            Environment::Development,
            &[AccessPermission::View],
            OperatorRole::Requester
        ));
        assert!(!is_auto_approvable(
            Environment::Production,
            &[AccessPermission::View],
            OperatorRole::Admin
        ));
        assert!(!is_auto_approvable(
            Environment::Staging,
            &[AccessPermission::View, AccessPermission::Logs],
            OperatorRole::Requester
        ));
    }
}
