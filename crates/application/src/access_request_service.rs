//! Access request use-cases shared by the HTTP API and the chat webhook.

use std::sync::Arc;

use jit_core::{AppError, AppResult, CallerIdentity};
use jit_domain::{
    AccessRequest, ApprovalOutcome, Cluster, ClusterName, EmailAddress, JobPhase,
    OperatorPermission, RequestPhase, UserId,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::access_ports::{
    AccessJobRepository, AccessRequestQuery, AccessRequestRepository, ChatGateway, Clock,
    ClusterRepository, ReconcileKey, ReconcileTrigger, SecretStore,
};
use crate::authorization_service::AuthorizationService;
use crate::expiry_sweeper::{ExpirySweeper, SweepReport};
use crate::reconcile_context::ReconcileContext;
use crate::request_policy::{AccessRequestDraft, RequestPolicy};

/// Input for filing a new access request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateAccessRequestInput {
    /// Target cluster name.
    pub cluster: String,
    /// Justification.
    pub reason: String,
    /// Requested window.
    pub duration: Option<String>,
    /// Requested permissions.
    pub permissions: Option<Vec<String>>,
    /// Namespace scope.
    pub namespaces: Vec<String>,
    /// Explicit approvers.
    pub approvers: Option<Vec<String>>,
}

/// Listing filter as received from callers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessListFilter {
    /// Only requests filed by this user.
    pub user_id: Option<String>,
    /// Only requests targeting this cluster, by registry id or name.
    pub cluster_id: Option<String>,
    /// Only requests whose access is live.
    pub active: bool,
}

/// Application service for access request use-cases.
#[derive(Clone)]
pub struct AccessRequestService {
    requests: Arc<dyn AccessRequestRepository>,
    jobs: Arc<dyn AccessJobRepository>,
    clusters: Arc<dyn ClusterRepository>,
    secrets: Arc<dyn SecretStore>,
    chat: Arc<dyn ChatGateway>,
    trigger: Arc<dyn ReconcileTrigger>,
    clock: Arc<dyn Clock>,
    authorization: AuthorizationService,
    sweeper: ExpirySweeper,
    policy: RequestPolicy,
    email_domain: String,
}

/// Ports and collaborators of [`AccessRequestService`].
#[derive(Clone)]
pub struct AccessRequestServiceDeps {
    /// Request store.
    pub requests: Arc<dyn AccessRequestRepository>,
    /// Job store.
    pub jobs: Arc<dyn AccessJobRepository>,
    /// Cluster registry.
    pub clusters: Arc<dyn ClusterRepository>,
    /// Secret store holding issued kubeconfigs.
    pub secrets: Arc<dyn SecretStore>,
    /// Chat gateway for notifications and email lookup.
    pub chat: Arc<dyn ChatGateway>,
    /// Reconcile trigger.
    pub trigger: Arc<dyn ReconcileTrigger>,
    /// Clock.
    pub clock: Arc<dyn Clock>,
    /// Operator role checks.
    pub authorization: AuthorizationService,
    /// Sweeper used for forced cleanup.
    pub sweeper: ExpirySweeper,
}

impl AccessRequestService {
    /// Creates the service.
    #[must_use]
    pub fn new(deps: AccessRequestServiceDeps, policy: RequestPolicy, email_domain: String) -> Self {
        Self {
            requests: deps.requests,
            jobs: deps.jobs,
            clusters: deps.clusters,
            secrets: deps.secrets,
            chat: deps.chat,
            trigger: deps.trigger,
            clock: deps.clock,
            authorization: deps.authorization,
            sweeper: deps.sweeper,
            policy,
            email_domain,
        }
    }

    /// Files a new request on behalf of the caller.
    pub async fn create(
        &self,
        actor: &CallerIdentity,
        input: CreateAccessRequestInput,
    ) -> AppResult<AccessRequest> {
        self.authorization
            .require_permission(actor, OperatorPermission::CreateRequests)
            .await?;

        let requester_id = UserId::new(actor.subject())?;
        let cluster_name = ClusterName::new(input.cluster)?;
        let cluster = self
            .clusters
            .find_by_name(&cluster_name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("cluster '{cluster_name}'")))?;
        if !cluster.enabled() {
            return Err(AppError::Validation(format!(
                "cluster '{cluster_name}' is not accepting requests"
            )));
        }

        let requester_email = self.resolve_email(actor, &requester_id).await?;
        let draft = AccessRequestDraft {
            requester_id: requester_id.as_str().to_owned(),
            requester_email: requester_email.as_str().to_owned(),
            reason: input.reason,
            duration: input.duration,
            permissions: input.permissions,
            namespaces: input.namespaces,
            approvers: input.approvers,
        };
        let new_request = self.policy.evaluate(
            Uuid::new_v4().to_string(),
            draft,
            &cluster,
            self.clock.now(),
        )?;
        let request = self
            .requests
            .create(AccessRequest::new(new_request)?)
            .await?;

        info!(
            request_id = %request.id(),
            requester_id = %request.requester_id(),
            cluster = %request.target().name,
            duration = %request.duration(),
            "access request created"
        );
        self.trigger
            .enqueue(ReconcileKey::Request(request.id().to_owned()))
            .await;
        Ok(request)
    }

    /// Records the caller's approval.
    pub async fn approve(
        &self,
        actor: &CallerIdentity,
        id: &str,
        comment: Option<String>,
    ) -> AppResult<(AccessRequest, ApprovalOutcome)> {
        self.authorization
            .require_permission(actor, OperatorPermission::ApproveRequests)
            .await?;

        let approver = UserId::new(actor.subject())?;
        let mut request = self.load(id).await?;
        let outcome = request.record_approval(&approver, comment, self.clock.now())?;
        if outcome == ApprovalOutcome::Duplicate {
            return Ok((request, outcome));
        }

        let request = self.requests.update(request).await?;
        info!(request_id = %request.id(), approver = %approver, "approval recorded");
        self.trigger
            .enqueue(ReconcileKey::Request(request.id().to_owned()))
            .await;
        Ok((request, outcome))
    }

    /// Denies a pending request.
    pub async fn deny(
        &self,
        actor: &CallerIdentity,
        id: &str,
        reason: Option<String>,
    ) -> AppResult<AccessRequest> {
        self.authorization
            .require_permission(actor, OperatorPermission::ApproveRequests)
            .await?;

        let mut request = self.load(id).await?;
        let message = reason
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| format!("denied by {}", actor.subject()));
        request.deny("DeniedByApprover", message.as_str(), self.clock.now())?;
        let request = self.requests.update(request).await?;

        info!(request_id = %request.id(), actor = %actor.subject(), "access request denied");
        self.notify(
            request.requester_id(),
            format!("Access request {} was denied: {message}", request.id()).as_str(),
        )
        .await;
        Ok(request)
    }

    /// Revokes live access. Revoking an ended request is a no-op.
    pub async fn revoke(&self, actor: &CallerIdentity, id: &str) -> AppResult<AccessRequest> {
        let mut request = self.load(id).await?;
        let revoked_by = UserId::new(actor.subject())?;
        if request.requester_id() != &revoked_by {
            self.authorization
                .require_permission(actor, OperatorPermission::RevokeRequests)
                .await?;
        }

        if !request.revoke(&revoked_by, self.clock.now())? {
            return Ok(request);
        }
        let request = self.requests.update(request).await?;

        info!(request_id = %request.id(), actor = %revoked_by, "access revoked");
        self.trigger
            .enqueue(ReconcileKey::Request(request.id().to_owned()))
            .await;
        if let Some(job) = self.jobs.find_by_request(request.id()).await? {
            self.trigger
                .enqueue(ReconcileKey::Job(job.id().to_owned()))
                .await;
        }
        self.notify(
            request.requester_id(),
            format!(
                "Access to {} was revoked by {}.",
                request.target().name,
                actor.display_name()
            )
            .as_str(),
        )
        .await;
        Ok(request)
    }

    /// Returns one request visible to the caller.
    pub async fn get(&self, actor: &CallerIdentity, id: &str) -> AppResult<AccessRequest> {
        let request = self.load(id).await?;
        if request.requester_id().as_str() != actor.subject() {
            self.authorization
                .require_permission(actor, OperatorPermission::ViewAllRequests)
                .await?;
        }
        Ok(request)
    }

    /// Lists requests visible to the caller.
    ///
    /// Callers without `view-all-requests` only ever see their own requests.
    pub async fn list(
        &self,
        actor: &CallerIdentity,
        filter: AccessListFilter,
    ) -> AppResult<Vec<AccessRequest>> {
        self.authorization
            .require_permission(actor, OperatorPermission::ViewOwnRequests)
            .await?;
        let sees_all = self
            .authorization
            .has_permission(actor, OperatorPermission::ViewAllRequests)
            .await?;

        let requester_id = match filter.user_id {
            Some(user_id) if sees_all => Some(UserId::new(user_id)?),
            _ if sees_all => None,
            _ => Some(UserId::new(actor.subject())?),
        };
        let cluster = match filter.cluster_id {
            Some(cluster_id) => Some(
                self.resolve_cluster(cluster_id.as_str())
                    .await?
                    .name()
                    .clone(),
            ),
            None => None,
        };
        let query = AccessRequestQuery {
            requester_id,
            cluster,
            phases: filter.active.then(|| vec![RequestPhase::Active]),
        };

        let mut requests = self.requests.list(&query).await?;
        requests.sort_by(|left, right| right.created_at().cmp(&left.created_at()));
        Ok(requests)
    }

    /// Returns the rendered kubeconfig of the caller's live grant.
    pub async fn kubeconfig(&self, actor: &CallerIdentity, id: &str) -> AppResult<String> {
        let request = self.load(id).await?;
        if request.requester_id().as_str() != actor.subject() {
            return Err(AppError::Forbidden(
                "only the requester can fetch the kubeconfig".to_owned(),
            ));
        }

        let job = self
            .jobs
            .find_by_request(request.id())
            .await?
            .filter(|job| job.phase() == JobPhase::Active)
            .ok_or_else(|| AppError::NotFound(format!("no live access for request '{id}'")))?;
        let secret_key = job
            .kubeconfig_ref()
            .ok_or_else(|| AppError::NotFound(format!("no kubeconfig for request '{id}'")))?;
        let document = self
            .secrets
            .get(secret_key)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("no kubeconfig for request '{id}'")))?;

        String::from_utf8(document)
            .map_err(|error| AppError::Internal(format!("stored kubeconfig is not UTF-8: {error}")))
    }

    /// Deletes a request; the reconciler revokes and removes its job.
    pub async fn delete(&self, actor: &CallerIdentity, id: &str) -> AppResult<()> {
        self.authorization
            .require_permission(actor, OperatorPermission::RunCleanup)
            .await?;

        let job = self.jobs.find_by_request(id).await?;
        if !self.requests.delete(id).await? {
            return Err(AppError::NotFound(format!("access request '{id}'")));
        }

        info!(request_id = %id, actor = %actor.subject(), "access request deleted");
        if let Some(job) = job {
            self.trigger
                .enqueue(ReconcileKey::Job(job.id().to_owned()))
                .await;
        }
        Ok(())
    }

    /// Forces an expiry sweep of one cluster.
    pub async fn run_cleanup(
        &self,
        actor: &CallerIdentity,
        cluster_id: &str,
    ) -> AppResult<SweepReport> {
        self.authorization
            .require_permission(actor, OperatorPermission::RunCleanup)
            .await?;

        let cluster = self.resolve_cluster(cluster_id).await?;
        let report = self
            .sweeper
            .sweep_cluster(&cluster, &ReconcileContext::background())
            .await?;
        info!(
            cluster = %cluster.name(),
            actor = %actor.subject(),
            scanned = report.scanned,
            orphans_removed = report.orphans_removed,
            expired = report.expired,
            "forced cleanup finished"
        );
        Ok(report)
    }

    async fn load(&self, id: &str) -> AppResult<AccessRequest> {
        self.requests
            .find(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("access request '{id}'")))
    }

    async fn resolve_cluster(&self, id_or_name: &str) -> AppResult<Cluster> {
        if let Some(cluster) = self.clusters.find(id_or_name).await? {
            return Ok(cluster);
        }

        let name = ClusterName::new(id_or_name)
            .map_err(|_| AppError::NotFound(format!("cluster '{id_or_name}'")))?;
        self.clusters
            .find_by_name(&name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("cluster '{id_or_name}'")))
    }

    async fn resolve_email(
        &self,
        actor: &CallerIdentity,
        user_id: &UserId,
    ) -> AppResult<EmailAddress> {
        if let Some(email) = actor.email().and_then(|value| EmailAddress::new(value).ok()) {
            return Ok(email);
        }

        match self.chat.lookup_email(user_id).await {
            Ok(Some(email)) => return Ok(email),
            Ok(None) => {}
            Err(error) => {
                warn!(user_id = %user_id, error = %error, "email lookup failed; using fallback");
            }
        }

        EmailAddress::new(format!(
            "{}@{}",
            user_id.as_str().to_lowercase(),
            self.email_domain
        ))
    }

    async fn notify(&self, user_id: &UserId, message: &str) {
        if let Err(error) = self.chat.notify_user(user_id, message).await {
            warn!(user_id = %user_id, error = %error, "failed to deliver chat notification");
        }
    }
}
